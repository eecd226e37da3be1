use std::collections::BTreeSet;
use std::path::Path;

use alb_monitor_core::app::{AssemblyManifest, StackEnvironment};
use alb_monitor_core::assets::{resolve_placeholders, AssetManifest};
use anyhow::{anyhow, Context};
use serde::Serialize;

use crate::adapters::asset_store::AssetStore;

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct PublishReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// Uploads every file asset of the assembly in `assembly_dir` to its
/// destination bucket in `environment`. Objects that already exist are left
/// alone; identical assets shared by several stacks are uploaded once.
pub fn publish_assets(
    assembly_dir: &Path,
    environment: &StackEnvironment,
    store: &dyn AssetStore,
) -> anyhow::Result<PublishReport> {
    let manifest = AssemblyManifest::load(assembly_dir)
        .with_context(|| format!("no cloud assembly in {}", assembly_dir.display()))?;

    let mut report = PublishReport::default();
    let mut seen = BTreeSet::new();

    for file in manifest.asset_manifest_files() {
        let assets = AssetManifest::load(&assembly_dir.join(file))?;
        for (hash, entry) in &assets.files {
            for destination in entry.destinations.values() {
                let bucket = resolve_placeholders(
                    &destination.bucket_name,
                    &environment.account,
                    &environment.region,
                );
                let location = format!("s3://{bucket}/{}", destination.object_key);
                if !seen.insert(location.clone()) {
                    continue;
                }

                let exists = store
                    .object_exists(&bucket, &destination.object_key)
                    .map_err(|error| anyhow!(error))?;
                if exists {
                    tracing::debug!(%location, "asset already published");
                    report.skipped.push(location);
                    continue;
                }

                let source = assembly_dir.join(&entry.source.path);
                let body = std::fs::read(&source)
                    .with_context(|| format!("asset {hash} missing at {}", source.display()))?;
                store
                    .put_object(&bucket, &destination.object_key, &body)
                    .map_err(|error| anyhow!(error))?;
                tracing::info!(%location, bytes = body.len(), "published asset");
                report.uploaded.push(location);
            }
        }
    }

    Ok(report)
}
