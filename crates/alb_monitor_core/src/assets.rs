//! Content-addressed file assets and the per-stack asset manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::SynthError;
use crate::template::sub;

pub const ASSET_MANIFEST_SCHEMA_VERSION: &str = "36.0.0";
pub const CURRENT_ENVIRONMENT_DESTINATION: &str = "current_account-current_region";
const ACCOUNT_PLACEHOLDER: &str = "${AWS::AccountId}";
const REGION_PLACEHOLDER: &str = "${AWS::Region}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAsset {
    /// Construct path the asset was staged for, e.g. `ALBMonitorStack/ALBMonitorLayer/Code`.
    pub construct_path: String,
    pub source: PathBuf,
    pub hash: String,
}

impl FileAsset {
    pub fn stage(construct_path: impl Into<String>, source: &Path) -> Result<Self, SynthError> {
        if !source.is_file() {
            return Err(SynthError::AssetNotFound(source.to_path_buf()));
        }
        let bytes = std::fs::read(source).map_err(|error| SynthError::io(source, error))?;
        let hash = content_hash(&bytes);
        tracing::debug!(source = %source.display(), %hash, "staged asset");
        Ok(Self {
            construct_path: construct_path.into(),
            source: source.to_path_buf(),
            hash,
        })
    }

    pub fn object_key(&self) -> String {
        format!("{}.zip", self.hash)
    }

    /// File name of the copy placed in the cloud assembly directory.
    pub fn staged_file_name(&self) -> String {
        format!("asset.{}.zip", self.hash)
    }

    /// `Code`/`Content` property pointing at the uploaded object.
    pub fn s3_location(&self, qualifier: &str) -> Value {
        json!({
            "S3Bucket": sub(&bootstrap_bucket_name(qualifier)),
            "S3Key": self.object_key(),
        })
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn bootstrap_bucket_name(qualifier: &str) -> String {
    format!("cdk-{qualifier}-assets-{ACCOUNT_PLACEHOLDER}-{REGION_PLACEHOLDER}")
}

pub fn resolve_placeholders(value: &str, account: &str, region: &str) -> String {
    value
        .replace(ACCOUNT_PLACEHOLDER, account)
        .replace(REGION_PLACEHOLDER, region)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetManifest {
    pub version: String,
    pub files: BTreeMap<String, FileAssetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAssetEntry {
    pub source: FileAssetSource,
    pub destinations: BTreeMap<String, FileDestination>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileAssetSource {
    pub path: String,
    pub packaging: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileDestination {
    pub bucket_name: String,
    pub object_key: String,
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            version: ASSET_MANIFEST_SCHEMA_VERSION.to_string(),
            files: BTreeMap::new(),
        }
    }
}

impl AssetManifest {
    pub fn from_assets<'a>(assets: impl IntoIterator<Item = &'a FileAsset>, qualifier: &str) -> Self {
        let mut manifest = Self::default();
        for asset in assets {
            manifest.files.insert(
                asset.hash.clone(),
                FileAssetEntry {
                    source: FileAssetSource {
                        path: asset.staged_file_name(),
                        packaging: "file".to_string(),
                    },
                    destinations: BTreeMap::from([(
                        CURRENT_ENVIRONMENT_DESTINATION.to_string(),
                        FileDestination {
                            bucket_name: bootstrap_bucket_name(qualifier),
                            object_key: asset.object_key(),
                        },
                    )]),
                },
            );
        }
        manifest
    }

    pub fn load(path: &Path) -> Result<Self, SynthError> {
        let raw = std::fs::read_to_string(path).map_err(|error| SynthError::io(path, error))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_asset_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("lambda/alb_alarm_lambda_handler.zip");

        let error = FileAsset::stage("ALBMonitorStack/ALBAlarmLambda/Code", &missing)
            .expect_err("missing asset should fail");
        assert!(matches!(error, SynthError::AssetNotFound(path) if path == missing));
    }

    #[test]
    fn identical_contents_share_an_object_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.zip");
        let second = dir.path().join("b.zip");
        std::fs::write(&first, b"handler").expect("write asset");
        std::fs::write(&second, b"handler").expect("write asset");

        let a = FileAsset::stage("a", &first).expect("stage a");
        let b = FileAsset::stage("b", &second).expect("stage b");

        assert_eq!(a.object_key(), b.object_key());
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn bucket_placeholders_resolve_per_environment() {
        let bucket = bootstrap_bucket_name("hnb659fds");
        assert_eq!(
            resolve_placeholders(&bucket, "123456789012", "eu-west-1"),
            "cdk-hnb659fds-assets-123456789012-eu-west-1"
        );
    }
}
