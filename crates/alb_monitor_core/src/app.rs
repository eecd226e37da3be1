//! The two-stack app and its cloud assembly output.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::AssetManifest;
use crate::context::SynthContext;
use crate::error::SynthError;
use crate::parameters::ParameterOverride;
use crate::stacks::cloudwatch::{self, build_cloudwatch_stack, CloudWatchStack};
use crate::stacks::monitor::{self, build_monitor_stack, MonitorStack};
use crate::stacks::{validate_stack_name, Stack};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const CLOUD_ASSEMBLY_SCHEMA_VERSION: &str = "36.0.0";
pub const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";
pub const ASSET_MANIFEST_ARTIFACT_TYPE: &str = "cdk:asset-manifest";
const UNKNOWN_ENVIRONMENT: &str = "aws://unknown-account/unknown-region";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEnvironment {
    pub account: String,
    pub region: String,
}

impl StackEnvironment {
    pub fn uri(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub monitor_stack_name: String,
    pub cloudwatch_stack_name: String,
    /// Directory holding `lambda/` and `lambda_layer/` zip packages.
    pub resources_dir: PathBuf,
    pub context: SynthContext,
    pub parameter_overrides: Vec<ParameterOverride>,
    pub environment: Option<StackEnvironment>,
}

impl AppConfig {
    pub fn new(resources_dir: impl Into<PathBuf>, context: SynthContext) -> Self {
        Self {
            monitor_stack_name: monitor::DEFAULT_STACK_NAME.to_string(),
            cloudwatch_stack_name: cloudwatch::DEFAULT_STACK_NAME.to_string(),
            resources_dir: resources_dir.into(),
            context,
            parameter_overrides: Vec::new(),
            environment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    pub monitor: MonitorStack,
    pub cloudwatch: CloudWatchStack,
    pub environment: Option<StackEnvironment>,
}

pub fn synthesize(config: &AppConfig) -> Result<CloudAssembly, SynthError> {
    validate_stack_name(&config.monitor_stack_name)?;
    validate_stack_name(&config.cloudwatch_stack_name)?;
    if config.monitor_stack_name == config.cloudwatch_stack_name {
        return Err(SynthError::DuplicateStackName(
            config.monitor_stack_name.clone(),
        ));
    }

    let mut monitor = build_monitor_stack(
        &config.monitor_stack_name,
        &config.resources_dir,
        config.context.bootstrap_qualifier(),
    )?;
    let mut cloudwatch = build_cloudwatch_stack(
        &config.cloudwatch_stack_name,
        &config.context,
        &monitor.alarm_function_arn,
    )?;

    for parameter in &config.parameter_overrides {
        apply_override(parameter, &mut [&mut monitor.stack, &mut cloudwatch.stack])?;
    }

    for stack in [&monitor.stack, &cloudwatch.stack] {
        let unset = stack.unset_required_parameters();
        if !unset.is_empty() {
            tracing::warn!(
                stack = %stack.name,
                parameters = ?unset,
                "parameters without defaults must be supplied at deploy time"
            );
        }
    }

    Ok(CloudAssembly {
        monitor,
        cloudwatch,
        environment: config.environment.clone(),
    })
}

fn apply_override(
    parameter: &ParameterOverride,
    stacks: &mut [&mut Stack],
) -> Result<(), SynthError> {
    if let Some(target) = &parameter.stack {
        if !stacks.iter().any(|stack| &stack.name == target) {
            return Err(SynthError::UnknownStack(target.clone()));
        }
    }

    let mut applied = false;
    for stack in stacks.iter_mut() {
        if parameter.applies_to(&stack.name) && stack.declares_parameter(&parameter.key) {
            stack.set_parameter_value(&parameter.key, &parameter.value)?;
            applied = true;
        }
    }

    if applied {
        Ok(())
    } else {
        Err(SynthError::UnknownParameter(parameter.key.clone()))
    }
}

impl CloudAssembly {
    /// Stacks in deployment order.
    pub fn stacks(&self) -> [&Stack; 2] {
        [&self.monitor.stack, &self.cloudwatch.stack]
    }

    pub fn manifest(&self) -> AssemblyManifest {
        let environment = self
            .environment
            .as_ref()
            .map(StackEnvironment::uri)
            .unwrap_or_else(|| UNKNOWN_ENVIRONMENT.to_string());

        let mut artifacts = BTreeMap::new();
        for stack in self.stacks() {
            let assets_id = format!("{}.assets", stack.name);
            artifacts.insert(
                assets_id.clone(),
                ArtifactManifest {
                    artifact_type: ASSET_MANIFEST_ARTIFACT_TYPE.to_string(),
                    environment: None,
                    properties: ArtifactProperties {
                        file: Some(asset_manifest_file(stack)),
                        ..ArtifactProperties::default()
                    },
                    dependencies: Vec::new(),
                },
            );

            let mut dependencies = stack.dependencies.clone();
            dependencies.push(assets_id);
            artifacts.insert(
                stack.name.clone(),
                ArtifactManifest {
                    artifact_type: STACK_ARTIFACT_TYPE.to_string(),
                    environment: Some(environment.clone()),
                    properties: ArtifactProperties {
                        template_file: Some(template_file(stack)),
                        parameters: stack.parameter_values.clone(),
                        ..ArtifactProperties::default()
                    },
                    dependencies,
                },
            );
        }

        AssemblyManifest {
            version: CLOUD_ASSEMBLY_SCHEMA_VERSION.to_string(),
            artifacts,
        }
    }

    /// Writes templates, asset manifests, staged assets and `manifest.json`
    /// into `dir`, creating it if needed. Returns the manifest path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, SynthError> {
        std::fs::create_dir_all(dir).map_err(|error| SynthError::io(dir, error))?;

        for stack in self.stacks() {
            write_file(
                &dir.join(template_file(stack)),
                stack.template.to_json_pretty()?,
            )?;

            let asset_manifest = AssetManifest::from_assets(&stack.assets, stack.qualifier());
            write_file(
                &dir.join(asset_manifest_file(stack)),
                serde_json::to_string_pretty(&asset_manifest)?,
            )?;

            for asset in &stack.assets {
                let staged = dir.join(asset.staged_file_name());
                if staged.exists() {
                    continue;
                }
                std::fs::copy(&asset.source, &staged)
                    .map_err(|error| SynthError::io(&asset.source, error))?;
            }
        }

        let manifest_path = dir.join(MANIFEST_FILE);
        write_file(
            &manifest_path,
            serde_json::to_string_pretty(&self.manifest())?,
        )?;
        tracing::info!(path = %dir.display(), "wrote cloud assembly");
        Ok(manifest_path)
    }
}

pub fn template_file(stack: &Stack) -> String {
    format!("{}.template.json", stack.name)
}

pub fn asset_manifest_file(stack: &Stack) -> String {
    format!("{}.assets.json", stack.name)
}

fn write_file(path: &Path, contents: String) -> Result<(), SynthError> {
    std::fs::write(path, contents).map_err(|error| SynthError::io(path, error))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssemblyManifest {
    pub version: String,
    pub artifacts: BTreeMap<String, ArtifactManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactManifest {
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub properties: ArtifactProperties,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl AssemblyManifest {
    pub fn load(dir: &Path) -> Result<Self, SynthError> {
        let path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|error| SynthError::io(&path, error))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Asset manifest files referenced by the assembly, relative to its directory.
    pub fn asset_manifest_files(&self) -> Vec<&str> {
        self.artifacts
            .values()
            .filter(|artifact| artifact.artifact_type == ASSET_MANIFEST_ARTIFACT_TYPE)
            .filter_map(|artifact| artifact.properties.file.as_deref())
            .collect()
    }

    /// Stack artifact names ordered so every stack follows its dependencies.
    pub fn stacks_in_deployment_order(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = Vec::new();
        let stacks: Vec<(&String, &ArtifactManifest)> = self
            .artifacts
            .iter()
            .filter(|(_, artifact)| artifact.artifact_type == STACK_ARTIFACT_TYPE)
            .collect();

        while ordered.len() < stacks.len() {
            let before = ordered.len();
            for (name, artifact) in &stacks {
                if ordered.contains(&name.as_str()) {
                    continue;
                }
                let ready = artifact.dependencies.iter().all(|dependency| {
                    ordered.contains(&dependency.as_str())
                        || !stacks.iter().any(|(other, _)| *other == dependency)
                });
                if ready {
                    ordered.push(name.as_str());
                }
            }
            if ordered.len() == before {
                // Cyclic dependencies: keep the remaining stacks in name order.
                for (name, _) in &stacks {
                    if !ordered.contains(&name.as_str()) {
                        ordered.push(name.as_str());
                    }
                }
            }
        }
        ordered
    }
}
