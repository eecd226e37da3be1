use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::SynthError;

pub const ELB_TARGET_GROUP_ARN: &str = "elbTargetGroupArn";
pub const BOOTSTRAP_QUALIFIER: &str = "@aws-cdk/core:bootstrapQualifier";
pub const DEFAULT_BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

const TARGET_GROUP_SEGMENT: &str = "targetgroup";

/// Synthesis-time key/value context.
///
/// Values come from a `cdk.json`-style file and from `key=value` pairs on the
/// command line; later sources win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthContext {
    values: BTreeMap<String, String>,
}

impl SynthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_pair(&mut self, pair: &str) -> Result<(), SynthError> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| SynthError::MalformedContext(pair.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(SynthError::MalformedContext(pair.to_string()));
        }
        self.set(key, value.trim());
        Ok(())
    }

    /// Merges the `context` object of a JSON file. Non-string values are kept
    /// in their JSON text form.
    pub fn merge_file(&mut self, path: &Path) -> Result<(), SynthError> {
        let raw = std::fs::read_to_string(path).map_err(|error| SynthError::io(path, error))?;
        let document: Value = serde_json::from_str(&raw)?;
        let Some(entries) = document.get("context").and_then(Value::as_object) else {
            return Err(SynthError::InvalidContextFile {
                path: path.to_path_buf(),
            });
        };

        for (key, value) in entries {
            let text = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            self.values.insert(key.clone(), text);
        }
        Ok(())
    }

    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str, placeholder: &str) -> Result<&str, SynthError> {
        match self.try_get(key) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(SynthError::MissingContext {
                key: key.to_string(),
                placeholder: placeholder.to_string(),
            }),
        }
    }

    pub fn bootstrap_qualifier(&self) -> &str {
        self.try_get(BOOTSTRAP_QUALIFIER)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BOOTSTRAP_QUALIFIER)
    }
}

/// Returns the `TargetGroup` metric dimension for a target group ARN: the ARN
/// suffix starting at `targetgroup`.
pub fn target_group_dimension(target_group_arn: &str) -> Result<&str, SynthError> {
    target_group_arn
        .find(TARGET_GROUP_SEGMENT)
        .map(|start| &target_group_arn[start..])
        .ok_or_else(|| SynthError::InvalidTargetGroupArn(target_group_arn.to_string()))
}
