//! Stack artifacts and the naming rules shared by both stacks.

pub mod cloudwatch;
pub mod monitor;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::assets::FileAsset;
use crate::error::SynthError;
use crate::parameters::{find_spec, ParameterSpec};
use crate::template::{get_att, import_value, Export, Output, Resource, Template};

/// Construct ids dropped from the human-readable part of a logical id.
const HIDDEN_IDS: [&str; 2] = ["Resource", "Default"];
const HASH_LEN: usize = 8;
const MAX_STACK_NAME_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub name: String,
    pub template: Template,
    pub assets: Vec<FileAsset>,
    pub dependencies: Vec<String>,
    /// Deploy-time parameter values, already validated.
    pub parameter_values: BTreeMap<String, String>,
    parameter_specs: Vec<ParameterSpec>,
    qualifier: String,
}

/// Where a staged asset ends up: the `S3Bucket`/`S3Key` property value and
/// the file name of its copy in the assembly directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAsset {
    pub location: Value,
    pub file_name: String,
}

impl StagedAsset {
    /// Adds the `aws:asset:*` metadata tooling uses to find the local copy.
    pub fn annotate(&self, resource: Resource, property: &str) -> Resource {
        resource
            .with_metadata("aws:asset:path", Value::from(self.file_name.as_str()))
            .with_metadata("aws:asset:property", Value::from(property))
    }
}

/// A value exported by one stack and importable by another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossStackReference {
    pub producer: String,
    pub export_name: String,
}

impl CrossStackReference {
    pub fn import(&self) -> Value {
        import_value(&self.export_name)
    }
}

impl Stack {
    pub fn new(name: impl Into<String>, description: &str, qualifier: &str) -> Self {
        let mut template = Template::new();
        template.description = Some(description.to_string());
        Self {
            name: name.into(),
            template,
            assets: Vec::new(),
            dependencies: Vec::new(),
            parameter_values: BTreeMap::new(),
            parameter_specs: Vec::new(),
            qualifier: qualifier.to_string(),
        }
    }

    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    pub fn declare_parameters(&mut self, specs: &[ParameterSpec]) -> Result<(), SynthError> {
        for spec in specs {
            self.template.add_parameter(spec.id, spec.to_template())?;
            self.parameter_specs.push(*spec);
        }
        Ok(())
    }

    pub fn declares_parameter(&self, key: &str) -> bool {
        find_spec(&self.parameter_specs, key).is_some()
    }

    pub fn set_parameter_value(&mut self, key: &str, raw: &str) -> Result<(), SynthError> {
        let spec = find_spec(&self.parameter_specs, key)
            .ok_or_else(|| SynthError::UnknownParameter(key.to_string()))?;
        let value = spec.validate(raw)?;
        self.parameter_values.insert(key.to_string(), value);
        Ok(())
    }

    /// Parameters without a default that were not given a value; CloudFormation
    /// will refuse to create the stack until they are supplied.
    pub fn unset_required_parameters(&self) -> Vec<&'static str> {
        self.parameter_specs
            .iter()
            .filter(|spec| spec.default.is_none() && !self.parameter_values.contains_key(spec.id))
            .map(|spec| spec.id)
            .collect()
    }

    /// Stages a file asset for the construct at `path`. The same file content
    /// is only recorded once.
    pub fn add_file_asset(
        &mut self,
        path: &[&str],
        source: &Path,
    ) -> Result<StagedAsset, SynthError> {
        let asset = FileAsset::stage(self.construct_path(path), source)?;
        let staged = StagedAsset {
            location: asset.s3_location(&self.qualifier),
            file_name: asset.staged_file_name(),
        };
        if !self.assets.iter().any(|existing| existing.hash == asset.hash) {
            self.assets.push(asset);
        }
        Ok(staged)
    }

    /// Adds a resource for the construct at `path` and returns its logical id.
    pub fn add_resource(&mut self, path: &[&str], resource: Resource) -> Result<String, SynthError> {
        let id = logical_id(path);
        let resource =
            resource.with_metadata("aws:cdk:path", Value::from(self.construct_path(path)));
        self.template.add_resource(&id, resource)?;
        Ok(id)
    }

    pub fn add_dependency(&mut self, stack_name: &str) {
        if !self.dependencies.iter().any(|name| name == stack_name) {
            self.dependencies.push(stack_name.to_string());
        }
    }

    pub fn construct_path(&self, path: &[&str]) -> String {
        std::iter::once(self.name.as_str())
            .chain(path.iter().copied())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Adds an output exporting `Fn::GetAtt` of a resource in this stack.
    pub fn export_attribute(
        &mut self,
        logical_id: &str,
        attribute: &str,
    ) -> Result<CrossStackReference, SynthError> {
        let output_id = format!(
            "ExportsOutputFnGetAtt{logical_id}{}",
            remove_non_alphanumeric(attribute)
        );
        let export_name = format!("{}:{output_id}", self.name);
        self.template.add_output(
            &output_id,
            Output {
                value: get_att(logical_id, attribute),
                description: None,
                export: Some(Export {
                    name: export_name.clone(),
                }),
            },
        )?;
        Ok(CrossStackReference {
            producer: self.name.clone(),
            export_name,
        })
    }

    /// Resolves a reference produced by another stack and records the
    /// deployment-order dependency.
    pub fn import(&mut self, reference: &CrossStackReference) -> Value {
        self.add_dependency(&reference.producer);
        reference.import()
    }
}

/// Stack names become file names in the assembly and prefixes of export
/// names, so they follow CloudFormation's `[A-Za-z][A-Za-z0-9-]*` rule.
pub fn validate_stack_name(name: &str) -> Result<(), SynthError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        && name.len() <= MAX_STACK_NAME_LEN;
    if valid {
        Ok(())
    } else {
        Err(SynthError::InvalidStackName(name.to_string()))
    }
}

/// CloudFormation logical id for a construct path relative to its stack.
///
/// A single-component path keeps its id (minus non-alphanumerics). Longer
/// paths join the visible components and append a hash of the full path so
/// that ids stay unique when sanitized names collide.
pub fn logical_id(path: &[&str]) -> String {
    if let [single] = path {
        return remove_non_alphanumeric(single);
    }

    let mut human = String::new();
    let mut previous: Option<&str> = None;
    for component in path {
        if HIDDEN_IDS.contains(component) || previous == Some(*component) {
            continue;
        }
        human.push_str(&remove_non_alphanumeric(component));
        previous = Some(component);
    }

    let mut hasher = Sha256::new();
    hasher.update(path.join("/"));
    let digest = format!("{:X}", hasher.finalize());
    format!("{human}{}", &digest[..HASH_LEN])
}

fn remove_non_alphanumeric(value: &str) -> String {
    value.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_component_id_is_kept() {
        assert_eq!(logical_id(&["elbShedPercent"]), "elbShedPercent");
    }

    #[test]
    fn resource_component_is_hidden_and_hash_appended() {
        let id = logical_id(&["alb_target_group_monitor_queue", "Resource"]);
        assert!(id.starts_with("albtargetgroupmonitorqueue"));
        assert_eq!(id.len(), "albtargetgroupmonitorqueue".len() + HASH_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn sanitized_collisions_get_distinct_hashes() {
        let a = logical_id(&["ALB_Lambda_Role", "Resource"]);
        let b = logical_id(&["ALBLambdaRole", "Resource"]);
        assert_ne!(a, b);
        assert_eq!(a[..13], b[..13]);
    }

    #[test]
    fn export_records_producer_and_import_adds_dependency() {
        let mut producer = Stack::new("Producer", "producer", "hnb659fds");
        let reference = producer
            .export_attribute("FunctionABC", "Arn")
            .expect("export should be added");
        assert_eq!(reference.export_name, "Producer:ExportsOutputFnGetAttFunctionABCArn");
        assert!(producer
            .template
            .outputs
            .contains_key("ExportsOutputFnGetAttFunctionABCArn"));

        let mut consumer = Stack::new("Consumer", "consumer", "hnb659fds");
        let value = consumer.import(&reference);
        consumer.import(&reference);

        assert_eq!(value, import_value("Producer:ExportsOutputFnGetAttFunctionABCArn"));
        assert_eq!(consumer.dependencies, vec!["Producer".to_string()]);
    }

    #[test]
    fn stack_names_follow_cloudformation_rules() {
        validate_stack_name("ALBMonitorStack").expect("default name is valid");
        validate_stack_name("alb-monitor-2").expect("hyphens and digits are valid");

        for name in ["", "2Stack", "../Escaped Stack", "Stack_1", "a/b"] {
            assert!(
                matches!(validate_stack_name(name), Err(SynthError::InvalidStackName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(validate_stack_name(&"A".repeat(129)).is_err());
    }

    #[test]
    fn rejects_value_for_undeclared_parameter() {
        let mut stack = Stack::new("Stack", "stack", "hnb659fds");
        let error = stack
            .set_parameter_value("elbArn", "arn")
            .expect_err("undeclared parameter should fail");
        assert!(matches!(error, SynthError::UnknownParameter(_)));
    }
}
