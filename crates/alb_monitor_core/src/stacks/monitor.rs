//! `ALBMonitorStack`: queue, execution role, shared layer, the decision and
//! enforcement functions, and the queue event source.

use std::path::Path;

use serde_json::{json, Value};

use crate::controller::environment_variables;
use crate::error::SynthError;
use crate::parameters::MONITOR_PARAMETERS;
use crate::stacks::{CrossStackReference, Stack};
use crate::template::{cfn_ref, get_att, Resource};

pub const DEFAULT_STACK_NAME: &str = "ALBMonitorStack";
const STACK_DESCRIPTION: &str = "ALB target group monitor: alarm and queue handlers";

pub const QUEUE_ID: &str = "alb_target_group_monitor_queue";
pub const ROLE_ID: &str = "ALB_Lambda_Role";
pub const LAYER_ID: &str = "ALBMonitorLayer";
pub const ALARM_FUNCTION_ID: &str = "ALBAlarmLambda";
pub const QUEUE_FUNCTION_ID: &str = "ALBSQSMessageLambda";

pub const LAYER_ASSET: &str = "lambda_layer/elb_load_monitor.zip";
pub const ALARM_HANDLER_ASSET: &str = "lambda/alb_alarm_lambda_handler.zip";
pub const QUEUE_HANDLER_ASSET: &str = "lambda/alb_alarm_check_lambda_handler.zip";

pub const ALARM_HANDLER: &str = "alb_alarm_lambda_handler.lambda_handler";
pub const QUEUE_HANDLER: &str = "alb_alarm_check_lambda_handler.lambda_handler";

pub const FUNCTION_RUNTIME: &str = "python3.8";
pub const LAYER_RUNTIMES: [&str; 2] = ["python3.7", "python3.8"];
pub const FUNCTION_MEMORY_MB: u32 = 128;

pub const SEND_MESSAGE_POLICY_NAME: &str = "SendMonitorQueueMessages";

// TODO: replace AWSLambdaExecute and ElasticLoadBalancingFullAccess with a
// scoped policy once the handlers' exact ELB calls are pinned down.
pub const MANAGED_POLICY_ARNS: [&str; 4] = [
    "arn:aws:iam::aws:policy/AWSLambdaExecute",
    "arn:aws:iam::aws:policy/service-role/AWSLambdaSQSQueueExecutionRole",
    "arn:aws:iam::aws:policy/CloudWatchReadOnlyAccess",
    "arn:aws:iam::aws:policy/ElasticLoadBalancingFullAccess",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorStack {
    pub stack: Stack,
    pub queue_id: String,
    pub role_id: String,
    pub layer_id: String,
    pub alarm_function_id: String,
    pub queue_function_id: String,
    pub event_source_mapping_id: String,
    /// ARN of the decision function, exported for the alarm stack.
    pub alarm_function_arn: CrossStackReference,
}

pub fn build_monitor_stack(
    name: &str,
    resources_dir: &Path,
    qualifier: &str,
) -> Result<MonitorStack, SynthError> {
    let mut stack = Stack::new(name, STACK_DESCRIPTION, qualifier);
    stack.declare_parameters(&MONITOR_PARAMETERS)?;

    let queue = Resource::new("AWS::SQS::Queue", Value::Null).removal_policy("Delete");
    let queue_id = stack.add_resource(&[QUEUE_ID, "Resource"], queue)?;

    let role = Resource::new(
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": {
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": { "Service": "lambda.amazonaws.com" },
                }],
                "Version": "2012-10-17",
            },
            "Description": "Role assumed by ALB monitoring lambdas",
            "ManagedPolicyArns": MANAGED_POLICY_ARNS,
            "Policies": [{
                "PolicyName": SEND_MESSAGE_POLICY_NAME,
                "PolicyDocument": send_message_policy(&queue_id),
            }],
        }),
    );
    let role_id = stack.add_resource(&[ROLE_ID, "Resource"], role)?;

    let layer_content =
        stack.add_file_asset(&[LAYER_ID, "Code"], &resources_dir.join(LAYER_ASSET))?;
    let layer = layer_content.annotate(
        Resource::new(
            "AWS::Lambda::LayerVersion",
            json!({
                "Content": &layer_content.location,
                "CompatibleRuntimes": LAYER_RUNTIMES,
                "Description": "ALBMonitoring Layer",
                "LayerName": LAYER_ID,
            }),
        ),
        "Content",
    );
    let layer_id = stack.add_resource(&[LAYER_ID, "Resource"], layer)?;

    let alarm_function_id = add_function(
        &mut stack,
        FunctionDefinition {
            construct_id: ALARM_FUNCTION_ID,
            asset: ALARM_HANDLER_ASSET,
            handler: ALARM_HANDLER,
            description: "Lambda Handler for ALB Alarms",
            environment: Some(environment_variables(&queue_id)),
        },
        resources_dir,
        &role_id,
        &layer_id,
    )?;

    let queue_function_id = add_function(
        &mut stack,
        FunctionDefinition {
            construct_id: QUEUE_FUNCTION_ID,
            asset: QUEUE_HANDLER_ASSET,
            handler: QUEUE_HANDLER,
            description: "Lambda Handler for SQS Messages from ALB Monitor",
            environment: None,
        },
        resources_dir,
        &role_id,
        &layer_id,
    )?;

    let source_id = format!("SqsEventSource:{queue_id}");
    let mapping = Resource::new(
        "AWS::Lambda::EventSourceMapping",
        json!({
            "FunctionName": cfn_ref(&queue_function_id),
            "EventSourceArn": get_att(&queue_id, "Arn"),
        }),
    );
    let event_source_mapping_id =
        stack.add_resource(&[QUEUE_FUNCTION_ID, source_id.as_str(), "Resource"], mapping)?;

    let alarm_function_arn = stack.export_attribute(&alarm_function_id, "Arn")?;

    tracing::info!(
        stack = %stack.name,
        resources = stack.template.resources.len(),
        assets = stack.assets.len(),
        "built monitor stack"
    );

    Ok(MonitorStack {
        stack,
        queue_id,
        role_id,
        layer_id,
        alarm_function_id,
        queue_function_id,
        event_source_mapping_id,
        alarm_function_arn,
    })
}

/// Inline policy letting the handlers enqueue delayed shed/restore messages.
pub fn send_message_policy(queue_logical_id: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": "sqs:SendMessage",
            "Resource": get_att(queue_logical_id, "Arn"),
        }],
    })
}

struct FunctionDefinition<'a> {
    construct_id: &'a str,
    asset: &'a str,
    handler: &'a str,
    description: &'a str,
    environment: Option<Value>,
}

fn add_function(
    stack: &mut Stack,
    definition: FunctionDefinition<'_>,
    resources_dir: &Path,
    role_id: &str,
    layer_id: &str,
) -> Result<String, SynthError> {
    let code = stack.add_file_asset(
        &[definition.construct_id, "Code"],
        &resources_dir.join(definition.asset),
    )?;

    let mut properties = json!({
        "Code": &code.location,
        "Role": get_att(role_id, "Arn"),
        "Description": definition.description,
        "FunctionName": definition.construct_id,
        "Handler": definition.handler,
        "Layers": [cfn_ref(layer_id)],
        "MemorySize": FUNCTION_MEMORY_MB,
        "Runtime": FUNCTION_RUNTIME,
    });
    if let Some(variables) = definition.environment {
        properties["Environment"] = json!({ "Variables": variables });
    }

    let function = code.annotate(
        Resource::new("AWS::Lambda::Function", properties).depends_on(role_id),
        "Code",
    );
    stack.add_resource(&[definition.construct_id, "Resource"], function)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_assets(dir: &Path) {
        for (asset, body) in [
            (LAYER_ASSET, "layer"),
            (ALARM_HANDLER_ASSET, "alarm"),
            (QUEUE_HANDLER_ASSET, "queue"),
        ] {
            let path = dir.join(asset);
            std::fs::create_dir_all(path.parent().expect("asset has parent"))
                .expect("create asset dir");
            std::fs::write(path, body).expect("write asset");
        }
    }

    #[test]
    fn decision_function_gets_controller_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let monitor = build_monitor_stack(DEFAULT_STACK_NAME, dir.path(), "hnb659fds")
            .expect("stack should build");
        let function = monitor
            .stack
            .template
            .resource(&monitor.alarm_function_id)
            .expect("alarm function exists");

        assert_eq!(
            function.property("Environment/Variables"),
            Some(&environment_variables(&monitor.queue_id))
        );
        assert_eq!(function.property("FunctionName"), Some(&json!("ALBAlarmLambda")));
        assert_eq!(function.property("MemorySize"), Some(&json!(128)));
        assert_eq!(function.depends_on, vec![monitor.role_id.clone()]);
    }

    #[test]
    fn enforcement_function_has_no_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let monitor = build_monitor_stack(DEFAULT_STACK_NAME, dir.path(), "hnb659fds")
            .expect("stack should build");
        let function = monitor
            .stack
            .template
            .resource(&monitor.queue_function_id)
            .expect("queue function exists");

        assert!(function.property("Environment").is_none());
        assert_eq!(function.property("Handler"), Some(&json!(QUEUE_HANDLER)));
    }

    #[test]
    fn stages_one_asset_per_zip() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let monitor = build_monitor_stack(DEFAULT_STACK_NAME, dir.path(), "hnb659fds")
            .expect("stack should build");

        assert_eq!(monitor.stack.assets.len(), 3);
        let layer = monitor
            .stack
            .template
            .resource(&monitor.layer_id)
            .expect("layer exists");
        assert_eq!(
            layer.property("Content/S3Bucket"),
            Some(&json!({ "Fn::Sub": "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}" }))
        );
    }

    #[test]
    fn asset_metadata_names_the_staged_copy() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());

        let monitor = build_monitor_stack(DEFAULT_STACK_NAME, dir.path(), "hnb659fds")
            .expect("stack should build");
        let staged: Vec<String> = monitor
            .stack
            .assets
            .iter()
            .map(|asset| asset.staged_file_name())
            .collect();

        for (id, property) in [
            (&monitor.layer_id, "Content"),
            (&monitor.alarm_function_id, "Code"),
            (&monitor.queue_function_id, "Code"),
        ] {
            let resource = monitor.stack.template.resource(id).expect("resource exists");
            let path = resource.metadata["aws:asset:path"]
                .as_str()
                .expect("asset path is a string");
            assert!(path.starts_with("asset.") && path.ends_with(".zip"));
            assert!(staged.iter().any(|name| name == path));
            assert_eq!(resource.metadata["aws:asset:property"], json!(property));
        }
    }

    #[test]
    fn missing_handler_zip_fails_the_stack() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_assets(dir.path());
        std::fs::remove_file(dir.path().join(QUEUE_HANDLER_ASSET)).expect("remove asset");

        let error = build_monitor_stack(DEFAULT_STACK_NAME, dir.path(), "hnb659fds")
            .expect_err("missing asset should fail");
        assert!(matches!(error, SynthError::AssetNotFound(_)));
    }
}
