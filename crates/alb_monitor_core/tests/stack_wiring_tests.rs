use std::path::Path;

use alb_monitor_core::app::{synthesize, AppConfig, AssemblyManifest, CloudAssembly};
use alb_monitor_core::assets::AssetManifest;
use alb_monitor_core::context::{SynthContext, ELB_TARGET_GROUP_ARN};
use alb_monitor_core::controller::{self, ControllerSettings};
use alb_monitor_core::parameters::ParameterOverride;
use alb_monitor_core::stacks::monitor::{
    ALARM_HANDLER_ASSET, LAYER_ASSET, MANAGED_POLICY_ARNS, QUEUE_HANDLER_ASSET,
};
use alb_monitor_core::template::{cfn_ref, get_att};
use alb_monitor_core::SynthError;
use serde_json::{json, Value};

const TARGET_GROUP_ARN: &str =
    "arn:aws:elasticloadbalancing:us-east-1:123456789012:targetgroup/web/6d0ecf831eec9f09";

fn write_resources(dir: &Path) {
    for (asset, body) in [
        (LAYER_ASSET, "layer-bytes"),
        (ALARM_HANDLER_ASSET, "alarm-handler-bytes"),
        (QUEUE_HANDLER_ASSET, "queue-handler-bytes"),
    ] {
        let path = dir.join(asset);
        std::fs::create_dir_all(path.parent().expect("asset path has a parent"))
            .expect("asset directory should be created");
        std::fs::write(path, body).expect("asset should be written");
    }
}

fn synthesize_default(dir: &Path) -> CloudAssembly {
    write_resources(dir);
    let config = AppConfig::new(
        dir,
        SynthContext::new().with(ELB_TARGET_GROUP_ARN, TARGET_GROUP_ARN),
    );
    synthesize(&config).expect("synthesis should pass")
}

#[test]
fn synthesis_fails_without_target_group_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_resources(dir.path());
    let config = AppConfig::new(dir.path(), SynthContext::new());

    let error = synthesize(&config).expect_err("missing context should fail");

    assert!(matches!(&error, SynthError::MissingContext { key, .. } if key == ELB_TARGET_GROUP_ARN));
    assert!(error
        .to_string()
        .starts_with("Must specify context parameter elbTargetGroupArn."));
}

#[test]
fn inline_policy_grants_only_send_message_on_the_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(dir.path());
    let template = &assembly.monitor.stack.template;

    let role = template
        .resource(&assembly.monitor.role_id)
        .expect("role should exist");
    let policies = role
        .property("Policies")
        .and_then(Value::as_array)
        .expect("role should carry inline policies");
    assert_eq!(policies.len(), 1);

    let statements = policies[0]["PolicyDocument"]["Statement"]
        .as_array()
        .expect("policy should have statements");
    assert_eq!(
        statements,
        &vec![json!({
            "Effect": "Allow",
            "Action": "sqs:SendMessage",
            "Resource": get_att(&assembly.monitor.queue_id, "Arn"),
        })]
    );

    assert_eq!(
        role.property("ManagedPolicyArns"),
        Some(&json!(MANAGED_POLICY_ARNS))
    );
    assert_eq!(
        role.property("AssumeRolePolicyDocument/Statement/0/Principal/Service"),
        Some(&json!("lambda.amazonaws.com"))
    );
}

#[test]
fn alarm_uses_one_minute_period_and_parameters() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(dir.path());
    let template = &assembly.cloudwatch.stack.template;

    let alarms: Vec<_> = template.resources_of_type("AWS::CloudWatch::Alarm").collect();
    assert_eq!(alarms.len(), 1);
    let (_, alarm) = alarms[0];

    assert_eq!(alarm.property("Period"), Some(&json!(60)));
    assert_eq!(
        alarm.property("Threshold"),
        Some(&cfn_ref("cwAlarmThreshold"))
    );
    assert_eq!(
        alarm.property("EvaluationPeriods"),
        Some(&cfn_ref("cwAlarmPeriods"))
    );
    assert_eq!(
        alarm.property("ComparisonOperator"),
        Some(&json!("GreaterThanThreshold"))
    );
    assert_eq!(
        alarm.property("Dimensions/0/Value"),
        Some(&json!("targetgroup/web/6d0ecf831eec9f09"))
    );
    assert_eq!(template.parameters["cwAlarmThreshold"].default, Some(json!(500)));
    assert_eq!(template.parameters["cwAlarmPeriods"].default, Some(json!(3)));
}

#[test]
fn queue_is_event_source_for_enforcement_function() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(dir.path());
    let template = &assembly.monitor.stack.template;

    let mappings: Vec<_> = template
        .resources_of_type("AWS::Lambda::EventSourceMapping")
        .collect();
    assert_eq!(mappings.len(), 1);
    let (_, mapping) = mappings[0];

    assert_eq!(
        mapping.property("FunctionName"),
        Some(&cfn_ref(&assembly.monitor.queue_function_id))
    );
    assert_eq!(
        mapping.property("EventSourceArn"),
        Some(&get_att(&assembly.monitor.queue_id, "Arn"))
    );
}

#[test]
fn event_rule_invokes_decision_function_from_monitor_stack() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(dir.path());

    let export = &assembly.monitor.stack.template.outputs;
    let (_, output) = export
        .iter()
        .next()
        .expect("monitor stack should export the decision function");
    assert_eq!(
        output.value,
        get_att(&assembly.monitor.alarm_function_id, "Arn")
    );
    let export_name = &output.export.as_ref().expect("output is exported").name;

    let rule = assembly
        .cloudwatch
        .stack
        .template
        .resource(&assembly.cloudwatch.rule_id)
        .expect("rule should exist");
    assert_eq!(
        rule.property("Targets/0/Arn"),
        Some(&json!({ "Fn::ImportValue": export_name }))
    );
    assert_eq!(
        rule.property("EventPattern"),
        Some(&json!({
            "source": ["aws.cloudwatch"],
            "detail-type": ["CloudWatch Alarm State Change"],
            "resources": [get_att(&assembly.cloudwatch.alarm_id, "Arn")],
        }))
    );
}

#[test]
fn decision_environment_satisfies_controller_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(dir.path());
    let template = &assembly.monitor.stack.template;
    let function = template
        .resource(&assembly.monitor.alarm_function_id)
        .expect("decision function should exist");
    let variables = function
        .property("Environment/Variables")
        .and_then(Value::as_object)
        .expect("decision function should have environment");

    // Resolve every Ref the way CloudFormation would with default parameters.
    let resolve = |name: &str| -> Option<String> {
        let logical_id = variables.get(name)?.get("Ref")?.as_str()?;
        if logical_id == assembly.monitor.queue_id {
            return Some("https://sqs.us-east-1.amazonaws.com/123456789012/monitor".to_string());
        }
        match template.parameters.get(logical_id)?.default.as_ref() {
            Some(Value::Number(number)) => Some(number.to_string()),
            Some(Value::String(text)) => Some(text.clone()),
            _ => Some(format!("arn:aws:elasticloadbalancing:::{logical_id}")),
        }
    };

    let settings = ControllerSettings::from_lookup(resolve).expect("contract should hold");
    assert_eq!(settings.shed_percent, 5);
    assert_eq!(settings.max_shed_percent, 100);
    assert_eq!(settings.restore_percent, 5);
    assert_eq!(settings.shed_message_delay_secs, 60);
    assert_eq!(settings.restore_message_delay_secs, 120);
    assert!(variables.contains_key(controller::SQS_QUEUE_URL));
}

#[test]
fn out_of_range_override_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_resources(dir.path());
    let mut config = AppConfig::new(
        dir.path(),
        SynthContext::new().with(ELB_TARGET_GROUP_ARN, TARGET_GROUP_ARN),
    );
    config.parameter_overrides =
        vec![ParameterOverride::parse("maxElbShedPercent=150").expect("override parses")];

    let error = synthesize(&config).expect_err("override above max should fail");
    assert_eq!(
        error.to_string(),
        "parameter 'maxElbShedPercent' must be at most 100, got 150"
    );
}

#[test]
fn fractional_percent_override_is_rejected_before_deploy() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_resources(dir.path());
    let mut config = AppConfig::new(
        dir.path(),
        SynthContext::new().with(ELB_TARGET_GROUP_ARN, TARGET_GROUP_ARN),
    );
    config.parameter_overrides =
        vec![ParameterOverride::parse("elbShedPercent=2.5").expect("override parses")];

    let error = synthesize(&config).expect_err("fractional percent should fail");
    assert!(matches!(&error, SynthError::InvalidParameter { name, .. } if name == "elbShedPercent"));
}

#[test]
fn stack_name_with_path_separators_is_rejected() {
    let resources = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_resources(resources.path());
    let mut config = AppConfig::new(
        resources.path(),
        SynthContext::new().with(ELB_TARGET_GROUP_ARN, TARGET_GROUP_ARN),
    );
    config.monitor_stack_name = "../Escaped Stack".to_string();
    let target = out.path().join("cdk.out");

    let result = synthesize(&config).and_then(|assembly| assembly.write_to(&target));

    assert!(matches!(result, Err(SynthError::InvalidStackName(name)) if name == "../Escaped Stack"));
    assert!(!out.path().join("Escaped Stack.template.json").exists());
    assert!(!target.exists());
}

#[test]
fn written_assembly_lists_templates_and_assets() {
    let resources = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    let assembly = synthesize_default(resources.path());

    assembly
        .write_to(out.path())
        .expect("assembly should be written");

    let manifest = AssemblyManifest::load(out.path()).expect("manifest should load");
    assert_eq!(
        manifest.artifacts["ALBMonitorStack"]
            .properties
            .template_file
            .as_deref(),
        Some("ALBMonitorStack.template.json")
    );
    assert!(manifest.artifacts["ALBCloudWatchStack"]
        .dependencies
        .contains(&"ALBMonitorStack".to_string()));

    let mut asset_files = manifest.asset_manifest_files();
    asset_files.sort_unstable();
    assert_eq!(
        asset_files,
        vec!["ALBCloudWatchStack.assets.json", "ALBMonitorStack.assets.json"]
    );

    let assets = AssetManifest::load(&out.path().join("ALBMonitorStack.assets.json"))
        .expect("asset manifest should load");
    assert_eq!(assets.files.len(), 3);
    for entry in assets.files.values() {
        assert!(out.path().join(&entry.source.path).is_file());
    }

    let template: Value = serde_json::from_str(
        &std::fs::read_to_string(out.path().join("ALBCloudWatchStack.template.json"))
            .expect("template should be readable"),
    )
    .expect("template should be json");
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
}

#[test]
fn failed_synthesis_writes_nothing() {
    let resources = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_resources(resources.path());
    let target = out.path().join("cdk.out");
    let config = AppConfig::new(resources.path(), SynthContext::new());

    let result = synthesize(&config).and_then(|assembly| assembly.write_to(&target));

    assert!(matches!(result, Err(SynthError::MissingContext { .. })));
    assert!(!target.exists());
}
