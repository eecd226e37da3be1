//! `ALBCloudWatchStack`: the target group alarm and the EventBridge rule that
//! forwards its state changes to the decision function.

use serde_json::json;

use crate::context::{target_group_dimension, SynthContext, ELB_TARGET_GROUP_ARN};
use crate::error::SynthError;
use crate::parameters::{
    CLOUDWATCH_PARAMETERS, CW_ALARM_METRIC_NAME, CW_ALARM_NAMESPACE, CW_ALARM_PERIODS,
    CW_ALARM_THRESHOLD,
};
use crate::stacks::{CrossStackReference, Stack};
use crate::template::{get_att, Resource};

pub const DEFAULT_STACK_NAME: &str = "ALBCloudWatchStack";
const STACK_DESCRIPTION: &str = "ALB target group monitor: alarm and event routing";

pub const ALARM_ID: &str = "ALBTargetGroupAlarm";
pub const RULE_ID: &str = "ALBTargetGroupAlarmEventRule";
pub const ALARM_PERIOD_SECS: u32 = 60;
// CloudWatch needs a literal statistic, so it cannot be a parameter.
pub const ALARM_STATISTIC: &str = "Sum";
pub const ALARM_COMPARISON: &str = "GreaterThanThreshold";
pub const TARGET_GROUP_DIMENSION: &str = "TargetGroup";

pub const ALARM_EVENT_SOURCE: &str = "aws.cloudwatch";
pub const ALARM_EVENT_DETAIL_TYPE: &str = "CloudWatch Alarm State Change";

#[derive(Debug, Clone, PartialEq)]
pub struct CloudWatchStack {
    pub stack: Stack,
    pub alarm_id: String,
    pub rule_id: String,
    pub permission_id: String,
    pub target_group_dimension: String,
}

pub fn build_cloudwatch_stack(
    name: &str,
    context: &SynthContext,
    alarm_function_arn: &CrossStackReference,
) -> Result<CloudWatchStack, SynthError> {
    let target_group_arn = context.require(ELB_TARGET_GROUP_ARN, "ELB_TARGET_GROUP_ARN")?;
    let dimension = target_group_dimension(target_group_arn)?.to_string();

    let mut stack = Stack::new(name, STACK_DESCRIPTION, context.bootstrap_qualifier());
    stack.declare_parameters(&CLOUDWATCH_PARAMETERS)?;

    let alarm = Resource::new(
        "AWS::CloudWatch::Alarm",
        json!({
            "AlarmName": ALARM_ID,
            "AlarmDescription": "Alarm for RequestCountPerTarget",
            "ComparisonOperator": ALARM_COMPARISON,
            "EvaluationPeriods": CW_ALARM_PERIODS.reference(),
            "Threshold": CW_ALARM_THRESHOLD.reference(),
            "Namespace": CW_ALARM_NAMESPACE.reference(),
            "MetricName": CW_ALARM_METRIC_NAME.reference(),
            "Dimensions": [{ "Name": TARGET_GROUP_DIMENSION, "Value": dimension }],
            "Period": ALARM_PERIOD_SECS,
            "Statistic": ALARM_STATISTIC,
        }),
    );
    let alarm_id = stack.add_resource(&[ALARM_ID, "Resource"], alarm)?;

    let function_arn = stack.import(alarm_function_arn);

    let rule = Resource::new(
        "AWS::Events::Rule",
        json!({
            "Name": RULE_ID,
            "Description": "EventBridge rule for ALB target",
            "EventPattern": {
                "source": [ALARM_EVENT_SOURCE],
                "detail-type": [ALARM_EVENT_DETAIL_TYPE],
                "resources": [get_att(&alarm_id, "Arn")],
            },
            "State": "ENABLED",
            "Targets": [{ "Arn": function_arn.clone(), "Id": "Target0" }],
        }),
    );
    let rule_id = stack.add_resource(&[RULE_ID, "Resource"], rule)?;

    let permission = Resource::new(
        "AWS::Lambda::Permission",
        json!({
            "Action": "lambda:InvokeFunction",
            "FunctionName": function_arn,
            "Principal": "events.amazonaws.com",
            "SourceArn": get_att(&rule_id, "Arn"),
        }),
    );
    let permission_id =
        stack.add_resource(&[RULE_ID, "AllowEventRuleALBAlarmLambda"], permission)?;

    tracing::info!(
        stack = %stack.name,
        target_group = %dimension,
        "built cloudwatch stack"
    );

    Ok(CloudWatchStack {
        stack,
        alarm_id,
        rule_id,
        permission_id,
        target_group_dimension: dimension,
    })
}
