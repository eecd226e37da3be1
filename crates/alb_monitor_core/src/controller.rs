//! Environment contract between the stacks and the shed/restore handlers.
//!
//! The monitor stack renders these variables into the decision function's
//! configuration; handler packagers parse them back with
//! [`ControllerSettings::from_lookup`] to check a deployment.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::parameters::{
    ParameterSpec, ELB_ARN as ELB_ARN_PARAMETER, ELB_LISTENER_ARN as ELB_LISTENER_ARN_PARAMETER,
    ELB_RESTORE_PERCENT as ELB_RESTORE_PERCENT_PARAMETER,
    ELB_SHED_PERCENT as ELB_SHED_PERCENT_PARAMETER,
    MAX_ELB_SHED_PERCENT as MAX_ELB_SHED_PERCENT_PARAMETER,
    RESTORE_MESG_DELAY_SEC as RESTORE_MESG_DELAY_SEC_PARAMETER,
    SHED_MESG_DELAY_SEC as SHED_MESG_DELAY_SEC_PARAMETER,
};
use crate::template::cfn_ref;

pub const ELB_ARN: &str = "ELB_ARN";
pub const ELB_LISTENER_ARN: &str = "ELB_LISTENER_ARN";
pub const SQS_QUEUE_URL: &str = "SQS_QUEUE_URL";
pub const ELB_SHED_PERCENT: &str = "ELB_SHED_PERCENT";
pub const MAX_ELB_SHED_PERCENT: &str = "MAX_ELB_SHED_PERCENT";
pub const ELB_RESTORE_PERCENT: &str = "ELB_RESTORE_PERCENT";
pub const SHED_MESG_DELAY_SEC: &str = "SHED_MESG_DELAY_SEC";
pub const RESTORE_MESG_DELAY_SEC: &str = "RESTORE_MESG_DELAY_SEC";

/// Variables backed by a stack parameter, in declaration order.
pub const PARAMETER_VARIABLES: [(&str, ParameterSpec); 7] = [
    (ELB_ARN, ELB_ARN_PARAMETER),
    (ELB_LISTENER_ARN, ELB_LISTENER_ARN_PARAMETER),
    (ELB_SHED_PERCENT, ELB_SHED_PERCENT_PARAMETER),
    (MAX_ELB_SHED_PERCENT, MAX_ELB_SHED_PERCENT_PARAMETER),
    (ELB_RESTORE_PERCENT, ELB_RESTORE_PERCENT_PARAMETER),
    (SHED_MESG_DELAY_SEC, SHED_MESG_DELAY_SEC_PARAMETER),
    (RESTORE_MESG_DELAY_SEC, RESTORE_MESG_DELAY_SEC_PARAMETER),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("{0} must be configured")]
    Missing(&'static str),
    #[error("{name} must be an integer, got '{value}'")]
    NotAnInteger { name: &'static str, value: String },
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSettings {
    pub elb_arn: String,
    pub elb_listener_arn: String,
    pub sqs_queue_url: String,
    pub shed_percent: u32,
    pub max_shed_percent: u32,
    pub restore_percent: u32,
    pub shed_message_delay_secs: u32,
    pub restore_message_delay_secs: u32,
}

impl ControllerSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ContractError> {
        let text = |name: &'static str| -> Result<String, ContractError> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ContractError::Missing(name))
        };
        let bounded = |name: &'static str, spec: &ParameterSpec| -> Result<u32, ContractError> {
            let raw = text(name)?;
            let value: i64 = raw.parse().map_err(|_| ContractError::NotAnInteger {
                name,
                value: raw.clone(),
            })?;
            let min = spec.min_value.unwrap_or(0);
            let max = spec.max_value.unwrap_or(i64::from(u32::MAX));
            if value < min || value > max {
                return Err(ContractError::OutOfRange {
                    name,
                    value,
                    min,
                    max,
                });
            }
            u32::try_from(value).map_err(|_| ContractError::OutOfRange {
                name,
                value,
                min,
                max,
            })
        };

        Ok(Self {
            elb_arn: text(ELB_ARN)?,
            elb_listener_arn: text(ELB_LISTENER_ARN)?,
            sqs_queue_url: text(SQS_QUEUE_URL)?,
            shed_percent: bounded(ELB_SHED_PERCENT, &ELB_SHED_PERCENT_PARAMETER)?,
            max_shed_percent: bounded(MAX_ELB_SHED_PERCENT, &MAX_ELB_SHED_PERCENT_PARAMETER)?,
            restore_percent: bounded(ELB_RESTORE_PERCENT, &ELB_RESTORE_PERCENT_PARAMETER)?,
            shed_message_delay_secs: bounded(
                SHED_MESG_DELAY_SEC,
                &SHED_MESG_DELAY_SEC_PARAMETER,
            )?,
            restore_message_delay_secs: bounded(
                RESTORE_MESG_DELAY_SEC,
                &RESTORE_MESG_DELAY_SEC_PARAMETER,
            )?,
        })
    }

    pub fn from_env() -> Result<Self, ContractError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn to_environment(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (ELB_ARN, self.elb_arn.clone()),
            (ELB_LISTENER_ARN, self.elb_listener_arn.clone()),
            (SQS_QUEUE_URL, self.sqs_queue_url.clone()),
            (ELB_SHED_PERCENT, self.shed_percent.to_string()),
            (MAX_ELB_SHED_PERCENT, self.max_shed_percent.to_string()),
            (ELB_RESTORE_PERCENT, self.restore_percent.to_string()),
            (SHED_MESG_DELAY_SEC, self.shed_message_delay_secs.to_string()),
            (
                RESTORE_MESG_DELAY_SEC,
                self.restore_message_delay_secs.to_string(),
            ),
        ])
    }
}

/// `Environment.Variables` for the decision function: every variable is a
/// `Ref`, to its parameter or to the queue (whose `Ref` is the queue URL).
pub fn environment_variables(queue_logical_id: &str) -> Value {
    let mut variables = Map::new();
    for (name, spec) in PARAMETER_VARIABLES {
        variables.insert(name.to_string(), spec.reference());
    }
    variables.insert(SQS_QUEUE_URL.to_string(), cfn_ref(queue_logical_id));
    Value::Object(variables)
}
