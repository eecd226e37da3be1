//! Deployment parameters declared by the two stacks.
//!
//! Each stack declares its parameters from the constant tables below; the same
//! table drives validation of deploy-time overrides so the bounds live in one
//! place.

use serde_json::Value;

use crate::error::SynthError;
use crate::template::{cfn_ref, TemplateParameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Number,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDefault {
    Text(&'static str),
    Number(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterSpec {
    pub id: &'static str,
    pub kind: ParameterType,
    pub description: &'static str,
    pub default: Option<ParameterDefault>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    /// Whole numbers only; the handlers parse these as integers.
    pub integer: bool,
}

pub const ELB_ARN: ParameterSpec = ParameterSpec {
    id: "elbArn",
    kind: ParameterType::String,
    description: "ARN for ELB",
    default: None,
    min_value: None,
    max_value: None,
    integer: false,
};

pub const ELB_LISTENER_ARN: ParameterSpec = ParameterSpec {
    id: "elbListenerArn",
    kind: ParameterType::String,
    description: "ARN for ELB listener",
    default: None,
    min_value: None,
    max_value: None,
    integer: false,
};

pub const ELB_SHED_PERCENT: ParameterSpec = ParameterSpec {
    id: "elbShedPercent",
    kind: ParameterType::Number,
    description: "Percentage to shed expressed as an integer",
    default: Some(ParameterDefault::Number(5)),
    min_value: Some(0),
    max_value: Some(100),
    integer: true,
};

pub const MAX_ELB_SHED_PERCENT: ParameterSpec = ParameterSpec {
    id: "maxElbShedPercent",
    kind: ParameterType::Number,
    description: "Maximum allowable load to shed from ELB",
    default: Some(ParameterDefault::Number(100)),
    min_value: Some(0),
    max_value: Some(100),
    integer: true,
};

pub const ELB_RESTORE_PERCENT: ParameterSpec = ParameterSpec {
    id: "elbRestorePercent",
    kind: ParameterType::Number,
    description: "Percentage to restore expressed as an integer",
    default: Some(ParameterDefault::Number(5)),
    min_value: Some(0),
    max_value: Some(100),
    integer: true,
};

pub const SHED_MESG_DELAY_SEC: ParameterSpec = ParameterSpec {
    id: "shedMesgDelaySec",
    kind: ParameterType::Number,
    description: "Number of seconds to delay shed messages",
    default: Some(ParameterDefault::Number(60)),
    min_value: Some(60),
    max_value: Some(300),
    integer: true,
};

pub const RESTORE_MESG_DELAY_SEC: ParameterSpec = ParameterSpec {
    id: "restoreMesgDelaySec",
    kind: ParameterType::Number,
    description: "Number of seconds to delay restore messages",
    default: Some(ParameterDefault::Number(120)),
    min_value: Some(60),
    max_value: Some(300),
    integer: true,
};

pub const CW_ALARM_NAMESPACE: ParameterSpec = ParameterSpec {
    id: "cwAlarmNamespace",
    kind: ParameterType::String,
    description: "Namespace for alarm metric",
    default: Some(ParameterDefault::Text("AWS/ApplicationELB")),
    min_value: None,
    max_value: None,
    integer: false,
};

pub const CW_ALARM_METRIC_NAME: ParameterSpec = ParameterSpec {
    id: "cwAlarmMetricName",
    kind: ParameterType::String,
    description: "Metric to use for alarm",
    default: Some(ParameterDefault::Text("RequestCountPerTarget")),
    min_value: None,
    max_value: None,
    integer: false,
};

pub const CW_ALARM_THRESHOLD: ParameterSpec = ParameterSpec {
    id: "cwAlarmThreshold",
    kind: ParameterType::Number,
    description: "Threshold for alarm",
    default: Some(ParameterDefault::Number(500)),
    min_value: None,
    max_value: None,
    integer: false,
};

pub const CW_ALARM_PERIODS: ParameterSpec = ParameterSpec {
    id: "cwAlarmPeriods",
    kind: ParameterType::Number,
    description: "Num of periods for alarm",
    default: Some(ParameterDefault::Number(3)),
    min_value: None,
    max_value: None,
    integer: false,
};

pub const MONITOR_PARAMETERS: [ParameterSpec; 7] = [
    ELB_ARN,
    ELB_LISTENER_ARN,
    ELB_SHED_PERCENT,
    MAX_ELB_SHED_PERCENT,
    ELB_RESTORE_PERCENT,
    SHED_MESG_DELAY_SEC,
    RESTORE_MESG_DELAY_SEC,
];

pub const CLOUDWATCH_PARAMETERS: [ParameterSpec; 4] = [
    CW_ALARM_NAMESPACE,
    CW_ALARM_METRIC_NAME,
    CW_ALARM_THRESHOLD,
    CW_ALARM_PERIODS,
];

impl ParameterSpec {
    pub fn to_template(&self) -> TemplateParameter {
        TemplateParameter {
            parameter_type: self.kind.as_str().to_string(),
            description: Some(self.description.to_string()),
            default: self.default.map(|value| match value {
                ParameterDefault::Text(text) => Value::from(text),
                ParameterDefault::Number(number) => Value::from(number),
            }),
            min_value: self.min_value,
            max_value: self.max_value,
        }
    }

    /// `{"Ref": id}`; CloudFormation resolves it to the deployed value.
    pub fn reference(&self) -> Value {
        cfn_ref(self.id)
    }

    /// Checks a deploy-time value the way CloudFormation would and returns it
    /// trimmed.
    pub fn validate(&self, raw: &str) -> Result<String, SynthError> {
        let value = raw.trim();
        match self.kind {
            ParameterType::String => {
                if value.is_empty() {
                    return Err(self.invalid("cannot be empty"));
                }
            }
            ParameterType::Number => {
                let number: f64 = value
                    .parse()
                    .map_err(|_| self.invalid(format!("must be a number, got '{value}'")))?;
                if !number.is_finite() {
                    return Err(self.invalid(format!("must be a finite number, got '{value}'")));
                }
                if self.integer && value.parse::<i64>().is_err() {
                    return Err(self.invalid(format!("must be an integer, got '{value}'")));
                }
                if let Some(min) = self.min_value {
                    if number < min as f64 {
                        return Err(self.invalid(format!("must be at least {min}, got {value}")));
                    }
                }
                if let Some(max) = self.max_value {
                    if number > max as f64 {
                        return Err(self.invalid(format!("must be at most {max}, got {value}")));
                    }
                }
            }
        }
        Ok(value.to_string())
    }

    fn invalid(&self, reason: impl Into<String>) -> SynthError {
        SynthError::InvalidParameter {
            name: self.id.to_string(),
            reason: reason.into(),
        }
    }
}

pub fn find_spec<'a>(specs: &'a [ParameterSpec], id: &str) -> Option<&'a ParameterSpec> {
    specs.iter().find(|spec| spec.id == id)
}

/// A `[Stack:]key=value` override supplied at synth time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterOverride {
    pub stack: Option<String>,
    pub key: String,
    pub value: String,
}

impl ParameterOverride {
    pub fn parse(raw: &str) -> Result<Self, SynthError> {
        let malformed = || SynthError::MalformedParameter(raw.to_string());
        let (target, value) = raw.split_once('=').ok_or_else(malformed)?;
        let (stack, key) = match target.split_once(':') {
            Some((stack, key)) => (Some(stack.trim().to_string()), key.trim()),
            None => (None, target.trim()),
        };
        if key.is_empty() || stack.as_deref() == Some("") {
            return Err(malformed());
        }
        Ok(Self {
            stack,
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn applies_to(&self, stack_name: &str) -> bool {
        self.stack
            .as_deref()
            .map(|stack| stack == stack_name)
            .unwrap_or(true)
    }
}
