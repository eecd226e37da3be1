use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(
        "Must specify context parameter {key}. Usage: alb-monitor <COMMAND> -c {key}=<{placeholder}>"
    )]
    MissingContext { key: String, placeholder: String },

    #[error("malformed context entry '{0}' (expected key=value)")]
    MalformedContext(String),

    #[error("context file {path} must contain a JSON object under \"context\"")]
    InvalidContextFile { path: PathBuf },

    #[error("'{0}' is not a target group ARN (no 'targetgroup' resource segment)")]
    InvalidTargetGroupArn(String),

    #[error("malformed parameter override '{0}' (expected [Stack:]key=value)")]
    MalformedParameter(String),

    #[error("parameter '{name}' {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("parameter '{0}' is not declared by any stack")]
    UnknownParameter(String),

    #[error("stack '{0}' is not part of this app")]
    UnknownStack(String),

    #[error(
        "stack name '{0}' must start with a letter and contain only letters, digits and hyphens (at most 128 characters)"
    )]
    InvalidStackName(String),

    #[error("stack name '{0}' is used twice")]
    DuplicateStackName(String),

    #[error("logical id '{0}' is already used in this template")]
    DuplicateLogicalId(String),

    #[error("cannot find asset at {}", .0.display())]
    AssetNotFound(PathBuf),

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SynthError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
