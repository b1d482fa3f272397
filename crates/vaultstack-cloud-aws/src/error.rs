//! AWS driver error types

use thiserror::Error;
use vaultstack_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    CliNotFound,

    #[error("aws CLI authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("aws {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("aws {command} failed transiently: {stderr}")]
    Transient { command: String, stderr: String },

    #[error("Unexpected aws CLI output: {0}")]
    UnexpectedOutput(String),

    #[error("Missing property '{property}' for {kind}")]
    MissingProperty { kind: String, property: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Transient { .. } => CloudError::Transient(err.to_string()),
            AwsError::CliNotFound | AwsError::AuthenticationFailed(_) => {
                CloudError::AuthenticationFailed(err.to_string())
            }
            AwsError::CloudError(inner) => inner,
            other => CloudError::Provider(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
