use std::path::PathBuf;
use thiserror::Error;
use vaultstack_cloud::CloudError;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("File read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nReason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(
        "Stack file not found\nHint: create stack.kdl in the current directory or pass --config"
    )]
    ConfigNotFound,

    #[error("{role} key file not found: {path}")]
    KeyFileMissing { role: &'static str, path: PathBuf },

    #[error("{role} key file could not be read: {path}\nReason: {message}")]
    KeyFileUnreadable {
        role: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("{role} key file already exists: {path}\nHint: pass --force to overwrite")]
    KeyFileExists { role: &'static str, path: PathBuf },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Key pair check failed: {0}")]
    KeyPairMismatch(String),

    #[error("Invalid PEM: {0}")]
    InvalidPem(String),

    #[error("Template error: {template}\nReason: {message}")]
    TemplateError { template: String, message: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, StackError>;
