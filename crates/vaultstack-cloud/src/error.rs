//! Cloud resource graph and reconciliation error types

use thiserror::Error;

/// Errors raised while building, planning, or applying a stack
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource already declared: {0}")]
    DuplicateResource(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource '{resource}' references undeclared resource '{target}'")]
    DanglingReference { resource: String, target: String },

    #[error("Resource '{resource}' ({kind}) is missing required property '{property}'")]
    MissingProperty {
        resource: String,
        kind: String,
        property: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Tag '{tag}' on resource '{resource}' contains secret key material")]
    SecretInTags { resource: String, tag: String },

    #[error("No image matches filter: {0}")]
    ImageNotFound(String),

    #[error("Ambiguous image match, {count} images share the latest creation date: {ids}")]
    AmbiguousImage { count: usize, ids: String },

    #[error("Output '{output}' is unresolved: {resource}.{attribute} has no value")]
    UnresolvedOutput {
        output: String,
        resource: String,
        attribute: String,
    },

    #[error("Reference {resource}.{attribute} could not be resolved")]
    UnresolvedReference { resource: String, attribute: String },

    #[error("Cannot change {field} of {kind} '{resource}' in place")]
    UpdateNotSupported {
        resource: String,
        kind: String,
        field: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Apply failed at resource '{resource}': {message}")]
    ApplyFailed { resource: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the engine may retry the failed call
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
