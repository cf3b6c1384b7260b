//! Write-path errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("plan {0} not found")]
    NotFound(String),

    #[error("object {0} already exists")]
    AlreadyExists(String),

    #[error("objectId mismatch in {entity}: expected {expected}, got {actual}")]
    IdentityMismatch {
        entity: &'static str,
        expected: String,
        actual: String,
    },

    #[error("If-Match header is required")]
    PreconditionRequired,

    #[error("plan has been modified, update aborted")]
    PreconditionFailed,

    #[error("validation failed on {field}: {message}")]
    ValidationFailed { field: String, message: String },

    #[error("failed to serialize {entity}: {source}")]
    SerializationFailed {
        entity: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store error: {0}")]
    StoreIo(anyhow::Error),
}

impl PlanError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PlanError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for PlanError {
    fn from(err: anyhow::Error) -> Self {
        PlanError::StoreIo(err)
    }
}
