use schemapi_core::Action;
use serde_json::{json, Value};

use crate::traits::StoreError;

/// Errors returned by collection operations.
///
/// Every pipeline run reports at most one of these. The HTTP layer turns it
/// into the `{success: false, message}` envelope.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error("no authenticated user for {action} on {collection}")]
    IdentityMissing { collection: String, action: Action },
    #[error("missing parameter `{name}` for {action}")]
    MissingParameter { action: Action, name: &'static str },
    #[error("{collection} document {id} not found")]
    NotFound { collection: String, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("collection `{name}` is already registered")]
    DuplicateRegistration { name: String },
    #[error("{0}")]
    Rejected(String),
    #[error("{event} listeners did not finish within {timeout_ms}ms")]
    ListenerTimeout { event: String, timeout_ms: u64 },
    #[error("validation failed: {}", errors.join(", "))]
    Validation { errors: Vec<String> },
    #[error("clear is disabled in this environment")]
    ClearDisabled,
    #[error("invalid value `{value}` for `{name}`")]
    InvalidParameter { name: &'static str, value: String },
    #[error("invalid request body: {reason}")]
    InvalidBody { reason: String },
}

impl OperationError {
    /// Convenience for listeners that abort an operation.
    pub fn rejected(message: impl Into<String>) -> Self {
        OperationError::Rejected(message.into())
    }

    /// The wire error envelope.
    #[must_use]
    pub fn envelope(&self) -> Value {
        json!({ "success": false, "message": self.to_string() })
    }

    /// HTTP status used when status-code mode is enabled.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            OperationError::IdentityMissing { .. } => 401,
            OperationError::MissingParameter { .. }
            | OperationError::Validation { .. }
            | OperationError::InvalidParameter { .. }
            | OperationError::InvalidBody { .. } => 400,
            OperationError::NotFound { .. } => 404,
            OperationError::DuplicateRegistration { .. } => 409,
            OperationError::Rejected(_) | OperationError::ClearDisabled => 403,
            OperationError::ListenerTimeout { .. } => 504,
            OperationError::Store(_) => 500,
        }
    }
}
