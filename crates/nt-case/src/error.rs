// error.rs - Error types for case records and the case store.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while creating, editing or moving cases.
///
/// Every variant is recoverable: callers report it to the operator and the
/// store is left exactly as it was before the failed call.
#[derive(Debug, Error)]
pub enum CaseError {
    /// Malformed input, rejected before the store is touched.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Another pending case already holds this radicado as its active one.
    #[error("radicado {radicado} is already active on pending case {conflicting_case} (protocolista: {protocolista})")]
    DuplicateRadicado {
        radicado: String,
        conflicting_case: Uuid,
        protocolista: String,
    },

    /// Another pending case already covers this deed and document date.
    #[error("escritura {escritura} dated {fecha_documento} is already pending as case {conflicting_case} (protocolista: {protocolista})")]
    DuplicateDocument {
        escritura: String,
        fecha_documento: String,
        conflicting_case: Uuid,
        protocolista: String,
    },

    /// The requested case does not exist (in the state the operation needs).
    #[error("case not found: {0}")]
    NotFound(Uuid),

    /// The operation is not valid for the case's current state.
    #[error("cannot {operation} case {case_id}: it is {state}")]
    Conflict {
        case_id: Uuid,
        state: String,
        operation: &'static str,
    },

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize a stored record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl CaseError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CaseError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// True for the two uniqueness violations.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            CaseError::DuplicateRadicado { .. } | CaseError::DuplicateDocument { .. }
        )
    }
}
