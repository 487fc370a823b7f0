// error.rs - Error types for dispatch and configuration.

use nt_case::CaseError;
use thiserror::Error;
use uuid::Uuid;

/// Why a notification channel could not deliver.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The request could not be turned into a message (bad address, etc.).
    #[error("invalid notification: {0}")]
    Invalid(String),

    /// The channel accepted the connection but refused or failed the send.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The webhook answered with a non-success status.
    #[error("webhook {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Outcome of a failed dispatch. The case is never moved when one of these
/// is returned.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Store-level refusal: not found, wrong state, invalid input.
    #[error(transparent)]
    Case(#[from] CaseError),

    /// The case's protocolist no longer resolves to an address.
    #[error("case {case_id} has no recipient: protocolista '{protocolista}' is not registered")]
    NoRecipient { case_id: Uuid, protocolista: String },

    /// The case has no active radicado to notify about.
    #[error("case {case_id} has no active radicado")]
    NoRadicado { case_id: Uuid },

    /// The notification channel reported a failure.
    #[error("notification for case {case_id} (radicado {radicado}) failed: {source}")]
    Notification {
        case_id: Uuid,
        radicado: String,
        source: NotifyError,
    },

    /// The notification channel did not answer in time.
    #[error("notification for case {case_id} (radicado {radicado}) timed out after {seconds}s")]
    Timeout {
        case_id: Uuid,
        radicado: String,
        seconds: u64,
    },

    /// The dispatch task itself died (panic or runtime shutdown).
    #[error("dispatch task for case {case_id} aborted: {reason}")]
    Aborted { case_id: Uuid, reason: String },
}

impl DispatchError {
    /// Whether trying the same dispatch again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Notification { .. }
                | DispatchError::Timeout { .. }
                | DispatchError::Aborted { .. }
        )
    }

    /// The case this error is about, when known.
    pub fn case_id(&self) -> Option<Uuid> {
        match self {
            DispatchError::Case(CaseError::NotFound(id)) => Some(*id),
            DispatchError::Case(CaseError::Conflict { case_id, .. }) => Some(*case_id),
            DispatchError::Case(_) => None,
            DispatchError::NoRecipient { case_id, .. }
            | DispatchError::NoRadicado { case_id }
            | DispatchError::Notification { case_id, .. }
            | DispatchError::Timeout { case_id, .. }
            | DispatchError::Aborted { case_id, .. } => Some(*case_id),
        }
    }
}

/// Errors loading `notaria.toml` or building what it describes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    /// A value is present but unusable.
    #[error("invalid [{section}] setting: {reason}")]
    Invalid {
        section: &'static str,
        reason: String,
    },
}
