// event.rs - Case change events.
//
// Observers get enough to decide whether to refetch: the case id, its active
// radicado and what kind of change happened. Events are not a source of
// state; a viewer that connects late pulls a full listing instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A change to a case record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CaseEvent {
    /// A case was opened.
    CaseCreated {
        case_id: Uuid,
        radicado: String,
        timestamp: DateTime<Utc>,
    },

    /// Fields of a Pending case changed (including a new radicado).
    CaseUpdated {
        case_id: Uuid,
        radicado: String,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A case moved between Pending and Finished.
    CaseMoved {
        case_id: Uuid,
        radicado: String,
        from_state: String,
        to_state: String,
        envios: u32,
        timestamp: DateTime<Utc>,
    },

    /// A case was deleted.
    CaseDeleted {
        case_id: Uuid,
        radicado: String,
        timestamp: DateTime<Utc>,
    },
}

impl CaseEvent {
    /// The event type name as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            CaseEvent::CaseCreated { .. } => "case_created",
            CaseEvent::CaseUpdated { .. } => "case_updated",
            CaseEvent::CaseMoved { .. } => "case_moved",
            CaseEvent::CaseDeleted { .. } => "case_deleted",
        }
    }

    pub fn case_id(&self) -> Uuid {
        match self {
            CaseEvent::CaseCreated { case_id, .. }
            | CaseEvent::CaseUpdated { case_id, .. }
            | CaseEvent::CaseMoved { case_id, .. }
            | CaseEvent::CaseDeleted { case_id, .. } => *case_id,
        }
    }

    pub fn radicado(&self) -> &str {
        match self {
            CaseEvent::CaseCreated { radicado, .. }
            | CaseEvent::CaseUpdated { radicado, .. }
            | CaseEvent::CaseMoved { radicado, .. }
            | CaseEvent::CaseDeleted { radicado, .. } => radicado,
        }
    }

    pub fn created(case_id: Uuid, radicado: &str) -> Self {
        CaseEvent::CaseCreated {
            case_id,
            radicado: radicado.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn updated(case_id: Uuid, radicado: &str, fields: &[&str]) -> Self {
        CaseEvent::CaseUpdated {
            case_id,
            radicado: radicado.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    pub fn moved(
        case_id: Uuid,
        radicado: &str,
        from: impl ToString,
        to: impl ToString,
        envios: u32,
    ) -> Self {
        CaseEvent::CaseMoved {
            case_id,
            radicado: radicado.to_string(),
            from_state: from.to_string(),
            to_state: to.to_string(),
            envios,
            timestamp: Utc::now(),
        }
    }

    pub fn deleted(case_id: Uuid, radicado: &str) -> Self {
        CaseEvent::CaseDeleted {
            case_id,
            radicado: radicado.to_string(),
            timestamp: Utc::now(),
        }
    }
}
