// case.rs - Case: one notarial filing tracked from intake to dispatch.
//
// A case is opened Pending with a tracking number (radicado). Its radicado
// history is append-only: adding a new one makes it the active value used
// for document matching and uniqueness checks, while older values stay
// queryable. A successful dispatch moves the case to Finished; an explicit
// administrative return moves it back to Pending with every field intact.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CaseError;

/// Sentinel the document extractor writes when a field could not be read.
pub const NOT_FOUND_SENTINEL: &str = "No encontrado";

/// The lifecycle state of a case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CaseState {
    /// Open: waiting for its document and for dispatch.
    Pending,

    /// Dispatched and archived.
    Finished,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseState::Pending => write!(f, "pending"),
            CaseState::Finished => write!(f, "finished"),
        }
    }
}

impl CaseState {
    /// Pending → Finished (dispatch success) and Finished → Pending (return)
    /// are the only edges.
    pub fn can_transition_to(&self, next: CaseState) -> bool {
        matches!(
            (self, next),
            (CaseState::Pending, CaseState::Finished) | (CaseState::Finished, CaseState::Pending)
        )
    }
}

/// One tracking number attached to a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Radicado {
    pub value: String,
    pub added_at: DateTime<Utc>,
}

/// Audit fields written when a dispatch succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRecord {
    /// Address the notification went to.
    pub correo_enviado_a: String,

    /// When the notification was accepted by the channel.
    pub hora_envio: DateTime<Utc>,

    /// Operator (or service account) that triggered the dispatch.
    pub enviado_por: String,
}

impl DispatchRecord {
    pub fn new(correo_enviado_a: impl Into<String>, enviado_por: impl Into<String>) -> Self {
        Self {
            correo_enviado_a: correo_enviado_a.into(),
            hora_envio: Utc::now(),
            enviado_por: enviado_por.into(),
        }
    }
}

/// A case record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
    pub case_id: Uuid,

    /// Intake date.
    pub fecha: NaiveDate,

    /// Deed number as entered (always parses as an unsigned integer).
    pub escritura: String,

    /// Date the underlying legal document was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_documento: Option<NaiveDate>,

    /// Assigned handler, referenced by name.
    pub protocolista: String,

    #[serde(default)]
    pub observaciones: String,

    pub state: CaseState,

    /// Number of successful dispatches. Survives a return to Pending.
    #[serde(default)]
    pub envios: u32,

    /// Append-only tracking-number history; the last entry is active.
    pub radicados: Vec<Radicado>,

    /// Audit record of the most recent successful dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dispatch: Option<DispatchRecord>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the operator when opening a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewCase {
    pub fecha: NaiveDate,
    pub escritura: String,
    #[serde(default)]
    pub fecha_documento: Option<NaiveDate>,
    pub radicado: String,
    pub protocolista: String,
    #[serde(default)]
    pub observaciones: String,
}

/// Uniqueness key for invariant 2: deed number plus document date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct DocumentKey {
    pub escritura: u64,
    pub fecha_documento: NaiveDate,
}

impl Case {
    /// Open a new Pending case with one initial radicado.
    pub fn new(fields: NewCase) -> Result<Self, CaseError> {
        parse_escritura(&fields.escritura)?;
        let radicado = required_radicado(&fields.radicado)?;
        let protocolista = required_text("protocolista", &fields.protocolista)?;

        let now = Utc::now();
        Ok(Self {
            case_id: Uuid::new_v4(),
            fecha: fields.fecha,
            escritura: fields.escritura.trim().to_string(),
            fecha_documento: fields.fecha_documento,
            protocolista,
            observaciones: fields.observaciones,
            state: CaseState::Pending,
            envios: 0,
            radicados: vec![Radicado {
                value: radicado,
                added_at: now,
            }],
            last_dispatch: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// The active radicado, trimmed. `None` only for a record with no history.
    pub fn active_radicado(&self) -> Option<&str> {
        self.radicados
            .last()
            .and_then(|r| normalize_radicado(&r.value))
    }

    /// Whether `value` appears anywhere in the radicado history.
    pub fn has_radicado(&self, value: &str) -> bool {
        match normalize_radicado(value) {
            Some(needle) => self
                .radicados
                .iter()
                .any(|r| normalize_radicado(&r.value) == Some(needle)),
            None => false,
        }
    }

    /// Append a radicado, making it the active one.
    ///
    /// Returns `false` without touching the history when `value` is already
    /// the active radicado.
    pub fn push_radicado(&mut self, value: &str) -> Result<bool, CaseError> {
        let value = required_radicado(value)?;
        if self.active_radicado() == Some(value.as_str()) {
            return Ok(false);
        }
        let now = Utc::now();
        self.radicados.push(Radicado {
            value,
            added_at: now,
        });
        self.updated_at = now;
        Ok(true)
    }

    /// Move to a new state. Returns an error if the edge does not exist.
    pub fn transition(&mut self, next: CaseState) -> Result<(), CaseError> {
        if !self.state.can_transition_to(next) {
            return Err(CaseError::Conflict {
                case_id: self.case_id,
                state: self.state.to_string(),
                operation: match next {
                    CaseState::Pending => "return",
                    CaseState::Finished => "finish",
                },
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.state == CaseState::Pending
    }

    pub(crate) fn document_key(&self) -> Option<DocumentKey> {
        let escritura = parse_escritura(&self.escritura).ok()?;
        self.fecha_documento.map(|fecha_documento| DocumentKey {
            escritura,
            fecha_documento,
        })
    }

    pub(crate) fn ensure_pending(&self, operation: &'static str) -> Result<(), CaseError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(CaseError::Conflict {
                case_id: self.case_id,
                state: self.state.to_string(),
                operation,
            })
        }
    }
}

/// A partial edit. `None` fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaseUpdate {
    #[serde(default)]
    pub fecha: Option<NaiveDate>,
    #[serde(default)]
    pub escritura: Option<String>,
    /// `Some(None)` clears the document date.
    #[serde(default)]
    pub fecha_documento: Option<Option<NaiveDate>>,
    /// A value different from the active radicado is appended to the history.
    #[serde(default)]
    pub radicado: Option<String>,
    #[serde(default)]
    pub protocolista: Option<String>,
    #[serde(default)]
    pub observaciones: Option<String>,
}

impl CaseUpdate {
    pub fn is_empty(&self) -> bool {
        self == &CaseUpdate::default()
    }

    /// Apply the fields whose value actually differs; return their names.
    ///
    /// Validation runs before anything is written, so an error leaves
    /// `case` untouched.
    pub fn apply(&self, case: &mut Case) -> Result<Vec<&'static str>, CaseError> {
        if let Some(escritura) = &self.escritura {
            parse_escritura(escritura)?;
        }
        if let Some(protocolista) = &self.protocolista {
            required_text("protocolista", protocolista)?;
        }
        if let Some(radicado) = &self.radicado {
            required_radicado(radicado)?;
        }

        let mut changed = Vec::new();

        if let Some(fecha) = self.fecha {
            if fecha != case.fecha {
                case.fecha = fecha;
                changed.push("fecha");
            }
        }
        if let Some(escritura) = &self.escritura {
            let escritura = escritura.trim();
            if escritura != case.escritura {
                case.escritura = escritura.to_string();
                changed.push("escritura");
            }
        }
        if let Some(fecha_documento) = self.fecha_documento {
            if fecha_documento != case.fecha_documento {
                case.fecha_documento = fecha_documento;
                changed.push("fecha_documento");
            }
        }
        if let Some(protocolista) = &self.protocolista {
            let protocolista = protocolista.trim();
            if protocolista != case.protocolista {
                case.protocolista = protocolista.to_string();
                changed.push("protocolista");
            }
        }
        if let Some(observaciones) = &self.observaciones {
            if observaciones != &case.observaciones {
                case.observaciones = observaciones.clone();
                changed.push("observaciones");
            }
        }
        if let Some(radicado) = &self.radicado {
            if case.push_radicado(radicado)? {
                changed.push("radicado");
            }
        }

        if !changed.is_empty() {
            case.updated_at = Utc::now();
        }
        Ok(changed)
    }
}

/// Read projection of a Finished case together with its dispatch audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinishedCase {
    #[serde(flatten)]
    pub case: Case,
    pub correo_enviado_a: String,
    pub hora_envio: DateTime<Utc>,
    pub enviado_por: String,
}

impl TryFrom<Case> for FinishedCase {
    type Error = CaseError;

    fn try_from(case: Case) -> Result<Self, Self::Error> {
        if case.state != CaseState::Finished {
            return Err(CaseError::Conflict {
                case_id: case.case_id,
                state: case.state.to_string(),
                operation: "project as finished",
            });
        }
        let record = case
            .last_dispatch
            .clone()
            .ok_or_else(|| CaseError::Conflict {
                case_id: case.case_id,
                state: "finished without a dispatch record".to_string(),
                operation: "project as finished",
            })?;
        Ok(Self {
            case,
            correo_enviado_a: record.correo_enviado_a,
            hora_envio: record.hora_envio,
            enviado_por: record.enviado_por,
        })
    }
}

/// Trim a radicado; empty values and the extractor's sentinel are absent.
pub fn normalize_radicado(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NOT_FOUND_SENTINEL {
        None
    } else {
        Some(trimmed)
    }
}

/// Parse a deed number. Leading zeros are not significant.
pub fn parse_escritura(raw: &str) -> Result<u64, CaseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CaseError::validation("escritura", "is required"));
    }
    let not_a_number =
        || CaseError::validation("escritura", format!("'{}' is not a number", trimmed));
    // `u64::from_str` also takes a leading `+`.
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(not_a_number());
    }
    trimmed.parse::<u64>().map_err(|_| not_a_number())
}

fn required_radicado(raw: &str) -> Result<String, CaseError> {
    normalize_radicado(raw)
        .map(str::to_string)
        .ok_or_else(|| CaseError::validation("radicado", "is required"))
}

fn required_text(field: &'static str, raw: &str) -> Result<String, CaseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(CaseError::validation(field, "is required"))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_case(radicado: &str) -> NewCase {
        NewCase {
            fecha: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            escritura: "1520".to_string(),
            fecha_documento: NaiveDate::from_ymd_opt(2024, 2, 28),
            radicado: radicado.to_string(),
            protocolista: "Ana Restrepo".to_string(),
            observaciones: String::new(),
        }
    }

    #[test]
    fn new_case_starts_pending_with_one_radicado() {
        let case = Case::new(new_case(" 1001 ")).unwrap();
        assert_eq!(case.state, CaseState::Pending);
        assert_eq!(case.envios, 0);
        assert_eq!(case.radicados.len(), 1);
        assert_eq!(case.active_radicado(), Some("1001"));
        assert!(case.last_dispatch.is_none());
    }

    #[test]
    fn signed_escritura_is_rejected() {
        for raw in ["+42", "-42", "4 2"] {
            assert!(parse_escritura(raw).is_err(), "accepted {:?}", raw);
        }
        assert_eq!(parse_escritura(" 042 ").unwrap(), 42);
    }

    #[test]
    fn non_numeric_escritura_is_rejected() {
        let mut fields = new_case("1001");
        fields.escritura = "15A".to_string();
        let err = Case::new(fields).unwrap_err();
        assert!(matches!(
            err,
            CaseError::Validation {
                field: "escritura",
                ..
            }
        ));
    }

    #[test]
    fn missing_radicado_or_protocolista_is_rejected() {
        assert!(matches!(
            Case::new(new_case("   ")),
            Err(CaseError::Validation {
                field: "radicado",
                ..
            })
        ));

        let mut fields = new_case("1001");
        fields.protocolista = " ".to_string();
        assert!(matches!(
            Case::new(fields),
            Err(CaseError::Validation {
                field: "protocolista",
                ..
            })
        ));
    }

    #[test]
    fn push_radicado_appends_and_activates() {
        let mut case = Case::new(new_case("1001")).unwrap();
        assert!(case.push_radicado("2002").unwrap());
        assert_eq!(case.radicados.len(), 2);
        assert_eq!(case.active_radicado(), Some("2002"));
        assert!(case.has_radicado("1001"));

        // Re-adding the active value is a no-op.
        assert!(!case.push_radicado(" 2002").unwrap());
        assert_eq!(case.radicados.len(), 2);
    }

    #[test]
    fn only_pending_finished_edges_exist() {
        let mut case = Case::new(new_case("1001")).unwrap();
        assert!(matches!(
            case.transition(CaseState::Pending),
            Err(CaseError::Conflict { .. })
        ));
        case.transition(CaseState::Finished).unwrap();
        assert!(matches!(
            case.transition(CaseState::Finished),
            Err(CaseError::Conflict { .. })
        ));
        case.transition(CaseState::Pending).unwrap();
        assert!(case.is_pending());
    }

    #[test]
    fn update_reports_only_changed_fields() {
        let mut case = Case::new(new_case("1001")).unwrap();
        let update = CaseUpdate {
            escritura: Some("1520".to_string()),
            observaciones: Some("falta firma".to_string()),
            radicado: Some("1001".to_string()),
            ..CaseUpdate::default()
        };
        let changed = update.apply(&mut case).unwrap();
        assert_eq!(changed, vec!["observaciones"]);
        assert_eq!(case.radicados.len(), 1);
    }

    #[test]
    fn invalid_update_leaves_case_untouched() {
        let mut case = Case::new(new_case("1001")).unwrap();
        let before = case.clone();
        let update = CaseUpdate {
            observaciones: Some("nota".to_string()),
            escritura: Some("abc".to_string()),
            ..CaseUpdate::default()
        };
        assert!(update.apply(&mut case).is_err());
        assert_eq!(case, before);
    }

    #[test]
    fn document_key_ignores_leading_zeros_and_needs_a_date() {
        let a = Case::new(new_case("1")).unwrap();
        let mut fields = new_case("2");
        fields.escritura = "001520".to_string();
        let b = Case::new(fields).unwrap();
        assert_eq!(a.document_key(), b.document_key());

        let mut fields = new_case("3");
        fields.fecha_documento = None;
        assert!(Case::new(fields).unwrap().document_key().is_none());
    }

    #[test]
    fn normalize_radicado_treats_sentinel_as_absent() {
        assert_eq!(normalize_radicado("  77 "), Some("77"));
        assert_eq!(normalize_radicado(""), None);
        assert_eq!(normalize_radicado(NOT_FOUND_SENTINEL), None);
    }

    #[test]
    fn finished_projection_requires_dispatch_record() {
        let mut case = Case::new(new_case("1001")).unwrap();
        assert!(FinishedCase::try_from(case.clone()).is_err());

        case.transition(CaseState::Finished).unwrap();
        case.last_dispatch = Some(DispatchRecord::new("ana@notaria.co", "recepcion"));
        let finished = FinishedCase::try_from(case).unwrap();
        assert_eq!(finished.correo_enviado_a, "ana@notaria.co");

        let json = serde_json::to_string(&finished).unwrap();
        assert!(json.contains("\"state\":\"finished\""));
        assert!(json.contains("\"enviado_por\":\"recepcion\""));
    }
}
