// entry.rs - DocumentFeedEntry: one extracted document that is available.
//
// The extraction service publishes a JSON array. Two record shapes are
// accepted:
//
//   flat:      { "radicado": "1001", "filename": "a.pdf", "metadata": {...} }
//   extractor: { "filename": "a.pdf",
//                "data": { "CLASE": "...", "RADICADO N°": "1001", "N° DOC": "..." } }
//
// The extractor writes "No encontrado" when it could not read a field; that
// value is treated the same as a missing radicado. Numeric radicados and
// non-string field values are accepted and kept as text. A record that fits
// neither shape is skipped on its own; the rest of the payload still counts.

use std::collections::BTreeMap;

use nt_case::normalize_radicado;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;

/// Field name the extractor uses for the tracking number.
pub const RADICADO_FIELD: &str = "RADICADO N°";

/// A document that has become available for dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFeedEntry {
    #[serde(default)]
    pub radicado: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Opaque extractor fields, passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl DocumentFeedEntry {
    pub fn new(radicado: impl Into<String>) -> Self {
        Self {
            radicado: Some(radicado.into()),
            ..Self::default()
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Trimmed radicado; `None` when absent, blank or the not-found sentinel.
    pub fn normalized_radicado(&self) -> Option<&str> {
        self.radicado.as_deref().and_then(normalize_radicado)
    }
}

/// Parse a feed payload: a JSON array of records in either shape.
///
/// Only a payload that is not a JSON array is an error. Unusable records are
/// logged and skipped.
pub fn parse_feed(json: &str) -> Result<Vec<DocumentFeedEntry>, FeedError> {
    let records: Vec<Value> = serde_json::from_str(json)?;
    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            entry_from_record(record)
                .inspect_err(|reason| tracing::warn!("skipping feed record {}: {}", index, reason))
                .ok()
        })
        .collect())
}

fn entry_from_record(record: Value) -> Result<DocumentFeedEntry, String> {
    let mut fields = match record {
        Value::Object(fields) => fields,
        other => return Err(format!("expected an object, got {}", other)),
    };
    let filename = match fields.remove("filename") {
        Some(Value::String(name)) => Some(name),
        _ => None,
    };

    // Extractor shape.
    if let Some(data) = fields.remove("data") {
        let Value::Object(data) = data else {
            return Err("`data` is not an object".to_string());
        };
        let metadata = text_fields(data);
        let radicado = metadata.get(RADICADO_FIELD).cloned().or_else(|| {
            metadata
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("radicado"))
                .map(|(_, value)| value.clone())
        });
        return Ok(DocumentFeedEntry {
            radicado,
            filename,
            metadata,
        });
    }

    // Flat shape.
    let radicado = match fields.remove("radicado") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => return Err(format!("radicado {} is not text or a number", other)),
    };
    let metadata = match fields.remove("metadata") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => text_fields(map),
        Some(_) => return Err("`metadata` is not an object".to_string()),
    };
    Ok(DocumentFeedEntry {
        radicado,
        filename,
        metadata,
    })
}

/// Object values as text; nulls are dropped.
fn text_fields(map: serde_json::Map<String, Value>) -> BTreeMap<String, String> {
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_records() {
        let json = r#"[{"radicado": " 1001 ", "filename": "a.pdf"}, {"radicado": null}]"#;
        let entries = parse_feed(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].normalized_radicado(), Some("1001"));
        assert_eq!(entries[0].filename.as_deref(), Some("a.pdf"));
        assert_eq!(entries[1].normalized_radicado(), None);
    }

    #[test]
    fn parses_extractor_records() {
        let json = r#"[
            {"filename": "esc-1520.pdf",
             "data": {"CLASE": "RENTAS", "RADICADO N°": "2024-1001", "N° DOC": "1520"}},
            {"filename": "ilegible.pdf",
             "data": {"CLASE": "No encontrado", "RADICADO N°": "No encontrado", "N° DOC": null}}
        ]"#;
        let entries = parse_feed(json).unwrap();
        assert_eq!(entries[0].normalized_radicado(), Some("2024-1001"));
        assert_eq!(entries[0].metadata.get("CLASE").map(String::as_str), Some("RENTAS"));
        assert_eq!(entries[1].normalized_radicado(), None);
        assert!(!entries[1].metadata.contains_key("N° DOC"));
    }

    #[test]
    fn bad_records_are_skipped_without_losing_the_rest() {
        let json = r#"[
            {"radicado": "1001"},
            {"radicado": 2002},
            {"filename": "x.pdf", "metadata": {"pages": 3, "ocr": true}},
            42,
            {"radicado": ["1003"]},
            {"filename": "y.pdf", "data": "ilegible"},
            {"radicado": "1004", "metadata": "none"}
        ]"#;
        let entries = parse_feed(json).unwrap();
        let radicados: Vec<Option<&str>> =
            entries.iter().map(DocumentFeedEntry::normalized_radicado).collect();
        assert_eq!(radicados, vec![Some("1001"), Some("2002"), None]);
        assert_eq!(entries[2].metadata.get("pages").map(String::as_str), Some("3"));
        assert_eq!(entries[2].filename.as_deref(), Some("x.pdf"));
    }

    #[test]
    fn rejects_non_array_payload() {
        assert!(matches!(
            parse_feed(r#"{"radicado": "1"}"#),
            Err(FeedError::Parse(_))
        ));
    }
}
