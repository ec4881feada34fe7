//! Field catalog and resolver for log entries

use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;

use crate::filter::{FieldCatalog, FieldResolver, FieldType, FieldValue, ResolvedField};
use crate::parser::LogEntry;

/// Prefix for paths into an entry's JSON payload, e.g. `payload.retry.count`
pub const PAYLOAD_PREFIX: &str = "payload.";

/// Fields every log entry has, with their base types
pub const LOG_FIELDS: [(&str, FieldType); 7] = [
    ("component", FieldType::Text),
    ("component_id", FieldType::Text),
    ("timestamp", FieldType::Date),
    ("level", FieldType::Text),
    ("message", FieldType::Text),
    ("line", FieldType::Number),
    ("has_payload", FieldType::Boolean),
];

/// Exposes `LogEntry` fields to filters
///
/// Text fields named in `case_insensitive` compare without regard to case.
#[derive(Debug, Clone, Default)]
pub struct LogFields {
    case_insensitive: BTreeSet<String>,
}

impl LogFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_insensitive<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            case_insensitive: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn declared(&self, name: &str, base: FieldType) -> FieldType {
        if base == FieldType::Text && self.case_insensitive.contains(name) {
            FieldType::TextIgnoreCase
        } else {
            base
        }
    }

    /// All fixed fields with their effective types
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldType)> + '_ {
        LOG_FIELDS
            .iter()
            .map(|&(name, base)| (name, self.declared(name, base)))
    }
}

impl FieldCatalog for LogFields {
    fn field_type(&self, field: &str) -> Option<FieldType> {
        if let Some(&(name, base)) = LOG_FIELDS.iter().find(|(name, _)| *name == field) {
            return Some(self.declared(name, base));
        }
        match field.strip_prefix(PAYLOAD_PREFIX) {
            Some(path) if !path.is_empty() => Some(FieldType::Dynamic),
            _ => None,
        }
    }
}

impl FieldResolver<LogEntry> for LogFields {
    fn resolve(&self, entry: &LogEntry, field: &str) -> Option<ResolvedField> {
        let value = match field {
            "component" => FieldValue::Text(entry.component.clone()),
            "component_id" => FieldValue::Text(entry.component_id.clone()),
            "timestamp" => FieldValue::Date(entry.timestamp),
            "level" => FieldValue::Text(entry.level.clone()),
            "message" => FieldValue::Text(entry.message.clone()),
            "line" => FieldValue::Number(entry.source_line_number as f64),
            "has_payload" => FieldValue::Boolean(entry.has_payload()),
            _ => {
                let path = field.strip_prefix(PAYLOAD_PREFIX)?;
                let value = json_value(entry.payload_value(path)?)?;
                let declared = value.natural_type();
                return Some(ResolvedField::new(value, declared));
            }
        };
        let declared = self.field_type(field)?;
        Some(ResolvedField::new(value, declared))
    }

    fn full_text<'r>(&self, entry: &'r LogEntry) -> Cow<'r, str> {
        Cow::Borrowed(&entry.raw_logline)
    }
}

/// Scalar JSON values become field values; objects and arrays render as JSON text
fn json_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        other => Some(FieldValue::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn entry() -> LogEntry {
        LogEntry {
            component: "socket".to_string(),
            component_id: "s-1".to_string(),
            timestamp: Utc::now(),
            level: "WARN".to_string(),
            message: "retrying".to_string(),
            raw_logline: "socket (s-1) | now [WARN] retrying".to_string(),
            payload: Some(json!({"retry": 3, "ok": false, "name": "x", "gone": null})),
            source_line_number: 12,
        }
    }

    #[test]
    fn test_case_insensitive_fields_are_declared() {
        let fields = LogFields::with_case_insensitive(["level"]);
        assert_eq!(fields.field_type("level"), Some(FieldType::TextIgnoreCase));
        assert_eq!(fields.field_type("message"), Some(FieldType::Text));
        assert_eq!(LogFields::new().field_type("level"), Some(FieldType::Text));
    }

    #[test]
    fn test_payload_paths_are_dynamic() {
        let fields = LogFields::new();
        assert_eq!(fields.field_type("payload.retry"), Some(FieldType::Dynamic));
        assert_eq!(fields.field_type("payload."), None);
        assert_eq!(fields.field_type("unknown"), None);
    }

    #[test]
    fn test_resolve_fixed_fields() {
        let fields = LogFields::new();
        let log = entry();
        assert_eq!(
            fields.resolve(&log, "line"),
            Some(ResolvedField::new(FieldValue::Number(12.0), FieldType::Number))
        );
        assert_eq!(
            fields.resolve(&log, "has_payload"),
            Some(ResolvedField::new(FieldValue::Boolean(true), FieldType::Boolean))
        );
    }

    #[test]
    fn test_resolve_payload_by_json_type() {
        let fields = LogFields::new();
        let log = entry();
        assert_eq!(
            fields.resolve(&log, "payload.retry"),
            Some(ResolvedField::new(FieldValue::Number(3.0), FieldType::Number))
        );
        assert_eq!(
            fields.resolve(&log, "payload.ok"),
            Some(ResolvedField::new(FieldValue::Boolean(false), FieldType::Boolean))
        );
        assert_eq!(fields.resolve(&log, "payload.gone"), None);
        assert_eq!(fields.resolve(&log, "payload.missing"), None);
    }
}
