//! Field lookup contracts and the runtime values they produce

use chrono::{DateTime, SecondsFormat, Utc};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Declared semantic type of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Text compared exactly
    Text,
    /// Text whose equality and membership checks ignore case
    TextIgnoreCase,
    Number,
    Boolean,
    Date,
    /// Type taken from each record's value, as for JSON payload paths
    Dynamic,
}

impl FieldType {
    pub fn is_text(self) -> bool {
        matches!(self, FieldType::Text | FieldType::TextIgnoreCase)
    }

    pub fn is_ordered(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Date | FieldType::Dynamic)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::TextIgnoreCase => "text (case-insensitive)",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Dynamic => "dynamic",
        };
        f.write_str(name)
    }
}

/// A value read from a record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
}

impl FieldValue {
    /// Textual form used for pattern matching, substring and set membership
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            FieldValue::Text(s) => Cow::Borrowed(s),
            FieldValue::Number(n) => Cow::Owned(format_number(*n)),
            FieldValue::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            FieldValue::Date(d) => Cow::Owned(format_date(d)),
        }
    }

    /// The declared type matching this value's own type
    pub fn natural_type(&self) -> FieldType {
        match self {
            FieldValue::Text(_) => FieldType::Text,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Date(_) => FieldType::Date,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Date(_) => "date",
        }
    }
}

/// A field value together with the type the catalog declares for it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub value: FieldValue,
    pub declared: FieldType,
}

impl ResolvedField {
    pub fn new(value: FieldValue, declared: FieldType) -> Self {
        Self { value, declared }
    }
}

/// Reads named field values from records of type `R`
///
/// Implementations must be side-effect free: the evaluator may call them any
/// number of times, from any number of threads.
pub trait FieldResolver<R: ?Sized> {
    /// Look up `field` on `record`, `None` when the record has no such field
    fn resolve(&self, record: &R, field: &str) -> Option<ResolvedField>;

    /// Flattened display text of the whole record, searched by free-text terms
    fn full_text<'r>(&self, record: &'r R) -> Cow<'r, str>;
}

/// Declared types of the fields a filter may reference
pub trait FieldCatalog {
    fn field_type(&self, field: &str) -> Option<FieldType>;
}

impl FieldCatalog for BTreeMap<String, FieldType> {
    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.get(field).copied()
    }
}

/// Human readable description of the canonical date format
pub const DATE_FORMAT: &str = "RFC 3339 (e.g. 2024-01-01T00:00:00Z)";

/// Parse a date in the canonical format shared with the serializer
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Render a date in the canonical format; `parse_date` returns the same instant
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Render a number without a trailing `.0` when it holds an integer
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_format_round_trip() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_date(&date), "2024-01-01T00:00:00Z");
        assert_eq!(parse_date(&format_date(&date)), Some(date));

        let precise = DateTime::parse_from_rfc3339("2024-03-05T10:11:12.345+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_date(&format_date(&precise)), Some(precise));
    }

    #[test]
    fn test_parse_date_rejects_other_formats() {
        assert_eq!(parse_date("2024/01/01 00:00:00"), None);
        assert_eq!(parse_date("01-01-2023"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(200.0), "200");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
    }

    #[test]
    fn test_render_values() {
        assert_eq!(FieldValue::Number(404.0).render(), "404");
        assert_eq!(FieldValue::Boolean(true).render(), "true");
        assert_eq!(FieldValue::Text("abc".into()).render(), "abc");
    }
}
