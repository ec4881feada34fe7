//! Comparison operator semantics
//!
//! The declared type of the field operand drives coercion. Patterns and sets
//! apply to the rendered text of any field; everything else must line up with
//! the declared type or the comparison is a type mismatch.

use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::cmp::Ordering;

use super::ast::{Literal, Pattern};
use super::error::EvalError;
use super::operator::ComparisonOperator;
use super::resolver::{
    DATE_FORMAT, FieldType, FieldValue, ResolvedField, format_date, parse_date,
};

/// An operand after field and rule lookups
#[derive(Debug)]
pub(crate) enum Resolved<'a> {
    Field { name: &'a str, field: ResolvedField },
    Literal(&'a Literal),
}

/// The non-field side of a comparison, borrowed where possible
#[derive(Debug)]
enum Other<'a> {
    Text(Cow<'a, str>),
    Number(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Pattern(&'a Pattern),
    Set(&'a [String]),
}

impl<'a> Other<'a> {
    fn from_literal(literal: &'a Literal) -> Self {
        match literal {
            Literal::Text(s) => Other::Text(Cow::Borrowed(s)),
            Literal::Pattern(p) => Other::Pattern(p),
            Literal::Date(d) => Other::Date(*d),
            Literal::Number(n) => Other::Number(*n),
            Literal::Boolean(b) => Other::Boolean(*b),
            Literal::Set(values) => Other::Set(values),
        }
    }

    fn from_value(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(s) => Other::Text(Cow::Owned(s)),
            FieldValue::Number(n) => Other::Number(n),
            FieldValue::Boolean(b) => Other::Boolean(b),
            FieldValue::Date(d) => Other::Date(d),
        }
    }

    fn describe(&self) -> String {
        match self {
            Other::Text(s) => format!("text \"{s}\""),
            Other::Number(n) => format!("number {n}"),
            Other::Boolean(b) => format!("boolean {b}"),
            Other::Date(_) => "date".to_string(),
            Other::Pattern(p) => format!("pattern /{}/", p.source()),
            Other::Set(_) => "set".to_string(),
        }
    }
}

/// Apply `op` to two resolved operands
pub(crate) fn compare(
    op: ComparisonOperator,
    left: Resolved<'_>,
    right: Resolved<'_>,
) -> Result<bool, EvalError> {
    match (left, right) {
        (Resolved::Field { name, field }, Resolved::Literal(literal)) => {
            compare_field(op, name, field, Other::from_literal(literal))
        }
        (Resolved::Field { name, field }, Resolved::Field { field: other, .. }) => {
            compare_field(op, name, field, Other::from_value(other.value))
        }
        (Resolved::Literal(literal), Resolved::Field { name, field }) => {
            compare_field(op.mirrored(), name, field, Other::from_literal(literal))
        }
        (Resolved::Literal(_), Resolved::Literal(_)) => Err(EvalError::mismatch(
            "a comparison needs a field on at least one side",
        )),
    }
}

fn compare_field(
    op: ComparisonOperator,
    name: &str,
    field: ResolvedField,
    other: Other<'_>,
) -> Result<bool, EvalError> {
    let ResolvedField { value, declared } = field;
    let (declared, other) = match declared {
        FieldType::Dynamic => {
            let natural = value.natural_type();
            (natural, untyped_date(natural, other))
        }
        declared => (declared, other),
    };

    match other {
        Other::Pattern(pattern) => compare_pattern(op, &value.render(), pattern),
        Other::Set(values) => match op {
            ComparisonOperator::Contains | ComparisonOperator::In => {
                let rendered = value.render();
                Ok(values
                    .iter()
                    .any(|candidate| text_eq(declared, &rendered, candidate)))
            }
            _ => Err(unsupported(op, name, declared, "a set")),
        },
        other => match declared {
            FieldType::Date => compare_date(op, name, &value, other),
            FieldType::Number => compare_number(op, name, &value, other),
            FieldType::Boolean => compare_boolean(op, name, &value, other),
            FieldType::Text | FieldType::TextIgnoreCase | FieldType::Dynamic => {
                compare_text(op, name, declared, &value.render(), other)
            }
        },
    }
}

/// A date literal against an untyped field that holds no date is compared as
/// its canonical text, the same as the quoted form it is written in
fn untyped_date(natural: FieldType, other: Other<'_>) -> Other<'_> {
    match other {
        Other::Date(d) if natural != FieldType::Date => Other::Text(Cow::Owned(format_date(&d))),
        other => other,
    }
}

fn compare_pattern(op: ComparisonOperator, text: &str, pattern: &Pattern) -> Result<bool, EvalError> {
    let matched = match op {
        ComparisonOperator::Matches => pattern.full_match(text),
        ComparisonOperator::Equal => pattern.find(text),
        ComparisonOperator::NotEqual => pattern.find(text).map(|found| !found),
        _ => {
            return Err(EvalError::mismatch(format!(
                "operator {op} cannot be used with a pattern"
            )));
        }
    };
    matched.ok_or_else(|| {
        EvalError::mismatch(format!("malformed pattern literal /{}/", pattern.source()))
    })
}

fn compare_date(
    op: ComparisonOperator,
    name: &str,
    value: &FieldValue,
    other: Other<'_>,
) -> Result<bool, EvalError> {
    let left = match value {
        FieldValue::Date(d) => *d,
        FieldValue::Text(s) => parse_date(s).ok_or_else(|| {
            EvalError::mismatch(format!("value of '{name}' is not a date: \"{s}\""))
        })?,
        other => {
            return Err(EvalError::mismatch(format!(
                "field '{name}' is declared as date but holds a {}",
                other.type_name()
            )));
        }
    };
    let right = match other {
        Other::Date(d) => d,
        Other::Text(s) => parse_date(&s).ok_or_else(|| {
            EvalError::mismatch(format!(
                "\"{s}\" is not a date in the canonical format {DATE_FORMAT}"
            ))
        })?,
        other => return Err(incompatible(name, FieldType::Date, &other)),
    };
    apply_ordering(op, name, FieldType::Date, left.cmp(&right))
}

fn compare_number(
    op: ComparisonOperator,
    name: &str,
    value: &FieldValue,
    other: Other<'_>,
) -> Result<bool, EvalError> {
    let left = match value {
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
            EvalError::mismatch(format!("value of '{name}' is not a number: \"{s}\""))
        })?,
        other => {
            return Err(EvalError::mismatch(format!(
                "field '{name}' is declared as number but holds a {}",
                other.type_name()
            )));
        }
    };
    let right = match other {
        Other::Number(n) => n,
        other => return Err(incompatible(name, FieldType::Number, &other)),
    };
    match left.partial_cmp(&right) {
        Some(ordering) => apply_ordering(op, name, FieldType::Number, ordering),
        // NaN compares unequal to everything
        None => match op {
            ComparisonOperator::NotEqual => Ok(true),
            op if op.is_ordering() || op == ComparisonOperator::Equal => Ok(false),
            op => Err(unsupported(op, name, FieldType::Number, "a number")),
        },
    }
}

fn compare_boolean(
    op: ComparisonOperator,
    name: &str,
    value: &FieldValue,
    other: Other<'_>,
) -> Result<bool, EvalError> {
    let left = match value {
        FieldValue::Boolean(b) => *b,
        other => {
            return Err(EvalError::mismatch(format!(
                "field '{name}' is declared as boolean but holds a {}",
                other.type_name()
            )));
        }
    };
    let right = match other {
        Other::Boolean(b) => b,
        other => return Err(incompatible(name, FieldType::Boolean, &other)),
    };
    match op {
        ComparisonOperator::Equal => Ok(left == right),
        ComparisonOperator::NotEqual => Ok(left != right),
        op => Err(unsupported(op, name, FieldType::Boolean, "a boolean")),
    }
}

fn compare_text(
    op: ComparisonOperator,
    name: &str,
    declared: FieldType,
    text: &str,
    other: Other<'_>,
) -> Result<bool, EvalError> {
    let right = match other {
        Other::Text(s) => s,
        other => return Err(incompatible(name, declared, &other)),
    };
    match op {
        ComparisonOperator::Equal => Ok(text_eq(declared, text, &right)),
        ComparisonOperator::NotEqual => Ok(!text_eq(declared, text, &right)),
        ComparisonOperator::Contains => Ok(text_contains(declared, text, &right)),
        ComparisonOperator::In => Ok(text_contains(declared, &right, text)),
        ComparisonOperator::Matches => Err(EvalError::mismatch(format!(
            "MATCHES on '{name}' needs a pattern, got text \"{right}\""
        ))),
        op => Err(unsupported(op, name, declared, "text")),
    }
}

fn apply_ordering(
    op: ComparisonOperator,
    name: &str,
    declared: FieldType,
    ordering: Ordering,
) -> Result<bool, EvalError> {
    match op {
        ComparisonOperator::Equal => Ok(ordering == Ordering::Equal),
        ComparisonOperator::NotEqual => Ok(ordering != Ordering::Equal),
        ComparisonOperator::GreaterThan => Ok(ordering == Ordering::Greater),
        ComparisonOperator::LessThan => Ok(ordering == Ordering::Less),
        ComparisonOperator::GreaterThanEqual => Ok(ordering != Ordering::Less),
        ComparisonOperator::LessThanEqual => Ok(ordering != Ordering::Greater),
        op => Err(unsupported(op, name, declared, "a single value")),
    }
}

fn text_eq(declared: FieldType, left: &str, right: &str) -> bool {
    if declared == FieldType::TextIgnoreCase {
        left.to_lowercase() == right.to_lowercase()
    } else {
        left == right
    }
}

fn text_contains(declared: FieldType, haystack: &str, needle: &str) -> bool {
    if declared == FieldType::TextIgnoreCase {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

fn incompatible(name: &str, declared: FieldType, other: &Other<'_>) -> EvalError {
    EvalError::mismatch(format!(
        "cannot compare {declared} field '{name}' with {}",
        other.describe()
    ))
}

fn unsupported(op: ComparisonOperator, name: &str, declared: FieldType, against: &str) -> EvalError {
    EvalError::mismatch(format!(
        "operator {op} cannot compare {declared} field '{name}' with {against}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn field(value: FieldValue, declared: FieldType) -> Resolved<'static> {
        Resolved::Field {
            name: "f",
            field: ResolvedField::new(value, declared),
        }
    }

    fn text(s: &str) -> Resolved<'static> {
        field(FieldValue::Text(s.to_string()), FieldType::Text)
    }

    fn check(op: ComparisonOperator, left: Resolved<'_>, literal: &Literal) -> Result<bool, EvalError> {
        compare(op, left, Resolved::Literal(literal))
    }

    #[test]
    fn test_text_equality_respects_case_policy() {
        let lit = Literal::Text("error".into());
        assert!(!check(ComparisonOperator::Equal, text("ERROR"), &lit).unwrap());
        assert!(
            check(
                ComparisonOperator::Equal,
                field(FieldValue::Text("ERROR".into()), FieldType::TextIgnoreCase),
                &lit
            )
            .unwrap()
        );
        assert!(check(ComparisonOperator::NotEqual, text("ERROR"), &lit).unwrap());
    }

    #[test]
    fn test_set_membership_is_exact() {
        let set = Literal::Set(vec!["a".into(), "b".into()]);
        assert!(check(ComparisonOperator::Contains, text("a"), &set).unwrap());
        assert!(check(ComparisonOperator::In, text("b"), &set).unwrap());
        assert!(!check(ComparisonOperator::Contains, text("ab"), &set).unwrap());
        assert!(!check(ComparisonOperator::Contains, text("A"), &set).unwrap());

        let codes = Literal::Set(vec!["200".into(), "204".into()]);
        assert!(
            check(
                ComparisonOperator::In,
                field(FieldValue::Number(204.0), FieldType::Number),
                &codes
            )
            .unwrap()
        );
        assert!(check(ComparisonOperator::Equal, text("a"), &set).is_err());
    }

    #[test]
    fn test_anchored_and_unanchored_patterns() {
        let bcd = Literal::Pattern(Pattern::new("bcd").unwrap());
        assert!(check(ComparisonOperator::Equal, text("abcdef"), &bcd).unwrap());
        assert!(!check(ComparisonOperator::NotEqual, text("abcdef"), &bcd).unwrap());
        assert!(!check(ComparisonOperator::Matches, text("abcdef"), &bcd).unwrap());

        let whole = Literal::Pattern(Pattern::new("abcdef").unwrap());
        assert!(check(ComparisonOperator::Matches, text("abcdef"), &whole).unwrap());
    }

    #[test]
    fn test_malformed_pattern_is_type_mismatch() {
        let broken = Literal::Pattern(Pattern::lenient("(open"));
        let err = check(ComparisonOperator::Equal, text("x"), &broken).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch(msg) if msg.contains("malformed")));
    }

    #[test]
    fn test_dates_parse_canonical_literal() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = || field(FieldValue::Date(instant), FieldType::Date);

        let same = Literal::Text("2024-01-01T00:00:00Z".into());
        assert!(check(ComparisonOperator::Equal, ts(), &same).unwrap());

        let later = Literal::Text("2024-01-01T00:00:01Z".into());
        assert!(!check(ComparisonOperator::Equal, ts(), &later).unwrap());
        assert!(check(ComparisonOperator::LessThan, ts(), &later).unwrap());

        let bad = Literal::Text("01/01/2024".into());
        assert!(matches!(
            check(ComparisonOperator::Equal, ts(), &bad),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_number_ordering_and_mismatch() {
        let status = || field(FieldValue::Number(404.0), FieldType::Number);
        assert!(check(ComparisonOperator::GreaterThanEqual, status(), &Literal::Number(400.0)).unwrap());
        assert!(!check(ComparisonOperator::LessThan, status(), &Literal::Number(400.0)).unwrap());
        assert!(check(ComparisonOperator::Equal, status(), &Literal::Text("404".into())).is_err());
        assert!(check(ComparisonOperator::GreaterThan, text("b"), &Literal::Text("a".into())).is_err());
    }

    #[test]
    fn test_literal_on_left_is_mirrored() {
        let status = field(FieldValue::Number(404.0), FieldType::Number);
        let lit = Literal::Number(500.0);
        // 500 > status  <=>  status < 500
        assert!(compare(ComparisonOperator::GreaterThan, Resolved::Literal(&lit), status).unwrap());
    }

    #[test]
    fn test_booleans_only_support_equality() {
        let flag = || field(FieldValue::Boolean(true), FieldType::Boolean);
        assert!(check(ComparisonOperator::Equal, flag(), &Literal::Boolean(true)).unwrap());
        assert!(check(ComparisonOperator::GreaterThan, flag(), &Literal::Boolean(false)).is_err());
    }

    #[test]
    fn test_two_literals_are_rejected() {
        let a = Literal::Number(1.0);
        assert!(compare(ComparisonOperator::Equal, Resolved::Literal(&a), Resolved::Literal(&a)).is_err());
    }

    #[test]
    fn test_date_literal_on_untyped_field_matches_its_text_form() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let date = Literal::Date(instant);
        let quoted = Literal::Text("2024-01-01T00:00:00Z".into());
        let dynamic = |value: FieldValue| field(value, FieldType::Dynamic);

        for value in [
            FieldValue::Text("2024-01-01T00:00:00Z".into()),
            FieldValue::Text("yesterday".into()),
            FieldValue::Date(instant),
        ] {
            for op in [ComparisonOperator::Equal, ComparisonOperator::NotEqual] {
                let as_date = check(op, dynamic(value.clone()), &date).map_err(|e| e.to_string());
                let as_text = check(op, dynamic(value.clone()), &quoted).map_err(|e| e.to_string());
                assert_eq!(as_date, as_text, "{op} against {value:?}");
            }
        }
        assert!(check(ComparisonOperator::Equal, dynamic(FieldValue::Text("2024-01-01T00:00:00Z".into())), &date).unwrap());

        let number = check(ComparisonOperator::Equal, dynamic(FieldValue::Number(1.0)), &date).unwrap_err();
        let quoted_number = check(ComparisonOperator::Equal, dynamic(FieldValue::Number(1.0)), &quoted).unwrap_err();
        assert_eq!(number, quoted_number);
    }
}
