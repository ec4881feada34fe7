use thiserror::Error;

use super::operator::ComparisonOperator;
use super::resolver::FieldType;

/// Errors that can occur when parsing filter expressions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterParseError {
    #[error("Empty filter expression")]
    Empty,

    #[error("Unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        position: usize,
    },

    #[error("Unexpected end of filter, expected {0}")]
    UnexpectedEnd(&'static str),

    #[error("Unterminated {kind} starting at position {position}")]
    Unterminated { kind: &'static str, position: usize },

    #[error("Invalid escape sequence '\\{sequence}' at position {position}")]
    InvalidEscape { sequence: String, position: usize },

    #[error("Unknown operator: '{0}'")]
    UnknownOperator(String),

    #[error("Unknown field or filter: '{0}'")]
    UnknownField(String),

    #[error("Invalid number literal: '{0}'")]
    InvalidNumber(String),

    #[error("Invalid regular expression /{pattern}/: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Operator {op} cannot be used with field '{field}' of type {field_type}")]
    IncompatibleOperator {
        op: ComparisonOperator,
        field: String,
        field_type: FieldType,
    },

    #[error("Invalid right hand value for comparison with '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Filter nesting exceeds the maximum depth of {max_depth} at position {position}")]
    TooDeep { max_depth: usize, position: usize },
}

/// Diagnostics recorded while evaluating a filter against a record
///
/// None of these abort evaluation: the node that produced one evaluates to
/// false and its siblings carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Field '{0}' is not present on the record")]
    FieldNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Could not find a filter in the library for alias: {0}")]
    AliasNotFound(String),

    #[error("Recursion detected in filter. Alias trace: {}", .0.join(" -> "))]
    CyclicAliasReference(Vec<String>),

    #[error("Filter nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),
}

impl EvalError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch(message.into())
    }
}

/// Errors raised when changing the contents of a filter library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LibraryError {
    #[error("Filter name must not be empty")]
    EmptyName,

    #[error("A filter named '{0}' already exists in the library")]
    Duplicate(String),

    #[error("No filter named '{0}' exists in the library")]
    Missing(String),

    #[error("Filter '{name}' is invalid: {}", .errors.join("; "))]
    InvalidDependencies { name: String, errors: Vec<String> },
}
