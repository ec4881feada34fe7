use std::fmt;
use std::str::FromStr;

use super::error::FilterParseError;

/// Comparison operators usable between two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanEqual,
    LessThanEqual,
    /// Set membership against a set literal, substring against a string literal
    Contains,
    /// Set membership: the field value is one of the listed values
    In,
    /// Anchored pattern match over the whole field value
    Matches,
}

impl ComparisonOperator {
    pub const ALL: [ComparisonOperator; 9] = [
        ComparisonOperator::Equal,
        ComparisonOperator::NotEqual,
        ComparisonOperator::GreaterThan,
        ComparisonOperator::LessThan,
        ComparisonOperator::GreaterThanEqual,
        ComparisonOperator::LessThanEqual,
        ComparisonOperator::Contains,
        ComparisonOperator::In,
        ComparisonOperator::Matches,
    ];

    /// Canonical label used when serializing a filter
    pub fn label(self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "==",
            ComparisonOperator::NotEqual => "!=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::GreaterThanEqual => ">=",
            ComparisonOperator::LessThanEqual => "<=",
            ComparisonOperator::Contains => "CONTAINS",
            ComparisonOperator::In => "IN",
            ComparisonOperator::Matches => "MATCHES",
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            ComparisonOperator::GreaterThan
                | ComparisonOperator::LessThan
                | ComparisonOperator::GreaterThanEqual
                | ComparisonOperator::LessThanEqual
        )
    }

    /// The operator that keeps the meaning when both operands swap sides
    pub fn mirrored(self) -> Self {
        match self {
            ComparisonOperator::GreaterThan => ComparisonOperator::LessThan,
            ComparisonOperator::LessThan => ComparisonOperator::GreaterThan,
            ComparisonOperator::GreaterThanEqual => ComparisonOperator::LessThanEqual,
            ComparisonOperator::LessThanEqual => ComparisonOperator::GreaterThanEqual,
            ComparisonOperator::Contains => ComparisonOperator::In,
            ComparisonOperator::In => ComparisonOperator::Contains,
            other => other,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonOperator::ALL
            .into_iter()
            .find(|op| op.label().eq_ignore_ascii_case(s))
            .ok_or_else(|| FilterParseError::UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Operators joining the children of a logical expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn label(self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

impl FromStr for LogicalOperator {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AND" | "&&" => Ok(LogicalOperator::And),
            "OR" | "||" => Ok(LogicalOperator::Or),
            _ => Err(FilterParseError::UnknownOperator(s.to_string())),
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
