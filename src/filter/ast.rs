//! Filter syntax tree
//!
//! The tree is a plain value: logical expressions own their children and no
//! node points back up. Saved filters are only ever referenced by name, so a
//! single tree can never contain a cycle.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

use super::operator::{ComparisonOperator, LogicalOperator};
use super::resolver::FieldType;

/// Reference to a record field together with its declared type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldRef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A regular expression literal
///
/// Both an anchored and an unanchored form are compiled up front. A pattern
/// restored from storage may fail to compile; it is still representable so
/// that evaluation can report it instead of refusing to load the filter.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    unanchored: Option<Regex>,
    anchored: Option<Regex>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self, regex::Error> {
        let source = source.into();
        let unanchored = Regex::new(&source)?;
        let anchored = Regex::new(&format!("^(?:{source})$"))?;
        Ok(Self {
            source,
            unanchored: Some(unanchored),
            anchored: Some(anchored),
        })
    }

    /// Build a pattern without rejecting invalid sources
    pub fn lenient(source: impl Into<String>) -> Self {
        let source = source.into();
        match Pattern::new(source.clone()) {
            Ok(pattern) => pattern,
            Err(_) => Self {
                source,
                unanchored: None,
                anchored: None,
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.unanchored.is_some()
    }

    /// Match anywhere in `text`, `None` if the pattern never compiled
    pub fn find(&self, text: &str) -> Option<bool> {
        self.unanchored.as_ref().map(|re| re.is_match(text))
    }

    /// Match the whole of `text`, `None` if the pattern never compiled
    pub fn full_match(&self, text: &str) -> Option<bool> {
        self.anchored.as_ref().map(|re| re.is_match(text))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// A constant operand
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Pattern(Pattern),
    Date(DateTime<Utc>),
    Number(f64),
    Boolean(bool),
    Set(Vec<String>),
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(FieldRef),
    Literal(Literal),
    /// A saved filter used as a boolean value, referenced by name
    Rule(String),
}

impl Operand {
    pub fn field(name: impl Into<String>, field_type: FieldType) -> Self {
        Operand::Field(FieldRef::new(name, field_type))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Operand::Literal(Literal::Text(value.into()))
    }

    pub fn number(value: f64) -> Self {
        Operand::Literal(Literal::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Operand::Literal(Literal::Boolean(value))
    }

    pub fn date(value: DateTime<Utc>) -> Self {
        Operand::Literal(Literal::Date(value))
    }

    pub fn set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Operand::Literal(Literal::Set(values.into_iter().map(Into::into).collect()))
    }

    pub fn pattern(source: &str) -> Result<Self, regex::Error> {
        Ok(Operand::Literal(Literal::Pattern(Pattern::new(source)?)))
    }

    pub fn as_field(&self) -> Option<&FieldRef> {
        match self {
            Operand::Field(field) => Some(field),
            _ => None,
        }
    }
}

/// Leaf comparing two operands
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: ComparisonOperator,
    pub right: Operand,
}

impl Comparison {
    pub fn new(left: Operand, op: ComparisonOperator, right: Operand) -> Self {
        Self { left, op, right }
    }
}

/// Internal node combining one or more children with a logical operator
///
/// The child list is never empty. With a single child the operator is kept
/// but has no effect.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalExpression {
    op: LogicalOperator,
    negated: bool,
    children: Vec<Node>,
}

impl LogicalExpression {
    pub fn new(op: LogicalOperator, first: Node) -> Self {
        Self {
            op,
            negated: false,
            children: vec![first],
        }
    }

    /// `None` when `children` is empty
    pub fn from_children(op: LogicalOperator, children: Vec<Node>) -> Option<Self> {
        if children.is_empty() {
            return None;
        }
        Some(Self {
            op,
            negated: false,
            children,
        })
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn op(&self) -> LogicalOperator {
        self.op
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn into_children(self) -> Vec<Node> {
        self.children
    }
}

/// A filter syntax tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Expression(LogicalExpression),
    Comparison(Comparison),
    /// Free-text term searched across the whole record
    StringSearch(String),
    /// Reference to a saved filter by name
    Alias(String),
}

impl Node {
    pub fn comparison(left: Operand, op: ComparisonOperator, right: Operand) -> Self {
        Node::Comparison(Comparison::new(left, op, right))
    }

    pub fn search(term: impl Into<String>) -> Self {
        Node::StringSearch(term.into())
    }

    /// Reference a saved filter; the name is sanitised like [`FilterRule::new`]
    pub fn alias(name: impl AsRef<str>) -> Self {
        Node::Alias(sanitize_name(name.as_ref()))
    }

    pub fn and(children: Vec<Node>) -> Option<Self> {
        LogicalExpression::from_children(LogicalOperator::And, children).map(Node::Expression)
    }

    pub fn or(children: Vec<Node>) -> Option<Self> {
        LogicalExpression::from_children(LogicalOperator::Or, children).map(Node::Expression)
    }

    /// Negate a node, wrapping it in a single-child expression if needed
    pub fn not(node: Node) -> Self {
        match node {
            Node::Expression(expr) if !expr.is_negated() => Node::Expression(expr.negate()),
            other => Node::Expression(LogicalExpression::new(LogicalOperator::And, other).negate()),
        }
    }
}

/// A named, saved filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRule {
    name: String,
    root: Node,
}

impl FilterRule {
    /// Create a rule; the name is sanitised to `[A-Za-z0-9_.]`
    pub fn new(name: &str, root: Node) -> Self {
        Self {
            name: sanitize_name(name),
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Canonical filter string of the rule body
    pub fn filter_string(&self) -> String {
        self.root.to_string()
    }

    /// A copy of this rule with `condition` joined to the body by `op`
    ///
    /// A body whose top-level operator differs from `op` is kept as its own
    /// group so the existing grouping is preserved.
    pub fn with_added_condition(&self, op: LogicalOperator, condition: Node) -> FilterRule {
        let root = match &self.root {
            Node::Expression(expr)
                if !expr.is_negated() && (expr.op() == op || expr.children().len() == 1) =>
            {
                let mut children = expr.children().to_vec();
                children.push(condition);
                LogicalExpression::from_children(op, children)
            }
            other => LogicalExpression::from_children(op, vec![other.clone(), condition]),
        };

        FilterRule {
            name: self.name.clone(),
            // from_children only fails on an empty list
            root: root.map(Node::Expression).unwrap_or_else(|| self.root.clone()),
        }
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl Serialize for FilterRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FilterRule", 2)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("filter", &self.filter_string())?;
        state.end()
    }
}

/// Replace every character outside `[A-Za-z0-9_.]` with `_`
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_is(value: &str) -> Node {
        Node::comparison(
            Operand::field("level", FieldType::Text),
            ComparisonOperator::Equal,
            Operand::text(value),
        )
    }

    #[test]
    fn test_expression_requires_children() {
        assert!(LogicalExpression::from_children(LogicalOperator::And, vec![]).is_none());
        assert!(Node::or(vec![level_is("INFO")]).is_some());
    }

    #[test]
    fn test_not_reuses_plain_expression() {
        let expr = Node::and(vec![level_is("INFO"), level_is("WARN")]).unwrap();
        match Node::not(expr) {
            Node::Expression(e) => {
                assert!(e.is_negated());
                assert_eq!(e.children().len(), 2);
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_not_wraps_leaf_and_negated_expression() {
        match Node::not(level_is("INFO")) {
            Node::Expression(e) => {
                assert!(e.is_negated());
                assert_eq!(e.children(), &[level_is("INFO")]);
            }
            other => panic!("expected expression, got {other:?}"),
        }

        let double = Node::not(Node::not(level_is("INFO")));
        match double {
            Node::Expression(outer) => {
                assert!(outer.is_negated());
                assert!(matches!(&outer.children()[0], Node::Expression(inner) if inner.is_negated()));
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_forms() {
        let pattern = Pattern::new("bcd").unwrap();
        assert_eq!(pattern.find("abcdef"), Some(true));
        assert_eq!(pattern.full_match("abcdef"), Some(false));
        assert_eq!(pattern.full_match("bcd"), Some(true));

        let alternation = Pattern::new("a|b").unwrap();
        assert_eq!(alternation.full_match("ab"), Some(false));

        let broken = Pattern::lenient("(unclosed");
        assert!(!broken.is_valid());
        assert_eq!(broken.find("anything"), None);
        assert_eq!(broken.source(), "(unclosed");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my filter!"), "my_filter_");
        assert_eq!(sanitize_name("errors.v2"), "errors.v2");
    }

    #[test]
    fn test_with_added_condition_extends_same_operator() {
        let rule = FilterRule::new("r", Node::and(vec![level_is("INFO")]).unwrap());
        let extended = rule.with_added_condition(LogicalOperator::Or, level_is("WARN"));
        match extended.root() {
            Node::Expression(e) => {
                assert_eq!(e.op(), LogicalOperator::Or);
                assert_eq!(e.children().len(), 2);
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_with_added_condition_groups_other_operator() {
        let body = Node::or(vec![level_is("INFO"), level_is("WARN")]).unwrap();
        let rule = FilterRule::new("r", body.clone());
        let extended = rule.with_added_condition(LogicalOperator::And, level_is("ERROR"));
        match extended.root() {
            Node::Expression(e) => {
                assert_eq!(e.op(), LogicalOperator::And);
                assert_eq!(e.children()[0], body);
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }
}
