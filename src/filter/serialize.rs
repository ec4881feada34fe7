//! Canonical filter strings
//!
//! The output re-parses to an equivalent tree. Grouping follows the tree
//! exactly: a nested plain expression gets parentheses, a negated one brings
//! its own `!(...)`.

use std::fmt::{self, Write};

use super::ast::{Comparison, Literal, LogicalExpression, Node, Operand, sanitize_name};
use super::operator::ComparisonOperator;
use super::resolver::{format_date, format_number};

/// Canonical filter string for `node`
pub fn serialize(node: &Node) -> String {
    node.to_string()
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Expression(expr) => write_expression(f, expr),
            Node::Comparison(cmp) => write_comparison(f, cmp),
            Node::StringSearch(term) => write_quoted(f, term),
            Node::Alias(name) => write!(f, "#{}", sanitize_name(name)),
        }
    }
}

fn write_expression(f: &mut fmt::Formatter<'_>, expr: &LogicalExpression) -> fmt::Result {
    if expr.is_negated() {
        f.write_str("!(")?;
    }
    for (i, child) in expr.children().iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", expr.op())?;
        }
        match child {
            Node::Expression(inner) if !inner.is_negated() => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    if expr.is_negated() {
        f.write_char(')')?;
    }
    Ok(())
}

fn write_comparison(f: &mut fmt::Formatter<'_>, cmp: &Comparison) -> fmt::Result {
    write_operand(f, &cmp.left, cmp.op)?;
    write!(f, " {} ", cmp.op)?;
    write_operand(f, &cmp.right, cmp.op)
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Operand, op: ComparisonOperator) -> fmt::Result {
    match operand {
        Operand::Field(field) => f.write_str(&field.name),
        Operand::Rule(name) => f.write_str(name),
        Operand::Literal(literal) => write_literal(f, literal, op),
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, literal: &Literal, op: ComparisonOperator) -> fmt::Result {
    match literal {
        Literal::Text(s) => write_quoted(f, s),
        Literal::Pattern(pattern) if op == ComparisonOperator::Matches => {
            write_quoted(f, pattern.source())
        }
        Literal::Pattern(pattern) => write_slashed(f, pattern.source()),
        Literal::Date(date) => write_quoted(f, &format_date(date)),
        // out of f64 range, so it reads back as infinity
        Literal::Number(n) if n.is_infinite() => f.write_str(if *n > 0.0 { "1e999" } else { "-1e999" }),
        Literal::Number(n) => f.write_str(&format_number(*n)),
        Literal::Boolean(b) => write!(f, "{b}"),
        Literal::Set(values) => {
            f.write_char('[')?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_quoted(f, value)?;
            }
            f.write_char(']')
        }
    }
}

/// Double-quote `s`, escaping quotes, backslashes and control characters
fn write_quoted(f: &mut impl Write, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// `/source/` with bare slashes escaped; existing escapes are kept as written
fn write_slashed(f: &mut impl Write, source: &str) -> fmt::Result {
    f.write_char('/')?;
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                f.write_char('\\')?;
                if let Some(next) = chars.next() {
                    f.write_char(next)?;
                }
            }
            '/' => f.write_str("\\/")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('/')
}
