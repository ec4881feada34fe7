//! Filter expressions over structured records
//!
//! A filter is a tree of logical expressions, comparisons, free-text
//! searches and references to saved filters. Trees are evaluated against any
//! record type through a [`FieldResolver`], and saved filters are looked up
//! through a [`FilterRegistry`] at evaluation time.
//!
//! # Syntax
//!
//! ```text
//! field == value          Comparison (==, !=, <, <=, >, >=, CONTAINS, IN, MATCHES)
//! "text"                  Case-insensitive search across the whole record
//! #name                   Saved filter from the library
//! name == true            Saved filter used as a boolean value
//! !expr                   Negation
//! a AND b, a && b         Conjunction (binds tighter than OR)
//! a OR b, a || b          Disjunction
//! ( ... )                 Grouping
//! ```
//!
//! Values are strings (`"..."` or `'...'`), numbers, `true`/`false`,
//! regular expressions (`/.../`) and sets (`["a", "b"]`). Dates are strings in
//! RFC 3339 form.
//!
//! # Examples
//!
//! ```text
//! status == 200 AND "error"
//! level IN ["ERROR", "WARN"] AND !(component == "socket")
//! timestamp >= "2024-01-01T00:00:00Z" AND message MATCHES "conn.*refused"
//! #errors OR payload.retry > 3
//! ```

pub mod ast;
mod compare;
pub mod context;
pub mod error;
pub mod eval;
pub mod operator;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod serialize;

pub use ast::{Comparison, FieldRef, FilterRule, Literal, LogicalExpression, Node, Operand, Pattern};
pub use context::ExecutionContext;
pub use error::{EvalError, FilterParseError, LibraryError};
pub use eval::{DEFAULT_MAX_DEPTH, Evaluator, evaluate};
pub use operator::{ComparisonOperator, LogicalOperator};
pub use parser::{FilterParser, parse_filter};
pub use registry::{Dependencies, FilterLibrary, FilterRegistry, analyze_dependencies};
pub use resolver::{FieldCatalog, FieldResolver, FieldType, FieldValue, ResolvedField};
pub use serialize::serialize;
