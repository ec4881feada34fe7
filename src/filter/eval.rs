//! Filter evaluation
//!
//! A single recursive walk over the tree. Nothing here returns an error:
//! failures are recorded in the `ExecutionContext` and the failing node
//! contributes `false`, so a broken filter matches nothing and says why.

use tracing::{debug, trace, warn};

use super::ast::{Comparison, LogicalExpression, Node, Operand};
use super::compare::{Resolved, compare};
use super::context::ExecutionContext;
use super::error::EvalError;
use super::operator::LogicalOperator;
use super::registry::FilterRegistry;
use super::resolver::{FieldResolver, FieldType, FieldValue, ResolvedField};

/// Default limit on expression nesting plus alias chain length
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Evaluate `node` against `record` with the default depth limit
pub fn evaluate<R, F, L>(node: &Node, record: &R, resolver: &F, registry: &L) -> (bool, ExecutionContext)
where
    R: ?Sized,
    F: FieldResolver<R> + ?Sized,
    L: FilterRegistry + ?Sized,
{
    Evaluator::new(resolver, registry).evaluate(node, record)
}

/// Evaluates filters against records through a field resolver and a registry
///
/// Holds only shared references, so one evaluator can serve many threads;
/// each call gets its own `ExecutionContext`.
pub struct Evaluator<'a, F: ?Sized, L: ?Sized> {
    resolver: &'a F,
    registry: &'a L,
    max_depth: usize,
}

impl<F: ?Sized, L: ?Sized> Clone for Evaluator<'_, F, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F: ?Sized, L: ?Sized> Copy for Evaluator<'_, F, L> {}

impl<'a, F, L> Evaluator<'a, F, L>
where
    F: ?Sized,
    L: FilterRegistry + ?Sized,
{
    pub fn new(resolver: &'a F, registry: &'a L) -> Self {
        Self {
            resolver,
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Evaluate `node` against `record`, returning the verdict and diagnostics
    pub fn evaluate<R>(&self, node: &Node, record: &R) -> (bool, ExecutionContext)
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        let mut ctx = ExecutionContext::new();
        let result = self.visit(node, record, &mut ctx);
        (result, ctx)
    }

    /// Verdict only; diagnostics are dropped
    pub fn matches<R>(&self, node: &Node, record: &R) -> bool
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        self.evaluate(node, record).0
    }

    fn visit<R>(&self, node: &Node, record: &R, ctx: &mut ExecutionContext) -> bool
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        if ctx.depth() >= self.max_depth {
            if ctx.exceed_depth(self.max_depth) {
                warn!(max_depth = self.max_depth, "filter nesting limit reached");
            }
            return false;
        }

        ctx.descend();
        let result = match node {
            Node::Expression(expr) => self.visit_expression(expr, record, ctx),
            Node::Comparison(cmp) => self.visit_comparison(cmp, record, ctx),
            Node::StringSearch(term) => self.visit_search(term, record),
            Node::Alias(name) => self.resolve_alias(name, record, ctx).unwrap_or(false),
        };
        ctx.ascend();
        result
    }

    fn visit_expression<R>(
        &self,
        expr: &LogicalExpression,
        record: &R,
        ctx: &mut ExecutionContext,
    ) -> bool
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        let mut children = expr.children().iter();
        let mut result = match children.next() {
            Some(first) => self.visit(first, record, ctx),
            None => false,
        };

        for child in children {
            match expr.op() {
                LogicalOperator::And if !result => break,
                LogicalOperator::Or if result => break,
                _ => {}
            }
            result = self.visit(child, record, ctx);
        }

        result != expr.is_negated()
    }

    fn visit_comparison<R>(&self, cmp: &Comparison, record: &R, ctx: &mut ExecutionContext) -> bool
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        let Some(left) = self.resolve_operand(&cmp.left, record, ctx) else {
            return false;
        };
        let Some(right) = self.resolve_operand(&cmp.right, record, ctx) else {
            return false;
        };

        match compare(cmp.op, left, right) {
            Ok(result) => result,
            Err(err) => {
                trace!(error = %err, "comparison failed");
                ctx.add_error(err);
                false
            }
        }
    }

    fn visit_search<R>(&self, term: &str, record: &R) -> bool
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        self.resolver
            .full_text(record)
            .to_lowercase()
            .contains(&term.to_lowercase())
    }

    fn resolve_operand<'n, R>(
        &self,
        operand: &'n Operand,
        record: &R,
        ctx: &mut ExecutionContext,
    ) -> Option<Resolved<'n>>
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        match operand {
            Operand::Literal(literal) => Some(Resolved::Literal(literal)),
            Operand::Field(field) => match self.resolver.resolve(record, &field.name) {
                Some(resolved) => Some(Resolved::Field {
                    name: field.name.as_str(),
                    field: resolved,
                }),
                None => {
                    ctx.add_error(EvalError::FieldNotFound(field.name.clone()));
                    None
                }
            },
            // A saved filter used as a value: its verdict becomes a boolean field
            Operand::Rule(name) => self.resolve_alias(name, record, ctx).map(|verdict| {
                Resolved::Field {
                    name: name.as_str(),
                    field: ResolvedField::new(FieldValue::Boolean(verdict), FieldType::Boolean),
                }
            }),
        }
    }

    /// Evaluate the saved filter `name`; `None` once an error has been recorded
    fn resolve_alias<R>(&self, name: &str, record: &R, ctx: &mut ExecutionContext) -> Option<bool>
    where
        R: ?Sized,
        F: FieldResolver<R>,
    {
        let Some(rule) = self.registry.lookup(name) else {
            debug!(alias = name, "alias not found in filter library");
            ctx.add_error(EvalError::AliasNotFound(name.to_string()));
            return None;
        };

        if let Err(trace) = ctx.enter_alias(name) {
            debug!(trace = %trace.join(" -> "), "cyclic alias reference");
            ctx.add_error(EvalError::CyclicAliasReference(trace));
            return None;
        }

        trace!(alias = name, depth = ctx.alias_trace().len(), "entering alias");
        let result = self.visit(rule.root(), record, ctx);
        ctx.leave_alias();
        trace!(alias = name, result, "leaving alias");

        Some(result)
    }
}
