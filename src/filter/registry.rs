//! Saved filter lookup and dependency analysis

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use super::ast::{FilterRule, Node, Operand};
use super::error::{EvalError, LibraryError};

/// Maps alias names to saved filter definitions
///
/// A lookup hands out a snapshot: later edits to the registry do not affect
/// a definition already returned.
pub trait FilterRegistry {
    /// Case-insensitive lookup of a saved filter
    fn lookup(&self, name: &str) -> Option<Arc<FilterRule>>;
}

impl FilterRegistry for BTreeMap<String, Arc<FilterRule>> {
    fn lookup(&self, name: &str) -> Option<Arc<FilterRule>> {
        self.get(&name.to_lowercase()).cloned()
    }
}

/// In-process library of saved filters
///
/// Definitions are stored behind `Arc`s and replaced wholesale on update, so
/// evaluations already holding a definition keep a consistent copy.
#[derive(Debug, Default)]
pub struct FilterLibrary {
    rules: RwLock<BTreeMap<String, Arc<FilterRule>>>,
}

impl FilterLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new saved filter
    ///
    /// Fails if the name is taken, or if the definition references a missing
    /// alias or closes an alias cycle.
    pub fn add(&self, rule: FilterRule) -> Result<Arc<FilterRule>, LibraryError> {
        let key = library_key(&rule)?;
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.contains_key(&key) {
            return Err(LibraryError::Duplicate(rule.name().to_string()));
        }

        let rule = Arc::new(rule);
        validate_with(&rules, &key, &rule)?;
        info!(name = rule.name(), filter = %rule, "added filter to library");
        rules.insert(key, Arc::clone(&rule));
        Ok(rule)
    }

    /// Replace the definition of an existing saved filter, returning the old one
    pub fn replace(&self, rule: FilterRule) -> Result<Arc<FilterRule>, LibraryError> {
        let key = library_key(&rule)?;
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if !rules.contains_key(&key) {
            return Err(LibraryError::Missing(rule.name().to_string()));
        }

        let name = rule.name().to_string();
        let rule = Arc::new(rule);
        validate_with(&rules, &key, &rule)?;
        info!(name, filter = %rule, "updated filter in library");
        rules.insert(key, rule).ok_or(LibraryError::Missing(name))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<FilterRule>> {
        let removed = self
            .rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name.to_lowercase());
        if removed.is_some() {
            info!(name, "removed filter from library");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<FilterRule>> {
        self.lookup(name)
    }

    /// Saved filters ordered by name
    pub fn rules(&self) -> Vec<Arc<FilterRule>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.rules()
            .iter()
            .map(|rule| rule.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FilterRegistry for FilterLibrary {
    fn lookup(&self, name: &str) -> Option<Arc<FilterRule>> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(name)
    }
}

fn library_key(rule: &FilterRule) -> Result<String, LibraryError> {
    if rule.name().is_empty() {
        return Err(LibraryError::EmptyName);
    }
    Ok(rule.name().to_lowercase())
}

/// Check `rule` as if it were stored under `key` alongside `current`
fn validate_with(
    current: &BTreeMap<String, Arc<FilterRule>>,
    key: &str,
    rule: &Arc<FilterRule>,
) -> Result<(), LibraryError> {
    let mut candidate = current.clone();
    candidate.insert(key.to_string(), Arc::clone(rule));

    let deps = analyze_dependencies(&Node::alias(rule.name()), &candidate, true);
    if deps.errors.is_empty() {
        return Ok(());
    }

    debug!(name = rule.name(), errors = deps.errors.len(), "rejected filter definition");
    Err(LibraryError::InvalidDependencies {
        name: rule.name().to_string(),
        errors: deps.errors.iter().map(ToString::to_string).collect(),
    })
}

/// Everything a filter depends on, following saved filters transitively
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dependencies {
    /// Referenced saved filters, lower-cased
    pub aliases: BTreeSet<String>,
    /// Record fields read by any reachable comparison
    pub fields: BTreeSet<String>,
    pub errors: Vec<EvalError>,
}

/// Collect the aliases and fields `node` depends on
///
/// With `check_aliases` set, referenced filters are looked up and walked;
/// missing ones and alias cycles are reported in `errors`.
pub fn analyze_dependencies<L>(node: &Node, registry: &L, check_aliases: bool) -> Dependencies
where
    L: FilterRegistry + ?Sized,
{
    let mut walker = DependencyWalker {
        registry,
        check_aliases,
        trace: Vec::new(),
        deps: Dependencies::default(),
    };
    walker.visit(node);
    walker.deps
}

struct DependencyWalker<'a, L: ?Sized> {
    registry: &'a L,
    check_aliases: bool,
    trace: Vec<String>,
    deps: Dependencies,
}

impl<L: FilterRegistry + ?Sized> DependencyWalker<'_, L> {
    fn visit(&mut self, node: &Node) {
        match node {
            Node::Expression(expr) => expr.children().iter().for_each(|child| self.visit(child)),
            Node::Comparison(cmp) => {
                self.visit_operand(&cmp.left);
                self.visit_operand(&cmp.right);
            }
            Node::StringSearch(_) => {}
            Node::Alias(name) => self.visit_alias(name),
        }
    }

    fn visit_operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Field(field) => {
                self.deps.fields.insert(field.name.clone());
            }
            Operand::Rule(name) => self.visit_alias(name),
            Operand::Literal(_) => {}
        }
    }

    fn visit_alias(&mut self, name: &str) {
        let key = name.to_lowercase();
        if self.trace.contains(&key) {
            let mut trace = self.trace.clone();
            trace.push(key);
            self.deps.errors.push(EvalError::CyclicAliasReference(trace));
            return;
        }

        self.deps.aliases.insert(key.clone());
        if !self.check_aliases {
            return;
        }

        self.trace.push(key);
        match self.registry.lookup(name) {
            Some(rule) => self.visit(rule.root()),
            None => self
                .deps
                .errors
                .push(EvalError::AliasNotFound(name.to_string())),
        }
        self.trace.pop();
    }
}
