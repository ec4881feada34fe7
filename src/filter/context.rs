use super::error::EvalError;

/// Diagnostics accumulated during one top-level evaluation
///
/// Created fresh by each `evaluate` call and handed back with the verdict.
/// `success` drops to false on the first recorded error and never recovers.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    errors: Vec<EvalError>,
    success: bool,
    /// Aliases currently being resolved on the path from the root, lower-cased
    alias_trace: Vec<String>,
    depth: usize,
    depth_exceeded: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            success: true,
            alias_trace: Vec::new(),
            depth: 0,
            depth_exceeded: false,
        }
    }

    pub fn add_error(&mut self, error: EvalError) {
        self.errors.push(error);
        self.success = false;
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn errors(&self) -> &[EvalError] {
        &self.errors
    }

    /// All error messages, one per line
    pub fn error_string(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn descend(&mut self) {
        self.depth += 1;
    }

    /// Record the depth limit being hit; later hits in the same evaluation are not repeated
    pub(crate) fn exceed_depth(&mut self, max_depth: usize) -> bool {
        if self.depth_exceeded {
            return false;
        }
        self.depth_exceeded = true;
        self.add_error(EvalError::DepthExceeded(max_depth));
        true
    }

    pub(crate) fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Enter resolution of `alias`
    ///
    /// On a cycle the returned trace ends with the repeated alias and nothing
    /// is pushed.
    pub(crate) fn enter_alias(&mut self, alias: &str) -> Result<(), Vec<String>> {
        let key = alias.to_lowercase();
        if self.alias_trace.contains(&key) {
            let mut trace = self.alias_trace.clone();
            trace.push(key);
            return Err(trace);
        }
        self.alias_trace.push(key);
        Ok(())
    }

    pub(crate) fn leave_alias(&mut self) {
        self.alias_trace.pop();
    }

    pub(crate) fn alias_trace(&self) -> &[String] {
        &self.alias_trace
    }
}
