use crate::types::Value;
use crate::variables::VariableMap;

/// Single-use variable scope handed to a policy run.
///
/// The dispatcher binds every marshalled argument with [`set_variable`] before
/// the run and reads the declared results back with [`get_variables`] after
/// it. Names are case-insensitive.
///
/// [`set_variable`]: ExecutionContext::set_variable
/// [`get_variables`]: ExecutionContext::get_variables
pub trait ExecutionContext: Send {
    /// Binds `value` under `name`, replacing any previous binding.
    fn set_variable(&mut self, name: &str, value: Value);

    /// Reads the requested variables. Names that are not bound are omitted
    /// from the returned map.
    fn get_variables(&self, names: &[&str]) -> VariableMap;
}

/// Plain in-memory [`ExecutionContext`].
#[derive(Debug, Clone, Default)]
pub struct VariableScope {
    vars: VariableMap,
}

impl VariableScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    #[must_use]
    pub fn variables(&self) -> &VariableMap {
        &self.vars
    }

    pub fn clear(&mut self) {
        self.vars = VariableMap::new();
    }
}

impl ExecutionContext for VariableScope {
    fn set_variable(&mut self, name: &str, value: Value) {
        self.vars.insert(name, value);
    }

    fn get_variables(&self, names: &[&str]) -> VariableMap {
        names
            .iter()
            .filter_map(|&name| self.vars.get(name).map(|v| (name, v.clone())))
            .collect()
    }
}
