//! # Runner Registry
//!
//! Explicit name-to-constructor table for handler resolution. The registry
//! is an ordinary value built at process start and passed by reference to
//! the scheduler; there is no hidden global, so test isolation and
//! registration order are never a concern.
//!
//! Resolution failure is a configuration defect (a task referencing a
//! handler this deployment does not ship), which the dispatch layer treats
//! as fatal for the owning task, never as retryable.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::runner::Runner;
use crate::runners::{MedianAggregateRunner, ScoreRequestRunner, ThresholdGateRunner};

/// Constructor stored per handler name.
pub type RunnerFactory = Arc<dyn Fn() -> Arc<dyn Runner> + Send + Sync>;

/// In-memory mapping from stable handler names to runner constructors.
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    factories: HashMap<String, RunnerFactory>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the handlers this crate ships.
    pub fn with_builtin_runners() -> Self {
        let mut registry = Self::new();
        registry.register("score_request", || Arc::new(ScoreRequestRunner));
        registry.register("median_aggregate", || Arc::new(MedianAggregateRunner));
        registry.register("threshold_gate", || Arc::new(ThresholdGateRunner));
        registry
    }

    /// Store a runner constructor under a stable name. Re-registering a name
    /// replaces the previous constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Runner> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(handler = %name, "registering runner");
        self.factories.insert(name, Arc::new(factory));
    }

    /// Look up and instantiate the runner registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Runner>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| EngineError::UnknownHandler(name.to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered handler names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_runners_are_registered() {
        let registry = RunnerRegistry::with_builtin_runners();
        assert_eq!(
            registry.names(),
            vec!["median_aggregate", "score_request", "threshold_gate"]
        );
        assert!(registry.resolve("median_aggregate").is_ok());
    }

    #[test]
    fn unknown_name_is_a_hard_error() {
        let registry = RunnerRegistry::with_builtin_runners();
        let err = registry.resolve("definitely_not_registered").unwrap_err();
        assert!(matches!(err, EngineError::UnknownHandler(name) if name == "definitely_not_registered"));
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = RunnerRegistry::new();
        registry.register("score_request", || Arc::new(ScoreRequestRunner));
        registry.register("score_request", || Arc::new(ScoreRequestRunner));
        assert_eq!(registry.len(), 1);
    }
}
