//! Engine configuration with environment variable overrides.

use crate::error::{EngineError, Result};

/// Runtime configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Connection string for the task store.
    pub database_url: String,
    /// Maximum connections held by the store pool.
    pub max_connections: u32,
    /// Upper bound on readiness-loop passes per batch run. The loop normally
    /// stops at its fixed point well before this; the cap only guards
    /// against pathological graphs.
    pub max_passes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            max_passes: 100,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        let database_url =
            std::env::var("TASKFLOW_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"));
        if let Ok(url) = database_url {
            config.database_url = url;
        }

        if let Ok(max_connections) = std::env::var("TASKFLOW_MAX_CONNECTIONS") {
            config.max_connections = max_connections.parse().map_err(|e| {
                EngineError::Configuration(format!("invalid TASKFLOW_MAX_CONNECTIONS: {e}"))
            })?;
        }

        if let Ok(max_passes) = std::env::var("TASKFLOW_MAX_PASSES") {
            config.max_passes = max_passes.parse().map_err(|e| {
                EngineError::Configuration(format!("invalid TASKFLOW_MAX_PASSES: {e}"))
            })?;
        }

        Ok(config)
    }
}
