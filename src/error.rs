//! # Structured Error Handling
//!
//! Error taxonomy for the execution engine. The variants map to the failure
//! classes the scheduler cares about:
//!
//! - **Configuration** errors (`UnknownHandler`, `Configuration`) are fatal
//!   for the owning task and never retried — they indicate a deployment
//!   defect, not a transient condition.
//! - **Dependency data** errors are recoverable locally (a handler drops the
//!   one bad contribution) and only escalate when a handler requires at
//!   least one valid contributor.
//! - **`ResultNotReady`** is the distinguished "not yet" kind used by the
//!   two-phase retrieval path. It is control flow, not failure: the
//!   scheduler counts it as a skip and revisits on a later pass.

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("dependency {dependency_id} of task {task_id} not found")]
    DependencyNotFound { task_id: Uuid, dependency_id: Uuid },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dependency data error: {0}")]
    DependencyData(String),

    #[error("external facility error: {0}")]
    External(String),

    #[error("no result yet for correlation id {0}")]
    ResultNotReady(String),
}

impl EngineError {
    /// True for the two-phase "output does not exist yet" kind, which the
    /// scheduler must treat as a skip rather than a task failure.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::ResultNotReady(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
