//! Shared fixtures for the integration suite: an in-memory store, a
//! registry carrying the builtin runners plus a couple of test handlers,
//! and the in-memory external facility.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use taskflow_core::{
    database, EngineError, Execution, InMemoryFacility, NewTask, Result, Runner, RunnerContext,
    RunnerRegistry, Scheduler, Task, TaskStatus,
};

/// Synchronous handler completing with the `value` from its own payload.
/// A missing or non-numeric `value` is a configuration error, which also
/// makes this the fixture for the fatal-failure path.
pub struct EmitValueRunner;

#[async_trait]
impl Runner for EmitValueRunner {
    async fn execute(&self, _ctx: &RunnerContext, task: &Task, _deps: &[Task]) -> Result<Execution> {
        let value = task.payload_f64("value").ok_or_else(|| {
            EngineError::Configuration(format!(
                "emit_value task {} is missing a numeric `value` payload field",
                task.id
            ))
        })?;
        Ok(Execution::Completed(json!({"value": value})))
    }
}

/// Handler recording every invocation, so tests can prove a handler did or
/// did not run and in which order.
pub struct TrackedRunner {
    log: Arc<Mutex<Vec<Uuid>>>,
}

#[async_trait]
impl Runner for TrackedRunner {
    async fn execute(&self, _ctx: &RunnerContext, task: &Task, _deps: &[Task]) -> Result<Execution> {
        self.log.lock().push(task.id);
        let value = task.payload_f64("value").unwrap_or(1.0);
        Ok(Execution::Completed(json!({"value": value})))
    }
}

pub struct TestHarness {
    pub pool: SqlitePool,
    pub registry: Arc<RunnerRegistry>,
    pub facility: Arc<InMemoryFacility>,
    /// Invocation log of the `tracked` handler.
    pub executed: Arc<Mutex<Vec<Uuid>>>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let pool = database::connect_in_memory().await.expect("in-memory store");
        let executed: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(Vec::new()));

        let mut registry = RunnerRegistry::with_builtin_runners();
        registry.register("emit_value", || Arc::new(EmitValueRunner));
        let log = executed.clone();
        registry.register("tracked", move || {
            Arc::new(TrackedRunner { log: log.clone() })
        });

        Self {
            pool,
            registry: Arc::new(registry),
            facility: Arc::new(InMemoryFacility::new()),
            executed,
        }
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(
            self.pool.clone(),
            self.registry.clone(),
            self.facility.clone(),
        )
    }

    pub fn context(&self) -> RunnerContext {
        RunnerContext::new(self.pool.clone(), self.facility.clone())
    }

    pub async fn create(&self, handler: &str, payload: Value) -> Task {
        Task::create(
            &self.pool,
            NewTask {
                handler_name: handler.to_string(),
                payload,
            },
        )
        .await
        .expect("create task")
    }

    pub async fn create_with_deps(&self, handler: &str, payload: Value, deps: &[Uuid]) -> Task {
        Task::create_with_dependencies(
            &self.pool,
            NewTask {
                handler_name: handler.to_string(),
                payload,
            },
            deps,
        )
        .await
        .expect("create task with dependencies")
    }

    /// Drive a task straight to `completed` through the ordinary lifecycle.
    pub async fn complete_task(&self, id: Uuid, patch: Value) {
        assert!(Task::start(&self.pool, id).await.expect("start"));
        assert!(Task::complete(&self.pool, id, patch).await.expect("complete"));
    }

    pub async fn cancel_task(&self, id: Uuid) {
        assert!(Task::cancel(&self.pool, id, json!({})).await.expect("cancel"));
    }

    pub async fn task(&self, id: Uuid) -> Task {
        Task::find_by_id(&self.pool, id)
            .await
            .expect("find task")
            .expect("task exists")
    }

    pub async fn status(&self, id: Uuid) -> TaskStatus {
        self.task(id).await.status
    }
}
