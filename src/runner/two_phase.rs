//! # Two-Phase Execution
//!
//! Submit-then-later-retrieve support for handlers whose unit of work runs
//! on an external batch facility (e.g. batch inference). The contract:
//!
//! 1. `begin` generates a fresh correlation id, persists it into the task
//!    payload **before** submitting, then fires the request and leaves the
//!    task in progress. Persist-before-submit keeps the facility
//!    at-least-once safe: a crash between the two steps resubmits under the
//!    same id.
//! 2. `get_result` retrieves by correlation id. It is a repeatable read of a
//!    stored result, never a consume-once operation; downstream handlers
//!    read an upstream task's correlation id out of its payload and call it
//!    themselves instead of re-deriving the value.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::Task;
use crate::runner::{Execution, RunnerContext};

/// Payload key under which a task stores its external correlation id.
pub const CORRELATION_ID_KEY: &str = "correlation_id";

/// Result of polling the external facility for one correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The output exists and can be fetched again any number of times.
    Ready(Value),
    /// The external work has not produced an output yet.
    NotReady,
}

/// The external asynchronous batch facility, seen from the engine. The
/// engine treats it as at-least-once: duplicate submissions under one
/// correlation id must be tolerated on the far side.
#[async_trait]
pub trait ExternalFacility: Send + Sync {
    async fn submit(&self, correlation_id: &str, body: Value) -> Result<()>;
    async fn fetch(&self, correlation_id: &str) -> Result<FetchOutcome>;
}

/// Read a task's correlation id, if one was recorded.
pub fn correlation_id(task: &Task) -> Option<&str> {
    task.payload_str(CORRELATION_ID_KEY)
}

/// Fire-phase helper: persist a fresh correlation id, submit the request,
/// leave the task in progress. If the task already carries a correlation id
/// the submission happened on an earlier pass and nothing is re-fired.
pub async fn begin(ctx: &RunnerContext, task: &Task, body: Value) -> Result<Execution> {
    if let Some(existing) = correlation_id(task) {
        debug!(task_id = %task.id, correlation_id = %existing, "request already submitted");
        return Ok(Execution::Pending);
    }

    let correlation_id = Uuid::new_v4().to_string();
    Task::merge_payload(
        ctx.pool(),
        task.id,
        json!({"correlation_id": correlation_id}),
    )
    .await?;

    ctx.facility().submit(&correlation_id, body).await?;
    debug!(task_id = %task.id, correlation_id = %correlation_id, "external request submitted");

    Ok(Execution::Pending)
}

/// Collect-phase helper: fetch the external output for a correlation id.
/// Returns [`EngineError::ResultNotReady`] while the output does not exist;
/// callers on the scheduling path treat that as "try again later".
pub async fn get_result(ctx: &RunnerContext, correlation_id: &str) -> Result<Value> {
    match ctx.facility().fetch(correlation_id).await? {
        FetchOutcome::Ready(output) => Ok(output),
        FetchOutcome::NotReady => Err(EngineError::ResultNotReady(correlation_id.to_string())),
    }
}

/// In-memory facility for tests, demos and local development. Records every
/// submission so idempotency is assertable, and hands back results marked
/// ready via [`InMemoryFacility::complete`].
#[derive(Default)]
pub struct InMemoryFacility {
    inner: RwLock<FacilityState>,
}

#[derive(Default)]
struct FacilityState {
    submissions: Vec<(String, Value)>,
    results: HashMap<String, Value>,
}

impl InMemoryFacility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the external work for `correlation_id` as finished.
    pub fn complete(&self, correlation_id: &str, output: Value) {
        self.inner
            .write()
            .results
            .insert(correlation_id.to_string(), output);
    }

    pub fn submission_count(&self) -> usize {
        self.inner.read().submissions.len()
    }

    /// Correlation ids submitted so far, in submission order.
    pub fn submitted_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .submissions
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl ExternalFacility for InMemoryFacility {
    async fn submit(&self, correlation_id: &str, body: Value) -> Result<()> {
        self.inner
            .write()
            .submissions
            .push((correlation_id.to_string(), body));
        Ok(())
    }

    async fn fetch(&self, correlation_id: &str) -> Result<FetchOutcome> {
        Ok(match self.inner.read().results.get(correlation_id) {
            Some(output) => FetchOutcome::Ready(output.clone()),
            None => FetchOutcome::NotReady,
        })
    }
}
