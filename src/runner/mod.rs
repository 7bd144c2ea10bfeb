//! # Runner Contract
//!
//! The capability interface every handler implements, plus the shared
//! dispatch behavior that is identical for every concrete handler:
//! dependency loading, cancellation propagation, readiness re-checking and
//! terminal-state persistence.
//!
//! Handlers signal their outcome through the typed [`Execution`] result
//! rather than by throwing: "finished", "cancelled myself" and "still
//! waiting on external work" are all ordinary values. Genuine failures
//! (configuration defects, store errors) propagate as [`EngineError`] to the
//! scheduler, which records them; nothing here swallows them.

pub mod two_phase;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::models::{Task, TaskDependency, TaskStatus};
use crate::registry::RunnerRegistry;
use crate::runner::two_phase::ExternalFacility;

/// Everything a handler may touch during execution: the task store and the
/// external async facility. Cheap to clone; handlers share no mutable
/// process state through it.
#[derive(Clone)]
pub struct RunnerContext {
    pool: SqlitePool,
    facility: Arc<dyn ExternalFacility>,
}

impl RunnerContext {
    pub fn new(pool: SqlitePool, facility: Arc<dyn ExternalFacility>) -> Self {
        Self { pool, facility }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn facility(&self) -> &Arc<dyn ExternalFacility> {
        &self.facility
    }
}

/// Handler-reported outcome of one execution step.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Work finished; merge the patch into the payload and complete the task.
    Completed(Value),
    /// Business condition not met; merge the patch and cancel the task.
    /// This is how a gate propagates "threshold not met" downstream.
    Cancelled(Value),
    /// External work submitted or still outstanding; leave the task
    /// `in_progress` for a later pass.
    Pending,
}

/// The unit-of-work interface resolved through the [`RunnerRegistry`].
#[async_trait]
pub trait Runner: Send + Sync {
    /// Whether the shared dispatch path should cancel this task when any of
    /// its dependencies is cancelled. Aggregating handlers that work with
    /// whatever succeeded opt out; they must then treat cancelled
    /// dependencies as absent, not as errors.
    fn checks_cancelled_dependencies(&self) -> bool {
        true
    }

    /// First visit: the task has just moved `pending -> in_progress` and all
    /// of its dependencies are terminal.
    async fn execute(&self, ctx: &RunnerContext, task: &Task, deps: &[Task]) -> Result<Execution>;

    /// Revisit of an `in_progress` task, used by two-phase handlers to
    /// collect an external result. The default suits synchronous handlers,
    /// which never stay in progress between passes.
    async fn check_output(
        &self,
        _ctx: &RunnerContext,
        _task: &Task,
        _deps: &[Task],
    ) -> Result<Execution> {
        Ok(Execution::Pending)
    }
}

impl std::fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Runner")
    }
}

/// What one dispatch attempt did to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiationOutcome {
    /// Handler finished; task is now completed.
    Completed,
    /// Task is now cancelled, by propagation or by handler decision.
    Cancelled,
    /// Handler fired external work; task started and stays in progress.
    Submitted,
    /// In-progress revisit found the external result still outstanding.
    Waiting,
    /// A dependency is non-terminal (or another invocation won the start
    /// race); nothing was touched.
    NotReady,
    /// The task was already terminal when visited.
    AlreadyTerminal,
}

/// Shared dispatch path: load, propagate cancellation, re-check readiness,
/// then hand off to the resolved handler and persist its outcome.
///
/// The scheduler only feeds this tasks its readiness query selected, but
/// every check is repeated here against fresh rows; the store is the only
/// source of truth and other invocations may be interleaving.
pub async fn initiate_task(
    ctx: &RunnerContext,
    registry: &RunnerRegistry,
    task_id: Uuid,
) -> Result<InitiationOutcome> {
    let task = Task::find_by_id(ctx.pool(), task_id)
        .await?
        .ok_or(EngineError::TaskNotFound(task_id))?;

    if task.status.is_terminal() {
        debug!(task_id = %task.id, status = %task.status, "task already terminal, nothing to do");
        return Ok(InitiationOutcome::AlreadyTerminal);
    }

    let deps = Task::dependencies_of(ctx.pool(), task.id).await?;

    // Edges and tasks are fetched separately so a dependency row that
    // vanished between the two reads is detected, not silently dropped.
    let edge_ids = TaskDependency::dependency_ids(ctx.pool(), task.id).await?;
    if let Some(missing) = edge_ids.iter().find(|id| !deps.iter().any(|d| d.id == **id)) {
        return Err(EngineError::DependencyNotFound {
            task_id: task.id,
            dependency_id: *missing,
        });
    }

    let runner = registry.resolve(&task.handler_name)?;

    if runner.checks_cancelled_dependencies()
        && deps.iter().any(|d| d.status == TaskStatus::Cancelled)
    {
        debug!(task_id = %task.id, handler = %task.handler_name, "cancelled dependency, propagating");
        Task::cancel(
            ctx.pool(),
            task.id,
            json!({"cancellation_reason": "dependency_cancelled"}),
        )
        .await?;
        return Ok(InitiationOutcome::Cancelled);
    }

    if deps.iter().any(|d| !d.status.is_terminal()) {
        debug!(task_id = %task.id, "dependencies not yet terminal, leaving untouched");
        return Ok(InitiationOutcome::NotReady);
    }

    let (execution, first_visit) = match task.status {
        TaskStatus::Pending => {
            if !Task::start(ctx.pool(), task.id).await? {
                // Another invocation dispatched it first.
                debug!(task_id = %task.id, "lost the start race, skipping");
                return Ok(InitiationOutcome::NotReady);
            }
            let task = Task::find_by_id(ctx.pool(), task.id)
                .await?
                .ok_or(EngineError::TaskNotFound(task.id))?;
            (runner.execute(ctx, &task, &deps).await?, true)
        }
        TaskStatus::InProgress => (runner.check_output(ctx, &task, &deps).await?, false),
        TaskStatus::Completed | TaskStatus::Cancelled => unreachable!("terminal handled above"),
    };

    match execution {
        Execution::Completed(patch) => {
            if !Task::complete(ctx.pool(), task.id, patch).await? {
                warn!(task_id = %task.id, "completion lost a status race, leaving as is");
            }
            Ok(InitiationOutcome::Completed)
        }
        Execution::Cancelled(patch) => {
            Task::cancel(ctx.pool(), task.id, patch).await?;
            Ok(InitiationOutcome::Cancelled)
        }
        Execution::Pending if first_visit => Ok(InitiationOutcome::Submitted),
        Execution::Pending => Ok(InitiationOutcome::Waiting),
    }
}
