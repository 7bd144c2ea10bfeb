//! # Scheduler
//!
//! The readiness loop and dispatcher. One [`Scheduler::run_batch`] call
//! drives the task store to a fixed point: each pass asks the store for
//! every task whose dependencies are all terminal, dispatches them in
//! ascending creation order, and repeats until a pass changes nothing —
//! completing one task may unblock siblings in the same generation, so a
//! single pass is never enough.
//!
//! Handler failures are recorded, not rethrown: the failing task is
//! cancelled with error metadata and counted in the run summary, which is
//! the only feedback surface of a batch run.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::Task;
use crate::registry::RunnerRegistry;
use crate::runner::two_phase::ExternalFacility;
use crate::runner::{initiate_task, InitiationOutcome, RunnerContext};

/// Aggregate outcome of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks whose handler ran: completed synchronously or fired external
    /// work.
    pub executed: usize,
    /// Tasks cancelled by propagation or handler decision.
    pub cancelled: usize,
    /// Tasks cancelled because their handler returned an error.
    pub failed: usize,
    /// Tasks still blocked (non-terminal) when the run reached its fixed
    /// point — awaiting external results or upstream work.
    pub skipped: usize,
    /// Readiness passes performed, including the final no-change pass.
    pub passes: usize,
}

/// Single logical scheduling process over a shared task store. Safe to
/// overlap with other invocations: every transition it performs is a
/// compare-and-set, so a lost race is a skip, never a double dispatch.
pub struct Scheduler {
    ctx: RunnerContext,
    registry: Arc<RunnerRegistry>,
    max_passes: usize,
}

impl Scheduler {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<RunnerRegistry>,
        facility: Arc<dyn ExternalFacility>,
    ) -> Self {
        Self::with_config(pool, registry, facility, &EngineConfig::default())
    }

    pub fn with_config(
        pool: SqlitePool,
        registry: Arc<RunnerRegistry>,
        facility: Arc<dyn ExternalFacility>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            ctx: RunnerContext::new(pool, facility),
            registry,
            max_passes: config.max_passes,
        }
    }

    /// Run the readiness loop to quiescence and return the summary.
    ///
    /// Determinism: tasks are visited sequentially in the store's readiness
    /// order (ascending creation), so two runs over identical snapshots with
    /// identical handler behavior visit tasks in the same order and reach
    /// the same final statuses.
    pub async fn run_batch(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        loop {
            summary.passes += 1;
            let ready = Task::find_ready(self.ctx.pool()).await?;
            debug!(pass = summary.passes, ready = ready.len(), "readiness pass");

            let mut changed = 0usize;
            for task in ready {
                match initiate_task(&self.ctx, &self.registry, task.id).await {
                    Ok(InitiationOutcome::Completed) | Ok(InitiationOutcome::Submitted) => {
                        summary.executed += 1;
                        changed += 1;
                    }
                    Ok(InitiationOutcome::Cancelled) => {
                        summary.cancelled += 1;
                        changed += 1;
                    }
                    Ok(InitiationOutcome::Waiting)
                    | Ok(InitiationOutcome::NotReady)
                    | Ok(InitiationOutcome::AlreadyTerminal) => {}
                    Err(err) if err.is_not_ready() => {
                        // A two-phase handler surfaced "no output yet" raw;
                        // the task stays in progress for a later run.
                        debug!(task_id = %task.id, "external output not ready");
                    }
                    Err(err) => {
                        error!(
                            task_id = %task.id,
                            handler = %task.handler_name,
                            error = %err,
                            "handler failed, cancelling task"
                        );
                        Task::cancel(
                            self.ctx.pool(),
                            task.id,
                            json!({
                                "cancellation_reason": "error",
                                "error": err.to_string(),
                            }),
                        )
                        .await?;
                        summary.failed += 1;
                        changed += 1;
                    }
                }
            }

            if changed == 0 {
                break;
            }
            if summary.passes >= self.max_passes {
                warn!(
                    passes = summary.passes,
                    "pass cap reached before fixed point, stopping batch run"
                );
                break;
            }
        }

        summary.skipped = Task::count_non_terminal(self.ctx.pool()).await? as usize;

        info!(
            executed = summary.executed,
            cancelled = summary.cancelled,
            failed = summary.failed,
            skipped = summary.skipped,
            passes = summary.passes,
            "batch run reached fixed point"
        );

        Ok(summary)
    }

    /// Execution context handed to runners; exposed for flows that need to
    /// pre-warm or inspect the store with the scheduler's own handles.
    pub fn context(&self) -> &RunnerContext {
        &self.ctx
    }
}
