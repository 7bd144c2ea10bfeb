//! Two-phase scoring handler: submits a batch-inference request and
//! collects the numeric score on a later pass.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::models::Task;
use crate::runner::{two_phase, Execution, Runner, RunnerContext};
use crate::runners::parse_numeric;

/// Fires an external scoring request built from the task's `input` payload
/// field; completes with `{"value": score}` once the facility has produced
/// an output.
pub struct ScoreRequestRunner;

fn request_body(task: &Task) -> Value {
    json!({
        "task_id": task.id,
        "input": task.payload_value("input").cloned().unwrap_or(Value::Null),
    })
}

#[async_trait]
impl Runner for ScoreRequestRunner {
    async fn execute(&self, ctx: &RunnerContext, task: &Task, _deps: &[Task]) -> Result<Execution> {
        two_phase::begin(ctx, task, request_body(task)).await
    }

    async fn check_output(
        &self,
        ctx: &RunnerContext,
        task: &Task,
        _deps: &[Task],
    ) -> Result<Execution> {
        let Some(cid) = two_phase::correlation_id(task) else {
            // The task started but no correlation id was persisted, so the
            // request was never recorded as fired. Resubmission is safe
            // under the facility's at-least-once contract.
            warn!(task_id = %task.id, "in-progress score request without correlation id, resubmitting");
            return two_phase::begin(ctx, task, request_body(task)).await;
        };

        match two_phase::get_result(ctx, cid).await {
            Ok(output) => {
                let value = parse_numeric(&output).ok_or_else(|| {
                    EngineError::External(format!(
                        "unparsable facility output for correlation id {cid}"
                    ))
                })?;
                Ok(Execution::Completed(json!({"value": value})))
            }
            Err(err) if err.is_not_ready() => Ok(Execution::Pending),
            Err(err) => Err(err),
        }
    }
}
