//! Threshold gate: passes or cancels a pipeline branch based on one
//! upstream numeric value.
//!
//! "Threshold not met" is encoded as self-cancellation rather than
//! completed-with-false, so the decision propagates to everything depending
//! on the gate through the ordinary cancellation machinery; no second
//! signal exists.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::models::{Task, TaskStatus};
use crate::runner::{Execution, Runner, RunnerContext};
use crate::runners::dependency_value;

/// Compares the first usable upstream value against the gate's own
/// `threshold` payload field. Strictly greater completes with
/// `{"exceeds_threshold": true}`; anything else cancels the gate.
pub struct ThresholdGateRunner;

#[async_trait]
impl Runner for ThresholdGateRunner {
    async fn execute(&self, ctx: &RunnerContext, task: &Task, deps: &[Task]) -> Result<Execution> {
        let threshold = task.payload_f64("threshold").ok_or_else(|| {
            EngineError::Configuration(format!(
                "threshold_gate task {} is missing a numeric `threshold` payload field",
                task.id
            ))
        })?;

        let mut upstream = None;
        for dep in deps {
            if dep.status == TaskStatus::Cancelled {
                continue;
            }
            if let Some(value) = dependency_value(ctx, dep).await {
                upstream = Some(value);
                break;
            }
        }
        let value = upstream.ok_or_else(|| {
            EngineError::DependencyData(format!(
                "threshold_gate task {} has no usable upstream value",
                task.id
            ))
        })?;

        debug!(task_id = %task.id, value, threshold, "evaluating threshold gate");

        if value > threshold {
            Ok(Execution::Completed(
                json!({"exceeds_threshold": true, "value": value}),
            ))
        } else {
            Ok(Execution::Cancelled(json!({
                "exceeds_threshold": false,
                "value": value,
                "cancellation_reason": "threshold_not_met",
            })))
        }
    }
}
