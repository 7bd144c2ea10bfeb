//! Median aggregation over dependency scores.
//!
//! This handler opts out of cancellation checking: its semantics are
//! "aggregate whatever succeeded", so cancelled dependencies are treated as
//! absent and partial data still produces a result instead of cascading
//! cancellation.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::models::{Task, TaskStatus};
use crate::runner::{Execution, Runner, RunnerContext};
use crate::runners::dependency_value;

/// Completes with `{"median": m}` over every usable dependency value.
pub struct MedianAggregateRunner;

/// Standard even/odd median after ascending sort; the empty set is defined
/// as 0, not an error.
pub fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[async_trait]
impl Runner for MedianAggregateRunner {
    fn checks_cancelled_dependencies(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &RunnerContext, task: &Task, deps: &[Task]) -> Result<Execution> {
        let mut values = Vec::with_capacity(deps.len());
        for dep in deps {
            if dep.status == TaskStatus::Cancelled {
                continue;
            }
            if let Some(value) = dependency_value(ctx, dep).await {
                values.push(value);
            }
        }

        let contributions = values.len();
        let median = median(values);
        debug!(task_id = %task.id, contributions, median, "aggregated dependency scores");

        Ok(Execution::Completed(json!({"median": median})))
    }
}
