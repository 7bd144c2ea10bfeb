//! # Shipped Runners
//!
//! The concrete handlers registered by
//! [`RunnerRegistry::with_builtin_runners`](crate::registry::RunnerRegistry::with_builtin_runners):
//! the two-phase scoring submitter, the median aggregator and the threshold
//! gate. Together they cover the evaluation-pipeline shapes the engine is
//! built for; business flows register additional handlers alongside them.

pub mod median_aggregate;
pub mod score_request;
pub mod threshold_gate;

pub use median_aggregate::MedianAggregateRunner;
pub use score_request::ScoreRequestRunner;
pub use threshold_gate::ThresholdGateRunner;

use serde_json::Value;
use tracing::warn;

use crate::models::Task;
use crate::runner::{two_phase, RunnerContext};

/// Interpret a facility output or recorded result as a number. Accepts a
/// bare number, a numeric string, or an object carrying `value` or `score`.
pub(crate) fn parse_numeric(output: &Value) -> Option<f64> {
    match output {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("score"))
            .and_then(Value::as_f64),
        _ => None,
    }
}

/// A dependency's numeric contribution.
///
/// If the dependency carries a correlation id its output is read back
/// through the two-phase retrieval path (the payload is the result cache;
/// the value is never re-derived). Otherwise the recorded result keys are
/// consulted. Anything missing or unparsable is logged as a warning and
/// yields `None` — one bad contribution never fails the caller by itself.
pub(crate) async fn dependency_value(ctx: &RunnerContext, dep: &Task) -> Option<f64> {
    if let Some(cid) = two_phase::correlation_id(dep) {
        match two_phase::get_result(ctx, cid).await {
            Ok(output) => match parse_numeric(&output) {
                Some(value) => return Some(value),
                None => warn!(
                    dependency_id = %dep.id,
                    correlation_id = %cid,
                    "unparsable facility output, falling back to recorded payload"
                ),
            },
            Err(err) => warn!(
                dependency_id = %dep.id,
                correlation_id = %cid,
                error = %err,
                "retrieval failed, falling back to recorded payload"
            ),
        }
    }

    for key in ["value", "median", "score"] {
        if let Some(value) = dep.payload_f64(key) {
            return Some(value);
        }
    }

    warn!(
        dependency_id = %dep.id,
        handler = %dep.handler_name,
        "dependency has no numeric contribution, skipping"
    );
    None
}
