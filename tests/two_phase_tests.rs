//! Two-phase execution: submit/collect, idempotent retrieval, and the
//! aggregation and gating policies built on top of it.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskflow_core::runner::two_phase::{self, FetchOutcome};
use taskflow_core::{
    database, EngineError, ExternalFacility, Result, RunnerRegistry, Scheduler, TaskStatus,
};

use common::TestHarness;

#[tokio::test]
async fn score_request_submits_then_collects_on_a_later_run() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let score = h.create("score_request", json!({"input": "essay"})).await;

    let summary = h.scheduler().run_batch().await?;
    assert_eq!(summary.executed, 1);

    // Fire phase: the task stays in progress with a persisted correlation id
    // and exactly one submission on the facility.
    let task = h.task(score.id).await;
    assert_eq!(task.status, TaskStatus::InProgress);
    let cid = task.payload_str("correlation_id").unwrap().to_string();
    assert_eq!(h.facility.submitted_ids(), vec![cid.clone()]);

    // Re-running before the external work finishes changes nothing and does
    // not resubmit.
    h.scheduler().run_batch().await?;
    assert_eq!(h.facility.submission_count(), 1);
    assert_eq!(h.status(score.id).await, TaskStatus::InProgress);

    // Collect phase.
    h.facility.complete(&cid, json!({"value": 0.7}));
    let summary = h.scheduler().run_batch().await?;
    assert_eq!(summary.executed, 1);

    let task = h.task(score.id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.payload_f64("value"), Some(0.7));
    assert_eq!(h.facility.submission_count(), 1);
    Ok(())
}

#[tokio::test]
async fn retrieval_is_a_repeatable_read() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let score = h.create("score_request", json!({"input": "essay"})).await;
    h.scheduler().run_batch().await?;

    let cid = h.task(score.id).await.payload_str("correlation_id").unwrap().to_string();
    h.facility.complete(&cid, json!({"value": 0.9}));

    let ctx = h.context();
    let first = two_phase::get_result(&ctx, &cid).await?;
    let second = two_phase::get_result(&ctx, &cid).await?;
    assert_eq!(first, second);
    assert_eq!(first, json!({"value": 0.9}));
    assert_eq!(h.facility.submission_count(), 1);
    Ok(())
}

#[tokio::test]
async fn median_reads_upstream_results_through_correlation_ids() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let s1 = h.create("score_request", json!({"input": "a"})).await;
    let s2 = h.create("score_request", json!({"input": "b"})).await;
    let agg = h
        .create_with_deps("median_aggregate", json!({}), &[s1.id, s2.id])
        .await;

    h.scheduler().run_batch().await?;
    for cid_value in [(s1.id, json!(1.0)), (s2.id, json!(3.0))] {
        let cid = h.task(cid_value.0).await.payload_str("correlation_id").unwrap().to_string();
        h.facility.complete(&cid, cid_value.1);
    }

    h.scheduler().run_batch().await?;

    let agg = h.task(agg.id).await;
    assert_eq!(agg.status, TaskStatus::Completed);
    assert_eq!(agg.payload_f64("median"), Some(2.0));
    // Aggregation retrieves; it never resubmits.
    assert_eq!(h.facility.submission_count(), 2);
    Ok(())
}

#[tokio::test]
async fn median_of_three_values() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let mut deps = Vec::new();
    for value in [3.0, 1.0, 2.0] {
        deps.push(h.create("emit_value", json!({"value": value})).await.id);
    }
    let agg = h.create_with_deps("median_aggregate", json!({}), &deps).await;

    h.scheduler().run_batch().await?;

    assert_eq!(h.task(agg.id).await.payload_f64("median"), Some(2.0));
    Ok(())
}

#[tokio::test]
async fn median_tolerates_cancelled_and_invalid_contributors() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let good = h.create("emit_value", json!({"value": 5.0})).await;
    let cancelled = h.create("emit_value", json!({"value": 9.0})).await;
    h.cancel_task(cancelled.id).await;
    // Completed dependency with no numeric contribution at all.
    let invalid = h.create("emit_value", json!({})).await;
    let agg = h
        .create_with_deps("median_aggregate", json!({}), &[good.id, cancelled.id, invalid.id])
        .await;
    h.complete_task(invalid.id, json!({"note": "no number here"})).await;

    let summary = h.scheduler().run_batch().await?;

    // The aggregator opted out of cancellation checking and skipped the
    // unusable contributors; partial data still produced a result.
    let agg = h.task(agg.id).await;
    assert_eq!(agg.status, TaskStatus::Completed);
    assert_eq!(agg.payload_f64("median"), Some(5.0));
    assert_eq!(summary.failed, 0);
    Ok(())
}

#[tokio::test]
async fn median_of_entirely_cancelled_inputs_is_zero() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let a = h.create("emit_value", json!({"value": 1.0})).await;
    let b = h.create("emit_value", json!({"value": 2.0})).await;
    h.cancel_task(a.id).await;
    h.cancel_task(b.id).await;
    let agg = h.create_with_deps("median_aggregate", json!({}), &[a.id, b.id]).await;

    h.scheduler().run_batch().await?;

    let agg = h.task(agg.id).await;
    assert_eq!(agg.status, TaskStatus::Completed);
    assert_eq!(agg.payload_f64("median"), Some(0.0));
    Ok(())
}

#[tokio::test]
async fn threshold_gate_below_threshold_cancels_itself_and_downstream() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let upstream = h.create("emit_value", json!({"value": 1e-12})).await;
    let gate = h
        .create_with_deps("threshold_gate", json!({"threshold": 1e-11}), &[upstream.id])
        .await;
    let downstream = h.create_with_deps("tracked", json!({}), &[gate.id]).await;

    h.scheduler().run_batch().await?;

    let gate = h.task(gate.id).await;
    assert_eq!(gate.status, TaskStatus::Cancelled);
    assert_eq!(gate.payload_value("exceeds_threshold"), Some(&json!(false)));
    assert_eq!(gate.payload_str("cancellation_reason"), Some("threshold_not_met"));

    // The gate decision propagates as ordinary cancellation.
    assert_eq!(h.status(downstream.id).await, TaskStatus::Cancelled);
    assert!(h.executed.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn threshold_gate_above_threshold_completes() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let upstream = h.create("emit_value", json!({"value": 1e-10})).await;
    let gate = h
        .create_with_deps("threshold_gate", json!({"threshold": 1e-11}), &[upstream.id])
        .await;

    h.scheduler().run_batch().await?;

    let gate = h.task(gate.id).await;
    assert_eq!(gate.status, TaskStatus::Completed);
    assert_eq!(gate.payload_value("exceeds_threshold"), Some(&json!(true)));
    assert_eq!(gate.payload_f64("value"), Some(1e-10));
    Ok(())
}

#[tokio::test]
async fn threshold_gate_without_threshold_is_a_configuration_failure() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let upstream = h.create("emit_value", json!({"value": 1.0})).await;
    let gate = h
        .create_with_deps("threshold_gate", json!({}), &[upstream.id])
        .await;

    let summary = h.scheduler().run_batch().await?;

    assert_eq!(h.status(gate.id).await, TaskStatus::Cancelled);
    assert_eq!(summary.failed, 1);
    Ok(())
}

/// Facility whose submissions always fail, exercising the external-error
/// path: the handler surfaces the error and the scheduler fails the task.
struct FailingFacility;

#[async_trait]
impl ExternalFacility for FailingFacility {
    async fn submit(&self, _correlation_id: &str, _body: Value) -> Result<()> {
        Err(EngineError::External("batch facility unavailable".into()))
    }

    async fn fetch(&self, _correlation_id: &str) -> Result<FetchOutcome> {
        Ok(FetchOutcome::NotReady)
    }
}

#[tokio::test]
async fn submission_failure_fails_the_task() -> anyhow::Result<()> {
    let pool = database::connect_in_memory().await?;
    let registry = Arc::new(RunnerRegistry::with_builtin_runners());
    let scheduler = Scheduler::new(pool.clone(), registry, Arc::new(FailingFacility));

    let score = taskflow_core::Task::create(
        &pool,
        taskflow_core::NewTask {
            handler_name: "score_request".into(),
            payload: json!({"input": "essay"}),
        },
    )
    .await?;

    let summary = scheduler.run_batch().await?;

    assert_eq!(summary.failed, 1);
    let score = taskflow_core::Task::find_by_id(&pool, score.id).await?.unwrap();
    assert_eq!(score.status, TaskStatus::Cancelled);
    assert!(score.payload_str("error").is_some());
    Ok(())
}
