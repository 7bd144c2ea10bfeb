//! Garbage collection of dead subgraphs.

mod common;

use serde_json::json;
use taskflow_core::{GarbageCollector, Task, TaskDependency, TaskStatus};

use common::TestHarness;

#[tokio::test]
async fn collects_a_fully_terminal_chain_with_its_edges() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let a = h.create("emit_value", json!({"value": 1.0})).await;
    let b = h.create_with_deps("emit_value", json!({"value": 2.0}), &[a.id]).await;
    h.complete_task(a.id, json!({})).await;
    h.complete_task(b.id, json!({})).await;

    let collected = GarbageCollector::new(h.pool.clone()).collect().await?;

    assert_eq!(collected, 2);
    assert!(Task::find_by_id(&h.pool, a.id).await?.is_none());
    assert!(Task::find_by_id(&h.pool, b.id).await?.is_none());
    assert_eq!(TaskDependency::count(&h.pool).await?, 0);
    Ok(())
}

#[tokio::test]
async fn retains_a_dependency_with_a_pending_dependent() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let a = h.create("emit_value", json!({"value": 1.0})).await;
    let b = h.create_with_deps("emit_value", json!({"value": 2.0}), &[a.id]).await;
    let c = h.create_with_deps("emit_value", json!({"value": 3.0}), &[a.id]).await;
    h.complete_task(a.id, json!({})).await;
    h.complete_task(b.id, json!({})).await;
    // c stays pending, pinning a.

    let collected = GarbageCollector::new(h.pool.clone()).collect().await?;

    assert_eq!(collected, 1);
    assert!(Task::find_by_id(&h.pool, b.id).await?.is_none());
    assert_eq!(h.status(a.id).await, TaskStatus::Completed);
    assert_eq!(h.status(c.id).await, TaskStatus::Pending);

    // Once c finishes, a becomes collectable too.
    h.complete_task(c.id, json!({})).await;
    let collected = GarbageCollector::new(h.pool.clone()).collect().await?;
    assert_eq!(collected, 2);
    assert_eq!(TaskDependency::count(&h.pool).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cancelled_tasks_are_terminal_for_collection_purposes() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let a = h.create("emit_value", json!({"value": 1.0})).await;
    let b = h.create_with_deps("emit_value", json!({"value": 2.0}), &[a.id]).await;
    h.cancel_task(a.id).await;
    h.cancel_task(b.id).await;

    let collected = GarbageCollector::new(h.pool.clone()).collect().await?;

    assert_eq!(collected, 2);
    Ok(())
}

#[tokio::test]
async fn non_terminal_tasks_are_never_collected() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let pending = h.create("emit_value", json!({"value": 1.0})).await;
    let in_progress = h.create("emit_value", json!({"value": 2.0})).await;
    Task::start(&h.pool, in_progress.id).await?;

    let collected = GarbageCollector::new(h.pool.clone()).collect().await?;

    assert_eq!(collected, 0);
    assert_eq!(h.status(pending.id).await, TaskStatus::Pending);
    assert_eq!(h.status(in_progress.id).await, TaskStatus::InProgress);
    Ok(())
}

#[tokio::test]
async fn collection_is_idempotent() -> anyhow::Result<()> {
    let h = TestHarness::new().await;
    let a = h.create("emit_value", json!({"value": 1.0})).await;
    h.complete_task(a.id, json!({})).await;

    let gc = GarbageCollector::new(h.pool.clone());
    assert_eq!(gc.collect().await?, 1);
    assert_eq!(gc.collect().await?, 0);
    Ok(())
}
