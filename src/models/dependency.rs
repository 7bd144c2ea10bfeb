//! # Task Dependency
//!
//! Directed edge `(dependent, dependency)` in the task DAG: the dependent
//! may not start until the dependency reaches a terminal state. Fan-in and
//! fan-out are both unconstrained. The engine performs no cycle detection;
//! the flow builder owns acyclicity, and a cyclic graph starves rather than
//! crashes.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::Result;

/// A directed "must finish before" edge between two tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TaskDependency {
    pub dependent_task_id: Uuid,
    pub dependency_task_id: Uuid,
    pub created_at: NaiveDateTime,
}

impl TaskDependency {
    /// Insert an edge. Both endpoints must exist; the foreign keys reject
    /// anything else.
    pub async fn create(
        pool: &SqlitePool,
        dependent_task_id: Uuid,
        dependency_task_id: Uuid,
    ) -> Result<TaskDependency> {
        let mut tx = pool.begin().await?;
        let edge =
            Self::create_with_transaction(&mut tx, dependent_task_id, dependency_task_id).await?;
        tx.commit().await?;
        Ok(edge)
    }

    /// Insert an edge within an existing transaction.
    pub async fn create_with_transaction(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        dependent_task_id: Uuid,
        dependency_task_id: Uuid,
    ) -> Result<TaskDependency> {
        let edge = sqlx::query_as::<_, TaskDependency>(
            "INSERT INTO task_dependencies (dependent_task_id, dependency_task_id, created_at)
             VALUES (?1, ?2, ?3)
             RETURNING dependent_task_id, dependency_task_id, created_at",
        )
        .bind(dependent_task_id)
        .bind(dependency_task_id)
        .bind(Utc::now().naive_utc())
        .fetch_one(&mut **tx)
        .await?;

        Ok(edge)
    }

    /// Ids of the tasks this task depends on.
    pub async fn dependency_ids(pool: &SqlitePool, dependent_task_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT dependency_task_id FROM task_dependencies
             WHERE dependent_task_id = ?1",
        )
        .bind(dependent_task_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }

    /// Ids of the tasks depending on this task.
    pub async fn dependent_ids(pool: &SqlitePool, dependency_task_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT dependent_task_id FROM task_dependencies
             WHERE dependency_task_id = ?1",
        )
        .bind(dependency_task_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }

    /// Total edge count. Diagnostics and tests.
    pub async fn count(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_dependencies")
            .fetch_one(pool)
            .await?;

        Ok(count as u64)
    }
}
