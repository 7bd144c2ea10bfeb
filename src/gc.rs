//! # Garbage Collector
//!
//! Reclaims dead subgraphs: a terminal task whose every dependent is also
//! terminal can never be read again, by the scheduler or by any handler's
//! retrieval path, so its row and edges are safe to delete. A terminal task
//! with no dependents is eligible immediately.
//!
//! The eligibility check and the deletion are one SQL statement, so the
//! collector stays correct under concurrent writers; edge deletion cascades
//! through the store's foreign keys.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::Result;

/// On-demand collector for orphaned terminal tasks.
pub struct GarbageCollector {
    pool: SqlitePool,
}

impl GarbageCollector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete every terminal task with no non-terminal dependent. Returns
    /// the number of tasks removed.
    pub async fn collect(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks
             WHERE status IN ('completed', 'cancelled')
               AND NOT EXISTS (
                 SELECT 1
                 FROM task_dependencies d
                 JOIN tasks dependent ON dependent.id = d.dependent_task_id
                 WHERE d.dependency_task_id = tasks.id
                   AND dependent.status NOT IN ('completed', 'cancelled')
               )",
        )
        .execute(&self.pool)
        .await?;

        let collected = result.rows_affected();
        if collected > 0 {
            info!(collected, "garbage collected terminal tasks");
        }
        Ok(collected)
    }
}
