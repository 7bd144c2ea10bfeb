//! Idempotent schema setup for the task store.
//!
//! Two relations: `tasks` (DAG nodes) and `task_dependencies` (directed
//! edges). Both dependency columns cascade on task deletion so no edge can
//! ever dangle.

use sqlx::SqlitePool;

use crate::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id BLOB PRIMARY KEY,
        handler_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        payload TEXT NOT NULL DEFAULT '{}',
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_dependencies (
        dependent_task_id BLOB NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        dependency_task_id BLOB NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        PRIMARY KEY (dependent_task_id, dependency_task_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)",
    "CREATE INDEX IF NOT EXISTS idx_task_dependencies_dependency
        ON task_dependencies(dependency_task_id)",
];

/// Apply the schema. Every statement is `IF NOT EXISTS`, so this is safe to
/// run on every startup.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
