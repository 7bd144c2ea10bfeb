//! # Task
//!
//! The persisted DAG node: one unit of schedulable work with a status, a
//! handler binding and an opaque JSON payload.
//!
//! ## Status writes
//!
//! Every status write is a conditional update naming the states it may move
//! from (`UPDATE … WHERE id = ? AND status = ?`). That makes each transition
//! an atomic compare-and-set against the store: overlapping scheduler
//! invocations race benignly (one wins, the rest see zero rows affected),
//! terminal states are frozen, and `completed_at` is set exactly once.
//!
//! ## Payload discipline
//!
//! The payload is written by two parties: the owning handler (intermediate
//! state, results) and the engine (transition metadata such as the
//! cancellation reason). All writes go through SQLite's `json_patch`, a
//! read-merge-write in a single statement, so unrelated keys are always
//! preserved and no writer can blind-overwrite another. Patches must be
//! JSON objects; anything else would replace the payload wholesale under
//! RFC 7396 semantics, so the writers below reject it up front.

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::Result;

/// Lifecycle states of a task. `Completed` and `Cancelled` are terminal;
/// once reached, no further transition is possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, not yet picked up by the scheduler.
    Pending,
    /// Dispatched; for two-phase handlers this also covers "external work
    /// submitted, result not yet collected".
    InProgress,
    /// Finished successfully.
    Completed,
    /// Cancelled, by propagation, by handler decision, or after a fatal error.
    Cancelled,
}

impl TaskStatus {
    /// Terminal states satisfy dependents and free the task for collection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid task status: {s}")),
        }
    }
}

/// A DAG node in the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    /// Registry key of the handler that owns this task. Immutable once set.
    pub handler_name: String,
    pub status: TaskStatus,
    /// Handler-defined blob: input configuration on creation, result cache
    /// after execution. See the module docs for the merge discipline.
    pub payload: Json<Value>,
    /// Set exactly once, when the task completes.
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// New task for creation. Tasks are always born `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub handler_name: String,
    pub payload: Value,
}

const SELECT_COLUMNS: &str =
    "id, handler_name, status, payload, completed_at, created_at, updated_at";

/// Payload patches must be objects: `json_patch` replaces the whole payload
/// for any other value, which would break the non-destructive merge
/// invariant.
fn ensure_object_patch(patch: &Value) -> Result<()> {
    if patch.is_object() {
        Ok(())
    } else {
        Err(crate::error::EngineError::Configuration(format!(
            "payload patch must be a JSON object, got {patch}"
        )))
    }
}

impl Task {
    /// Insert a new `Pending` task.
    pub async fn create(pool: &SqlitePool, new_task: NewTask) -> Result<Task> {
        let mut tx = pool.begin().await?;
        let task = Self::create_with_transaction(&mut tx, new_task).await?;
        tx.commit().await?;
        Ok(task)
    }

    /// Insert a new `Pending` task within an existing transaction.
    pub async fn create_with_transaction(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        new_task: NewTask,
    ) -> Result<Task> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        let task = sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (id, handler_name, status, payload, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?4)
             RETURNING id, handler_name, status, payload, completed_at, created_at, updated_at",
        )
        .bind(id)
        .bind(&new_task.handler_name)
        .bind(Json(new_task.payload))
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(task)
    }

    /// Flow-builder entry point: create a task together with its dependency
    /// edges, atomically. Every dependency id must reference an existing
    /// task (the store's foreign keys enforce this).
    pub async fn create_with_dependencies(
        pool: &SqlitePool,
        new_task: NewTask,
        dependency_ids: &[Uuid],
    ) -> Result<Task> {
        let mut tx = pool.begin().await?;
        let task = Self::create_with_transaction(&mut tx, new_task).await?;
        for dependency_id in dependency_ids {
            crate::models::dependency::TaskDependency::create_with_transaction(
                &mut tx,
                task.id,
                *dependency_id,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(task)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(task)
    }

    /// All tasks in creation order. Diagnostics and tests only; the
    /// scheduler works from [`Task::find_ready`].
    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks ORDER BY created_at ASC, rowid ASC"
        ))
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// The readiness query driving the scheduler loop: every non-terminal
    /// task none of whose dependencies is non-terminal, in ascending
    /// creation order so batch runs visit tasks deterministically.
    ///
    /// The readiness predicate treats both `completed` and `cancelled`
    /// dependencies as satisfied; cancellation handling is the dispatch
    /// layer's concern, not the query's.
    pub async fn find_ready(pool: &SqlitePool) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks t
             WHERE t.status IN ('pending', 'in_progress')
               AND NOT EXISTS (
                 SELECT 1
                 FROM task_dependencies d
                 JOIN tasks dep ON dep.id = d.dependency_task_id
                 WHERE d.dependent_task_id = t.id
                   AND dep.status NOT IN ('completed', 'cancelled')
               )
             ORDER BY t.created_at ASC, t.rowid ASC"
        ))
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Direct dependencies of a task, in creation order.
    pub async fn dependencies_of(pool: &SqlitePool, id: Uuid) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT t.id, t.handler_name, t.status, t.payload, t.completed_at,
                    t.created_at, t.updated_at
             FROM tasks t
             JOIN task_dependencies d ON d.dependency_task_id = t.id
             WHERE d.dependent_task_id = ?1
             ORDER BY t.created_at ASC, t.rowid ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Direct dependents of a task, in creation order.
    pub async fn dependents_of(pool: &SqlitePool, id: Uuid) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(
            "SELECT t.id, t.handler_name, t.status, t.payload, t.completed_at,
                    t.created_at, t.updated_at
             FROM tasks t
             JOIN task_dependencies d ON d.dependent_task_id = t.id
             WHERE d.dependency_task_id = ?1
             ORDER BY t.created_at ASC, t.rowid ASC",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Tasks still awaiting work (pending or in progress).
    pub async fn count_non_terminal(pool: &SqlitePool) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE status IN ('pending', 'in_progress')",
        )
        .fetch_one(pool)
        .await?;

        Ok(count as u64)
    }

    /// Compare-and-set `pending -> in_progress`. Returns `false` if the task
    /// was no longer pending, which means another invocation already
    /// dispatched it; the task must never be dispatched twice.
    pub async fn start(pool: &SqlitePool, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'in_progress', updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
        )
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Compare-and-set `in_progress -> completed`, merging the object
    /// `patch` into the payload and stamping `completed_at`. Returns
    /// `false` if the task was not in progress.
    pub async fn complete(pool: &SqlitePool, id: Uuid, patch: Value) -> Result<bool> {
        ensure_object_patch(&patch)?;
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'completed',
                 payload = json_patch(payload, ?1),
                 completed_at = ?2,
                 updated_at = ?2
             WHERE id = ?3 AND status = 'in_progress'",
        )
        .bind(Json(patch))
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cancel a task from any non-terminal state, merging the object
    /// `patch` plus a `cancelled_at` stamp into the payload. Returns
    /// `false` if the task was already terminal (cancellation is
    /// idempotent, never destructive).
    pub async fn cancel(pool: &SqlitePool, id: Uuid, patch: Value) -> Result<bool> {
        ensure_object_patch(&patch)?;
        let now = Utc::now();
        let mut patch = patch;
        if let Value::Object(map) = &mut patch {
            map.insert("cancelled_at".to_string(), Value::String(now.to_rfc3339()));
        }

        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'cancelled',
                 payload = json_patch(payload, ?1),
                 updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('completed', 'cancelled')",
        )
        .bind(Json(patch))
        .bind(now.naive_utc())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Non-destructively merge the object `patch` into the payload without
    /// touching the status. This is the only sanctioned way to record
    /// intermediate state (e.g. a correlation id) on a live task.
    pub async fn merge_payload(pool: &SqlitePool, id: Uuid, patch: Value) -> Result<bool> {
        ensure_object_patch(&patch)?;
        let result = sqlx::query(
            "UPDATE tasks SET payload = json_patch(payload, ?1), updated_at = ?2
             WHERE id = ?3",
        )
        .bind(Json(patch))
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Payload field accessor.
    pub fn payload_value(&self, key: &str) -> Option<&Value> {
        self.payload.0.get(key)
    }

    /// Payload field as an `f64`, accepting both numbers and numeric strings.
    pub fn payload_f64(&self, key: &str) -> Option<f64> {
        match self.payload_value(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Payload field as a string slice.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload_value(key).and_then(Value::as_str)
    }
}
