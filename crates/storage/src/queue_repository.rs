//! Generation Queue (C5) storage: durable task store, atomic lease, sweeper, backoff.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{GenerationTask, TaskStatus, TaskType};

use crate::StorageError;

#[derive(Clone)]
pub struct QueueRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct GenerationTaskRow {
    task_id: Uuid,
    task_type: String,
    student_id: Uuid,
    module_id: Uuid,
    payload: serde_json::Value,
    priority: i32,
    status: String,
    attempts: i32,
    max_attempts: i32,
    lease_expires_at: Option<DateTime<Utc>>,
    available_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

fn task_type_str(t: TaskType) -> &'static str {
    match t {
        TaskType::Generate => "generate",
        TaskType::Update => "update",
        TaskType::Enhance => "enhance",
        TaskType::SyncContentChange => "sync_content_change",
    }
}

fn parse_task_type(s: &str) -> TaskType {
    match s {
        "update" => TaskType::Update,
        "enhance" => TaskType::Enhance,
        "sync_content_change" => TaskType::SyncContentChange,
        _ => TaskType::Generate,
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "processing" => TaskStatus::Processing,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

impl From<GenerationTaskRow> for GenerationTask {
    fn from(row: GenerationTaskRow) -> Self {
        GenerationTask {
            task_id: row.task_id,
            task_type: parse_task_type(&row.task_type),
            student_id: row.student_id,
            module_id: row.module_id,
            payload: row.payload,
            priority: row.priority,
            status: parse_task_status(&row.status),
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            lease_expires_at: row.lease_expires_at,
            available_at: row.available_at,
            last_error: row.last_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

const TASK_COLUMNS: &str = r#"task_id, task_type, student_id, module_id, payload, priority, status,
       attempts, max_attempts, lease_expires_at, available_at, last_error,
       created_at, started_at, completed_at"#;

impl QueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueues a task. The dedup partial unique index on `(task_type,
    /// student_id, module_id, payload_fingerprint)` collapses a concurrent
    /// duplicate enqueue into a `StorageError::DuplicateKey`, which callers
    /// treat as "already queued" rather than an error (§4.5).
    pub async fn enqueue(
        &self,
        task_type: TaskType,
        student_id: Uuid,
        module_id: Uuid,
        payload: serde_json::Value,
        payload_fingerprint: &str,
        priority: i32,
        max_attempts: i32,
    ) -> Result<GenerationTask, StorageError> {
        let row = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            r#"
            INSERT INTO generation_tasks
                (task_id, task_type, student_id, module_id, payload, payload_fingerprint, priority, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(task_type_str(task_type))
        .bind(student_id)
        .bind(module_id)
        .bind(payload)
        .bind(payload_fingerprint)
        .bind(priority)
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<GenerationTask>, StorageError> {
        let row = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM generation_tasks WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Atomically claims the highest-priority, oldest eligible pending task
    /// and marks it `processing` with a lease expiring `lease_seconds` from
    /// now. `FOR UPDATE SKIP LOCKED` lets concurrent workers race without
    /// blocking each other on the same row.
    pub async fn lease_next(&self, lease_seconds: i64) -> Result<Option<GenerationTask>, StorageError> {
        let row = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'processing',
                attempts = attempts + 1,
                lease_expires_at = now() + make_interval(secs => $1),
                started_at = COALESCE(started_at, now())
            WHERE task_id = (
                SELECT task_id FROM generation_tasks
                WHERE status = 'pending' AND (available_at IS NULL OR available_at <= now())
                ORDER BY priority ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(lease_seconds as f64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn complete(&self, task_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE generation_tasks SET status = 'completed', completed_at = now(), lease_expires_at = NULL WHERE task_id = $1",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn cancel(&self, task_id: Uuid) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE generation_tasks SET status = 'cancelled', completed_at = now(), lease_expires_at = NULL WHERE task_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Requeues a failed/expired-lease task for retry, stamping `available_at`
    /// with the caller-computed backoff delay, or marks it permanently
    /// `failed` once `attempts >= max_attempts`.
    pub async fn requeue_or_fail(
        &self,
        task_id: Uuid,
        error: &str,
        available_at: DateTime<Utc>,
    ) -> Result<GenerationTask, StorageError> {
        let row = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                last_error = $2,
                lease_expires_at = NULL,
                available_at = CASE WHEN attempts >= max_attempts THEN available_at ELSE $3 END,
                completed_at = CASE WHEN attempts >= max_attempts THEN now() ELSE completed_at END
            WHERE task_id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(error)
        .bind(available_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("generation task {task_id}")))?;

        Ok(row.into())
    }

    /// Reclaims tasks whose lease expired without completion, returning them
    /// to `pending` so another worker can pick them up. Run on a tokio
    /// interval by the `Sweeper` in `crates/queue`.
    /// Marks a task permanently `failed` regardless of remaining attempts —
    /// for failure classes the worker must never retry (budget-denied, a
    /// malformed-content logic error) rather than handing it back to backoff.
    pub async fn fail_permanently(&self, task_id: Uuid, error: &str) -> Result<GenerationTask, StorageError> {
        let row = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            r#"
            UPDATE generation_tasks
            SET status = 'failed', last_error = $2, lease_expires_at = NULL, completed_at = now()
            WHERE task_id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(task_id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("generation task {task_id}")))?;

        Ok(row.into())
    }

    pub async fn reclaim_expired_leases(&self) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE generation_tasks
            SET status = 'pending', lease_expires_at = NULL
            WHERE status = 'processing' AND lease_expires_at < now()
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn list_by_module(&self, module_id: Uuid) -> Result<Vec<GenerationTask>, StorageError> {
        let rows = sqlx::query_as::<_, GenerationTaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM generation_tasks WHERE module_id = $1 ORDER BY created_at DESC"
        ))
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
