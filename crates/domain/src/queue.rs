//! Generation Queue entities (C5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Generate,
    Update,
    Enhance,
    SyncContentChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// `kind` discriminator carried inside a `sync_content_change` task's payload (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    Publish,
    Retract,
    Refresh,
    Add,
    Remove,
}

/// Durable queue element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub student_id: Uuid,
    pub module_id: Uuid,
    /// Task-specific; includes `topic_ids`, `content_ids`, `kind` for sync tasks.
    pub payload: serde_json::Value,
    pub priority: i32,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Backoff checkpoint: a requeued task is not eligible for lease until
    /// this instant (exponential-with-jitter delay, §4.5). `None` means
    /// immediately eligible (fresh enqueue, or no backoff has applied yet).
    pub available_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub const DEFAULT_PRIORITY: i32 = 5;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// `payload` for a `generate` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePayload {
    pub initial_topic_count: Option<i32>,
    /// Present when the task is a targeted single-topic generation
    /// (scheduler's topic-level advancement, §4.7).
    pub topic_id: Option<Uuid>,
}

/// `payload` for an `update` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePayload {
    pub reason: String,
}

/// `payload` for an `enhance` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancePayload {
    pub content_types: Vec<crate::ContentType>,
}

/// `payload` for a `sync_content_change` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncContentChangePayload {
    pub kind: SyncKind,
    pub topic_id: Option<Uuid>,
    pub content_id: Option<Uuid>,
}
