//! Virtual Store entities — per-student materializations of Content Store entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Ready,
    Failed,
}

/// A per-student materialization of a `Module`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualModule {
    pub id: Uuid,
    pub module_id: Uuid,
    pub student_id: Uuid,
    pub generation_status: GenerationStatus,
    pub progress: f64,
    pub locked: bool,
    /// Set when `generation_status` is `Failed`; human-readable, never the stack detail.
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VirtualTopicStatus {
    Locked,
    Active,
    Completed,
    /// Source topic was unpublished (`sync_content_change(kind=retract)`, §4.8).
    /// Treated like `Completed` for the purposes of unlocking its successor.
    Removed,
}

/// Per-student materialization of a `Topic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTopic {
    pub id: Uuid,
    pub virtual_module_id: Uuid,
    pub topic_id: Uuid,
    pub student_id: Uuid,
    pub order: i32,
    pub name: String,
    pub description: String,
    pub locked: bool,
    pub status: VirtualTopicStatus,
    pub progress: f64,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-student instance of a `TopicContent`, carrying the adapted payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTopicContent {
    pub id: Uuid,
    pub virtual_topic_id: Uuid,
    /// Weak reference to the source; edits there never alias this row, they
    /// enqueue a `sync_content_change` task instead (see `crates::queue`).
    pub source_content_id: Uuid,
    pub content_type: crate::ContentType,
    pub order: i32,
    pub payload: serde_json::Value,
    /// Hash over (source content version, cognitive-profile inputs); used to
    /// detect staleness after an instructor edit.
    pub personalization_fingerprint: String,
    /// Soft-delete flag flipped by `sync_content_change(kind=remove)` (§4.8);
    /// never hard-deleted so `ContentResult` audit history stays valid.
    pub status: crate::ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One per (student, virtual_content or evaluation) submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResult {
    pub id: Uuid,
    pub student_id: Uuid,
    pub virtual_content_id: Uuid,
    pub score: f64,
    pub completion_percentage: f64,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /content/results`.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitContentResultRequest {
    pub virtual_content_id: Uuid,
    #[validate(range(min = 0.0, max = 100.0))]
    pub score: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub completion_percentage: f64,
}

/// A VirtualModule together with its VirtualTopics and per-topic content
/// inventory, as returned by `GET /virtual/modules/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualModuleDetail {
    pub module: VirtualModule,
    pub topics: Vec<VirtualTopicDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VirtualTopicDetail {
    pub topic: VirtualTopic,
    pub contents: Vec<VirtualTopicContent>,
}

/// Body of `POST /virtual/progressive-generation`.
#[derive(Debug, Deserialize, Validate)]
pub struct ProgressiveGenerationRequest {
    pub plan_id: Uuid,
}

/// Body of `POST /virtual/trigger-next-topic`.
#[derive(Debug, Deserialize, Validate)]
pub struct TriggerNextTopicRequest {
    pub virtual_module_id: Uuid,
}

/// Response for both progressive-generation and trigger-next-topic: the
/// student's current VirtualModules plus any freshly enqueued task ids.
#[derive(Debug, Serialize)]
pub struct SchedulingOutcome {
    pub virtual_modules: Vec<VirtualModule>,
    pub enqueued_task_ids: Vec<Uuid>,
}
