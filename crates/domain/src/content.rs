//! Content Store entities (study plans, modules, topics, topic contents).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::GenerationStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Active,
    Archived,
}

/// Authoring root. Owns an ordered list of Modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyPlan {
    pub id: Uuid,
    pub author_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub title: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `{ initial_batch_size, generation_threshold }`, the knobs the Progressive
/// Scheduler reads per module.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
pub struct VirtualizationSettings {
    #[validate(range(min = 1))]
    pub initial_batch_size: i32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub generation_threshold: f64,
}

impl Default for VirtualizationSettings {
    fn default() -> Self {
        Self {
            initial_batch_size: 1,
            generation_threshold: 0.8,
        }
    }
}

/// Ordered child of a study plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub order: i32,
    pub title: String,
    pub virtualization_settings: VirtualizationSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ordered child of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub module_id: Uuid,
    pub order: i32,
    pub name: String,
    pub theory: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Slide,
    Quiz,
    Reading,
    Exercise,
    Interactive,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Slide => "slide",
            ContentType::Quiz => "quiz",
            ContentType::Reading => "reading",
            ContentType::Exercise => "exercise",
            ContentType::Interactive => "interactive",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "quiz" => ContentType::Quiz,
            "reading" => ContentType::Reading,
            "exercise" => ContentType::Exercise,
            "interactive" => ContentType::Interactive,
            _ => ContentType::Slide,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Active,
    Deleted,
}

impl ContentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Active => "active",
            ContentStatus::Deleted => "deleted",
        }
    }
}

/// A typed content element attached to a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicContent {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub content_type: ContentType,
    pub order: i32,
    pub parent_content_id: Option<Uuid>,
    pub content: serde_json::Value,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating or updating a `TopicContent`.
#[derive(Debug, Deserialize, Validate)]
pub struct UpsertTopicContentRequest {
    pub topic_id: Uuid,
    pub content_type: ContentType,
    #[validate(range(min = 0))]
    pub order: i32,
    pub parent_content_id: Option<Uuid>,
    pub content: serde_json::Value,
}

/// `{ published_topic_count, total_topic_count, generation_status_for_student }`
/// as read by the scheduler (C7) to decide module eligibility.
#[derive(Debug, Clone, Serialize)]
pub struct VirtualizationReadiness {
    pub published_topic_count: i64,
    pub total_topic_count: i64,
    pub generation_status_for_student: Option<GenerationStatus>,
}

impl VirtualizationReadiness {
    pub fn ready_for_virtualization(&self) -> bool {
        self.published_topic_count >= 1
    }
}

/// One published topic with its content inventory grouped by type, as
/// returned by the published-topic-inventory read used by C6/C7.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedTopicInventory {
    pub topic: Topic,
    pub contents: Vec<TopicContent>,
}
