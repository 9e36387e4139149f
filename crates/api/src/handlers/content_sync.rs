//! Instructor-side Content Store mutation triggers (spec §4.8): each handler
//! performs the Content Store write it names (where the mutation lives in
//! `ContentRepository`) and fans out the resulting `sync_content_change`
//! tasks via `SyncReconciler`. Full content CRUD is out of scope (Non-goals);
//! these are the minimal hooks that let an already-out-of-scope CRUD layer
//! notify C8 that something changed.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use platform_domain::{DomainError, Envelope};

use crate::AppState;
use crate::middleware::{RoleGuard, Teacher};

fn enqueued(task_ids: Vec<Uuid>) -> Envelope<serde_json::Value> {
    Envelope::ok(serde_json::json!({ "enqueued_task_ids": task_ids }))
}

/// `POST /content/topics/{id}/publish`.
pub async fn publish_topic(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path(topic_id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    let task_ids = state.reconciler.topic_published(topic_id).await?;
    Ok(enqueued(task_ids))
}

/// `POST /content/topics/{id}/unpublish`.
pub async fn unpublish_topic(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path(topic_id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    let task_ids = state.reconciler.topic_unpublished(topic_id).await?;
    Ok(enqueued(task_ids))
}

/// `POST /content/topics/{topic_id}/items/{content_id}/added`.
pub async fn content_added(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path((topic_id, content_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    let task_ids = state.reconciler.content_added(topic_id, content_id).await?;
    Ok(enqueued(task_ids))
}

/// `POST /content/items/{id}/edited`.
pub async fn content_edited(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path(content_id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    let task_ids = state.reconciler.content_edited(content_id).await?;
    Ok(enqueued(task_ids))
}

/// `POST /content/items/{id}/deleted`.
pub async fn content_deleted(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Teacher>,
    Path(content_id): Path<Uuid>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    let task_ids = state.reconciler.content_deleted(content_id).await?;
    Ok(enqueued(task_ids))
}
