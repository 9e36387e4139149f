//! `/virtual/*` and `/content/results` handlers (spec §6): the student-facing
//! surface over the Progressive Scheduler and Virtual Store.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;
use validator::Validate;

use platform_domain::{
    DomainError, Envelope, ProgressiveGenerationRequest, SchedulingOutcome, SubmitContentResultRequest,
    TriggerNextTopicRequest, VirtualModuleDetail, VirtualTopicDetail,
};

use crate::AppState;
use crate::middleware::{RoleGuard, Student};

pub async fn progressive_generation(
    State(state): State<Arc<AppState>>,
    auth: RoleGuard<Student>,
    Json(body): Json<ProgressiveGenerationRequest>,
) -> Result<Json<Envelope<SchedulingOutcome>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let outcome = state.scheduler.schedule(body.plan_id, auth.principal.user_id).await?;
    Ok(Envelope::ok(outcome))
}

pub async fn trigger_next_topic(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Student>,
    Json(body): Json<TriggerNextTopicRequest>,
) -> Result<Json<Envelope<SchedulingOutcome>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let enqueued = state.scheduler.on_topic_completed(body.virtual_module_id).await?;
    let virtual_modules = match state.virtual_store.get_virtual_module(body.virtual_module_id).await? {
        Some(vm) => vec![vm],
        None => Vec::new(),
    };

    Ok(Envelope::ok(SchedulingOutcome {
        virtual_modules,
        enqueued_task_ids: enqueued.into_iter().collect(),
    }))
}

pub async fn get_virtual_module(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Student>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<VirtualModuleDetail>>, DomainError> {
    let module = state
        .virtual_store
        .get_virtual_module(id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("virtual module {id}")))?;

    let topics = state.virtual_store.list_virtual_topics(module.id).await?;
    let mut topic_details = Vec::with_capacity(topics.len());
    for topic in topics {
        let contents = state.virtual_store.list_virtual_topic_contents(topic.id).await?;
        topic_details.push(VirtualTopicDetail { topic, contents });
    }

    Ok(Envelope::ok(VirtualModuleDetail {
        module,
        topics: topic_details,
    }))
}

/// `POST /content/results` (spec §6): writes the result, clamps per-topic
/// progress monotonically upward, and — once the topic's contents average to
/// completion — advances the scheduler (topic-level unlock, spec §4.7).
pub async fn submit_content_result(
    State(state): State<Arc<AppState>>,
    auth: RoleGuard<Student>,
    Json(body): Json<SubmitContentResultRequest>,
) -> Result<Json<Envelope<serde_json::Value>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let virtual_content = state
        .virtual_store
        .get_virtual_topic_content(body.virtual_content_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("virtual content {}", body.virtual_content_id)))?;

    let result = state
        .virtual_store
        .submit_content_result(auth.principal.user_id, body.virtual_content_id, body.score, body.completion_percentage)
        .await?;

    let current_topic = state
        .virtual_store
        .get_virtual_topic(virtual_content.virtual_topic_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("virtual topic {}", virtual_content.virtual_topic_id)))?;
    let topic_contents = state
        .virtual_store
        .list_virtual_topic_contents(virtual_content.virtual_topic_id)
        .await?;
    let content_count = topic_contents.len().max(1) as f64;
    let contribution = body.completion_percentage / content_count;
    let new_total = (current_topic.progress + contribution).min(1.0);

    let topic = state.virtual_store.mark_topic_progress(virtual_content.virtual_topic_id, new_total).await?;

    if matches!(topic.status, platform_domain::VirtualTopicStatus::Completed) {
        // Topic-level advancement (unlock the next topic within this module).
        state.scheduler.on_topic_completed(topic.virtual_module_id).await?;

        // Module-level advancement (spec §4.7's sliding window): a topic
        // completing can push its module's progress over `generation_threshold`,
        // which is what `schedule` checks to enqueue the next module.
        if let Some(vm) = state.virtual_store.get_virtual_module(topic.virtual_module_id).await? {
            if let Some(module) = state.content.get_module(vm.module_id).await? {
                state.scheduler.schedule(module.plan_id, vm.student_id).await?;
            }
        }
    }

    Ok(Envelope::ok(serde_json::json!({ "result_id": result.id })))
}
