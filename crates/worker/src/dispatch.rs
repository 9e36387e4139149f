//! Task dispatch (spec §4.6): one function per `task_type`, all routing LLM
//! calls through the Budget Gate before `LlmProvider::complete`.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use uuid::Uuid;

use platform_domain::{
    ContentType, EnhancePayload, GeneratePayload, GenerationTask, RegisterCallRequest, TaskType,
    Topic, TopicContent, SyncContentChangePayload, SyncKind, UpdateCallRequest, UpdatePayload,
    VirtualTopicContent, VirtualTopicStatus,
};

use crate::error::WorkerError;
use crate::pool::WorkerDeps;

pub async fn handle(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), WorkerError> {
    match task.task_type {
        TaskType::Generate => generate(deps, task).await,
        TaskType::Update => update(deps, task).await,
        TaskType::Enhance => enhance(deps, task).await,
        TaskType::SyncContentChange => sync_content_change(deps, task).await,
    }
}

/// Orders a topic's contents for generation: slides first (a quiz may
/// reference slide content), quiz last, everything else in between by
/// content-type then natural `order` (spec §4.6).
fn ordered_for_generation(mut contents: Vec<TopicContent>) -> Vec<TopicContent> {
    contents.sort_by_key(|c| (generation_rank(c.content_type), c.order));
    contents
}

fn generation_rank(content_type: ContentType) -> u8 {
    match content_type {
        ContentType::Slide => 0,
        ContentType::Reading => 1,
        ContentType::Interactive => 2,
        ContentType::Exercise => 3,
        ContentType::Quiz => 4,
    }
}

/// Ties a `VirtualTopicContent` to the (source content version, student)
/// pair that produced it. Cognitive-profile inputs are out of scope (spec
/// §1 Non-goals name the adaptation algorithm itself as out of scope), so
/// only the source's `updated_at` and the student id feed the hash.
fn content_fingerprint(student_id: Uuid, content: &TopicContent) -> String {
    platform_queue::fingerprint::fingerprint(&serde_json::json!({
        "source_content_id": content.id,
        "student_id": student_id,
        "source_updated_at": content.updated_at.to_rfc3339(),
    }))
}

fn build_prompt(topic_theory: &str, content: &TopicContent) -> String {
    format!(
        "Topic theory:\n{theory}\n\nAdapt the following {kind} content for this student. Respond with the adapted content only.\n\n{payload}",
        theory = topic_theory,
        kind = content.content_type.as_str(),
        payload = content.content,
    )
}

fn estimate_tokens(prompt: &str) -> i64 {
    (prompt.split_whitespace().count() as i64).max(1)
}

/// Pre-flight-registers, calls the provider, then post-flight-finalizes —
/// every LLM call the worker makes goes through both Budget Gate legs (§4.4, §4.6).
async fn adapt_content(
    deps: &WorkerDeps,
    student_id: Uuid,
    content: &TopicContent,
    topic_theory: &str,
) -> Result<serde_json::Value, WorkerError> {
    let call_id = Uuid::new_v4();
    let prompt = build_prompt(topic_theory, content);
    let model = deps
        .llm
        .models()
        .into_iter()
        .next()
        .unwrap_or_else(|| "default".to_string());

    deps.budget
        .register_call(
            RegisterCallRequest {
                call_id,
                provider: deps.llm.name().to_string(),
                model_name: model.clone(),
                feature: "virtualization".to_string(),
                prompt_tokens: estimate_tokens(&prompt),
            },
            student_id,
        )
        .await?;

    let request = platform_llm::LlmRequest {
        model,
        system: Some("Adapt instructional content for an individual student.".to_string()),
        prompt,
        max_tokens: 1024,
        temperature: 0.7,
    };

    let started = Instant::now();
    let completion = deps.llm.complete(&request).await;
    let response_time_ms = started.elapsed().as_millis() as i64;

    let update = match &completion {
        Ok(response) => UpdateCallRequest {
            completion_tokens: response.usage.completion_tokens,
            response_time_ms,
            success: true,
            error_message: None,
        },
        Err(err) => UpdateCallRequest {
            completion_tokens: 0,
            response_time_ms,
            success: false,
            error_message: Some(err.to_string()),
        },
    };
    deps.budget.update_call(call_id, update).await?;

    let response = completion?;
    Ok(serde_json::json!({
        "content_type": content.content_type.as_str(),
        "adapted": response.text,
    }))
}

async fn generate_topic_contents(
    deps: &WorkerDeps,
    student_id: Uuid,
    virtual_topic_id: Uuid,
    topic: &Topic,
    contents: Vec<TopicContent>,
) -> Result<(), WorkerError> {
    for content in ordered_for_generation(contents) {
        let fingerprint = content_fingerprint(student_id, &content);
        let adapted = adapt_content(deps, student_id, &content, &topic.theory).await?;
        deps.virtual_store
            .upsert_virtual_topic_content(
                virtual_topic_id,
                content.id,
                content.content_type,
                content.order,
                adapted,
                &fingerprint,
            )
            .await?;
    }
    Ok(())
}

fn missing(what: impl std::fmt::Display) -> WorkerError {
    WorkerError::NotFound(format!("{what} not found"))
}

/// `generate` (spec §4.6): bootstrap batch (no `topic_id`) creates up to
/// `initial_topic_count`/`initial_batch_size` VirtualTopics — first unlocked,
/// the rest locked pending topic-level advancement — and generates every
/// content under each. A targeted `topic_id` (from the scheduler's
/// topic-level advancement) generates content for one already-unlocked topic.
async fn generate(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), WorkerError> {
    let payload: GeneratePayload =
        serde_json::from_value(task.payload.clone()).map_err(|e| WorkerError::Logic(format!("malformed generate payload: {e}")))?;

    let vm = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await?
        .ok_or_else(|| missing(format!("virtual module (module {}, student {})", task.module_id, task.student_id)))?;

    if let Some(topic_id) = payload.topic_id {
        let topic = deps.content.get_topic(topic_id).await?.ok_or_else(|| missing(format!("topic {topic_id}")))?;
        let virtual_topic = deps
            .virtual_store
            .get_virtual_topic_by_topic(vm.id, topic_id)
            .await?
            .ok_or_else(|| missing(format!("virtual topic for topic {topic_id}")))?;
        let contents = deps.content.topic_contents(topic_id).await?;
        return generate_topic_contents(deps, task.student_id, virtual_topic.id, &topic, contents).await;
    }

    let module = deps.content.get_module(task.module_id).await?.ok_or_else(|| missing(format!("module {}", task.module_id)))?;
    let inventory = deps.content.published_topic_inventory(task.module_id).await?;
    let take = payload
        .initial_topic_count
        .unwrap_or(module.virtualization_settings.initial_batch_size)
        .max(1) as usize;

    let existing = deps.virtual_store.list_virtual_topics(vm.id).await?;
    let existing_topic_ids: HashSet<Uuid> = existing.iter().map(|t| t.topic_id).collect();

    for (index, entry) in inventory.into_iter().take(take).enumerate() {
        if existing_topic_ids.contains(&entry.topic.id) {
            continue;
        }
        let locked = index != 0;
        let virtual_topic = deps
            .virtual_store
            .create_virtual_topic(
                vm.id,
                entry.topic.id,
                task.student_id,
                entry.topic.order,
                &entry.topic.name,
                &entry.topic.theory,
                locked,
            )
            .await?;
        generate_topic_contents(deps, task.student_id, virtual_topic.id, &entry.topic, entry.contents).await?;
    }

    Ok(())
}

/// `update` (spec §4.6): re-adapt every still-active VirtualTopic's contents,
/// skipping any whose `personalization_fingerprint` still matches the source.
async fn update(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), WorkerError> {
    let _payload: UpdatePayload =
        serde_json::from_value(task.payload.clone()).map_err(|e| WorkerError::Logic(format!("malformed update payload: {e}")))?;

    let vm = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await?
        .ok_or_else(|| missing(format!("virtual module (module {}, student {})", task.module_id, task.student_id)))?;

    for vt in deps.virtual_store.list_virtual_topics(vm.id).await? {
        if matches!(vt.status, VirtualTopicStatus::Removed) {
            continue;
        }
        let topic = deps.content.get_topic(vt.topic_id).await?.ok_or_else(|| missing(format!("topic {}", vt.topic_id)))?;
        let contents = deps.content.topic_contents(vt.topic_id).await?;
        let existing = deps.virtual_store.list_virtual_topic_contents(vt.id).await?;
        let existing_by_source: HashMap<Uuid, &VirtualTopicContent> =
            existing.iter().map(|c| (c.source_content_id, c)).collect();

        for content in ordered_for_generation(contents) {
            let fingerprint = content_fingerprint(task.student_id, &content);
            let unchanged = existing_by_source
                .get(&content.id)
                .is_some_and(|existing| existing.personalization_fingerprint == fingerprint);
            if unchanged {
                continue;
            }
            let adapted = adapt_content(deps, task.student_id, &content, &topic.theory).await?;
            deps.virtual_store
                .upsert_virtual_topic_content(vt.id, content.id, content.content_type, content.order, adapted, &fingerprint)
                .await?;
        }
    }

    Ok(())
}

/// `enhance` (spec §4.6): adds content of the requested types wherever
/// missing, leaving every existing VirtualTopicContent untouched.
async fn enhance(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), WorkerError> {
    let payload: EnhancePayload =
        serde_json::from_value(task.payload.clone()).map_err(|e| WorkerError::Logic(format!("malformed enhance payload: {e}")))?;

    let vm = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await?
        .ok_or_else(|| missing(format!("virtual module (module {}, student {})", task.module_id, task.student_id)))?;

    for vt in deps.virtual_store.list_virtual_topics(vm.id).await? {
        if matches!(vt.status, VirtualTopicStatus::Removed) {
            continue;
        }
        let topic = deps.content.get_topic(vt.topic_id).await?.ok_or_else(|| missing(format!("topic {}", vt.topic_id)))?;
        let contents = deps.content.topic_contents(vt.topic_id).await?;
        let existing = deps.virtual_store.list_virtual_topic_contents(vt.id).await?;
        let existing_sources: HashSet<Uuid> = existing.iter().map(|c| c.source_content_id).collect();

        let missing_of_requested_types: Vec<TopicContent> = contents
            .into_iter()
            .filter(|c| payload.content_types.contains(&c.content_type) && !existing_sources.contains(&c.id))
            .collect();

        generate_topic_contents(deps, task.student_id, vt.id, &topic, missing_of_requested_types).await?;
    }

    Ok(())
}

/// `sync_content_change` (spec §4.8): one branch per `kind`, each reconciling
/// this student's Virtual Store to an instructor-side Content Store mutation.
async fn sync_content_change(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), WorkerError> {
    let payload: SyncContentChangePayload =
        serde_json::from_value(task.payload.clone()).map_err(|e| WorkerError::Logic(format!("malformed sync payload: {e}")))?;

    let vm = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await?
        .ok_or_else(|| missing(format!("virtual module (module {}, student {})", task.module_id, task.student_id)))?;

    match payload.kind {
        SyncKind::Publish => {
            let topic_id = payload.topic_id.ok_or_else(|| WorkerError::Logic("publish sync missing topic_id".to_string()))?;
            if deps.virtual_store.get_virtual_topic_by_topic(vm.id, topic_id).await?.is_some() {
                return Ok(());
            }
            let topic = deps.content.get_topic(topic_id).await?.ok_or_else(|| missing(format!("topic {topic_id}")))?;
            let already_has_topics = !deps.virtual_store.list_virtual_topics(vm.id).await?.is_empty();
            let virtual_topic = deps
                .virtual_store
                .create_virtual_topic(vm.id, topic.id, task.student_id, topic.order, &topic.name, &topic.theory, already_has_topics)
                .await?;
            if !already_has_topics {
                let contents = deps.content.topic_contents(topic_id).await?;
                generate_topic_contents(deps, task.student_id, virtual_topic.id, &topic, contents).await?;
            }
        }
        SyncKind::Retract => {
            let topic_id = payload.topic_id.ok_or_else(|| WorkerError::Logic("retract sync missing topic_id".to_string()))?;
            if let Some(vt) = deps.virtual_store.get_virtual_topic_by_topic(vm.id, topic_id).await? {
                deps.virtual_store.mark_topic_removed(vt.id).await?;
            }
        }
        SyncKind::Refresh => {
            let content_id = payload.content_id.ok_or_else(|| WorkerError::Logic("refresh sync missing content_id".to_string()))?;
            let source = deps.content.get_topic_content(content_id).await?.ok_or_else(|| missing(format!("topic content {content_id}")))?;
            let topic = deps.content.get_topic(source.topic_id).await?.ok_or_else(|| missing(format!("topic {}", source.topic_id)))?;
            for vt in deps.virtual_store.list_virtual_topics(vm.id).await? {
                let has_instance = deps
                    .virtual_store
                    .list_virtual_topic_contents(vt.id)
                    .await?
                    .iter()
                    .any(|c| c.source_content_id == content_id);
                if !has_instance {
                    continue;
                }
                let fingerprint = content_fingerprint(task.student_id, &source);
                let adapted = adapt_content(deps, task.student_id, &source, &topic.theory).await?;
                deps.virtual_store
                    .upsert_virtual_topic_content(vt.id, source.id, source.content_type, source.order, adapted, &fingerprint)
                    .await?;
            }
        }
        SyncKind::Add => {
            let topic_id = payload.topic_id.ok_or_else(|| WorkerError::Logic("add sync missing topic_id".to_string()))?;
            let content_id = payload.content_id.ok_or_else(|| WorkerError::Logic("add sync missing content_id".to_string()))?;
            let Some(vt) = deps.virtual_store.get_virtual_topic_by_topic(vm.id, topic_id).await? else {
                return Ok(());
            };
            let topic = deps.content.get_topic(topic_id).await?.ok_or_else(|| missing(format!("topic {topic_id}")))?;
            let content = deps.content.get_topic_content(content_id).await?.ok_or_else(|| missing(format!("topic content {content_id}")))?;
            let fingerprint = content_fingerprint(task.student_id, &content);
            let adapted = adapt_content(deps, task.student_id, &content, &topic.theory).await?;
            deps.virtual_store
                .upsert_virtual_topic_content(vt.id, content.id, content.content_type, content.order, adapted, &fingerprint)
                .await?;
        }
        SyncKind::Remove => {
            let content_id = payload.content_id.ok_or_else(|| WorkerError::Logic("remove sync missing content_id".to_string()))?;
            for vt in deps.virtual_store.list_virtual_topics(vm.id).await? {
                deps.virtual_store.soft_delete_virtual_topic_content_for_topic(vt.id, content_id).await?;
            }
        }
    }

    Ok(())
}
