#![cfg(feature = "postgres-tests")]

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use platform_budget::BudgetGate;
use platform_domain::{
    ContentType, EnhancePayload, GeneratePayload, GenerationStatus, SyncContentChangePayload,
    SyncKind, TaskStatus, TaskType, UpdatePayload, VirtualizationSettings,
};
use platform_llm::MockProvider;
use platform_queue::GenerationQueue;
use platform_scheduler::ProgressiveScheduler;
use platform_storage::{BudgetRepository, ContentRepository, QueueRepository, VirtualRepository};
use platform_worker::pool::WorkerDeps;
use platform_worker::{dispatch, WorkerError};

fn task(
    task_type: TaskType,
    student_id: Uuid,
    module_id: Uuid,
    payload: serde_json::Value,
) -> platform_domain::GenerationTask {
    platform_domain::GenerationTask {
        task_id: Uuid::new_v4(),
        task_type,
        student_id,
        module_id,
        payload,
        priority: 5,
        status: TaskStatus::Processing,
        attempts: 0,
        max_attempts: 3,
        lease_expires_at: None,
        available_at: None,
        last_error: None,
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

fn deps(pool: PgPool) -> (WorkerDeps, ContentRepository, VirtualRepository) {
    let content = ContentRepository::new(pool.clone());
    let virtual_store = VirtualRepository::new(pool.clone());
    let queue = GenerationQueue::new(QueueRepository::new(pool.clone()));
    let budget = Arc::new(BudgetGate::new(BudgetRepository::new(pool.clone())));
    let llm = Arc::new(MockProvider::new("mock", vec!["mock-small".to_string()]));
    let scheduler = Arc::new(ProgressiveScheduler::new(content.clone(), virtual_store.clone(), queue.clone()));
    (
        WorkerDeps {
            content: content.clone(),
            virtual_store: virtual_store.clone(),
            queue,
            budget,
            llm,
            scheduler,
            lease_seconds: 300,
        },
        content,
        virtual_store,
    )
}

#[sqlx::test(migrations = "../../migrations")]
async fn generate_bootstrap_fills_initial_batch_with_first_topic_unlocked(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 2, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic_a = content.create_topic(module.id, 0, "A", "theory a").await.unwrap();
    let topic_b = content.create_topic(module.id, 1, "B", "theory b").await.unwrap();
    content.publish_topic(topic_a.id).await.unwrap();
    content.publish_topic(topic_b.id).await.unwrap();
    content
        .create_or_update_topic_content(topic_a.id, ContentType::Slide, 0, None, serde_json::json!({"text": "a"}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    virt.upsert_virtual_module(module.id, student_id).await.unwrap();

    let t = task(TaskType::Generate, student_id, module.id, serde_json::to_value(GeneratePayload { initial_topic_count: None, topic_id: None }).unwrap());
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let vm = virt.get_virtual_module_for_student(module.id, student_id).await.unwrap().unwrap();
    let topics = virt.list_virtual_topics(vm.id).await.unwrap();
    assert_eq!(topics.len(), 2);
    let vt_a = topics.iter().find(|t| t.topic_id == topic_a.id).unwrap();
    let vt_b = topics.iter().find(|t| t.topic_id == topic_b.id).unwrap();
    assert!(!vt_a.locked);
    assert!(vt_b.locked);

    let contents = virt.list_virtual_topic_contents(vt_a.id).await.unwrap();
    assert_eq!(contents.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn generate_targeted_topic_generates_only_that_topic(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "A", "theory").await.unwrap();
    content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "A", "theory", true).await.unwrap();

    let t = task(TaskType::Generate, student_id, module.id, serde_json::to_value(GeneratePayload { initial_topic_count: None, topic_id: Some(topic.id) }).unwrap());
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let contents = virt.list_virtual_topic_contents(vt.id).await.unwrap();
    assert_eq!(contents.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_skips_topics_whose_fingerprint_is_unchanged(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "A", "theory").await.unwrap();
    let source = content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({"text": "v1"}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "A", "theory", false).await.unwrap();

    let fp = platform_queue::fingerprint::fingerprint(&serde_json::json!({
        "source_content_id": source.id,
        "student_id": student_id,
        "source_updated_at": source.updated_at.to_rfc3339(),
    }));
    virt.upsert_virtual_topic_content(vt.id, source.id, ContentType::Slide, 0, serde_json::json!({"adapted": "stale but current"}), &fp)
        .await
        .unwrap();

    let t = task(TaskType::Update, student_id, module.id, serde_json::to_value(UpdatePayload { reason: "edit".to_string() }).unwrap());
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let contents = virt.list_virtual_topic_contents(vt.id).await.unwrap();
    assert_eq!(contents.len(), 1);
    assert_eq!(contents[0].content.get("adapted").unwrap(), "stale but current");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn enhance_only_adds_missing_content_types(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "A", "theory").await.unwrap();
    content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({}))
        .await
        .unwrap();
    content
        .create_or_update_topic_content(topic.id, ContentType::Quiz, 1, None, serde_json::json!({}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "A", "theory", false).await.unwrap();

    let t = task(
        TaskType::Enhance,
        student_id,
        module.id,
        serde_json::to_value(EnhancePayload { content_types: vec![ContentType::Slide, ContentType::Quiz] }).unwrap(),
    );
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let contents = virt.list_virtual_topic_contents(vt.id).await.unwrap();
    assert_eq!(contents.len(), 2);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_publish_creates_a_locked_virtual_topic_when_others_already_exist(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let existing_topic = content.create_topic(module.id, 0, "Existing", "theory").await.unwrap();
    let new_topic = content.create_topic(module.id, 1, "New", "theory").await.unwrap();
    content.publish_topic(new_topic.id).await.unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    virt.create_virtual_topic(vm.id, existing_topic.id, student_id, 0, "Existing", "theory", false).await.unwrap();

    let t = task(
        TaskType::SyncContentChange,
        student_id,
        module.id,
        serde_json::to_value(SyncContentChangePayload { kind: SyncKind::Publish, topic_id: Some(new_topic.id), content_id: None }).unwrap(),
    );
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let created = virt.get_virtual_topic_by_topic(vm.id, new_topic.id).await.unwrap().unwrap();
    assert!(created.locked);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_remove_soft_deletes_the_instance_everywhere_it_appears(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "A", "theory").await.unwrap();
    let source = content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "A", "theory", false).await.unwrap();
    virt.upsert_virtual_topic_content(vt.id, source.id, ContentType::Slide, 0, serde_json::json!({}), "fp-1")
        .await
        .unwrap();

    let t = task(
        TaskType::SyncContentChange,
        student_id,
        module.id,
        serde_json::to_value(SyncContentChangePayload { kind: SyncKind::Remove, topic_id: None, content_id: Some(source.id) }).unwrap(),
    );
    dispatch::handle(&deps, &t).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let contents = virt.list_virtual_topic_contents(vt.id).await.unwrap();
    assert!(contents.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn generate_with_missing_virtual_module_is_not_found(pool: PgPool) -> Result<(), sqlx::Error> {
    let (deps, content, _virt) = deps(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();

    let t = task(TaskType::Generate, Uuid::new_v4(), module.id, serde_json::to_value(GeneratePayload { initial_topic_count: None, topic_id: None }).unwrap());
    let err = dispatch::handle(&deps, &t).await.unwrap_err();
    assert!(matches!(err, WorkerError::NotFound(_)));

    Ok(())
}
