#![cfg(feature = "postgres-tests")]

use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{ContentType, GenerationStatus, VirtualizationSettings};
use platform_queue::GenerationQueue;
use platform_scheduler::SyncReconciler;
use platform_storage::{ContentRepository, QueueRepository, VirtualRepository};

async fn make_reconciler(pool: PgPool) -> (SyncReconciler, ContentRepository, VirtualRepository) {
    let content = ContentRepository::new(pool.clone());
    let virtual_store = VirtualRepository::new(pool.clone());
    let queue = GenerationQueue::new(QueueRepository::new(pool));
    (
        SyncReconciler::new(content.clone(), virtual_store.clone(), queue),
        content,
        virtual_store,
    )
}

#[sqlx::test(migrations = "../../migrations")]
async fn topic_published_fans_out_only_to_active_virtual_modules(pool: PgPool) -> Result<(), sqlx::Error> {
    let (reconciler, content, virt) = make_reconciler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "Topic", "theory").await.unwrap();

    let active_student = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, active_student).await.unwrap();
    virt.set_generation_status(vm.id, GenerationStatus::Ready, None).await.unwrap();

    // a student whose VM never made it past pending shouldn't be notified
    let pending_student = Uuid::new_v4();
    virt.upsert_virtual_module(module.id, pending_student).await.unwrap();

    let enqueued = reconciler.topic_published(topic.id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(enqueued.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn content_edited_enqueues_a_refresh_for_every_derived_instance(pool: PgPool) -> Result<(), sqlx::Error> {
    let (reconciler, content, virt) = make_reconciler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "Topic", "theory").await.unwrap();
    let source_content = content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({"text": "v1"}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "Topic", "", false).await.unwrap();
    virt.upsert_virtual_topic_content(vt.id, source_content.id, ContentType::Slide, 0, serde_json::json!({"text": "v1"}), "fp-1")
        .await
        .unwrap();

    let enqueued = reconciler.content_edited(source_content.id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(enqueued.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn content_deleted_is_idempotent_once_reconciled(pool: PgPool) -> Result<(), sqlx::Error> {
    let (reconciler, content, virt) = make_reconciler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic = content.create_topic(module.id, 0, "Topic", "theory").await.unwrap();
    let source_content = content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({}))
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt = virt.create_virtual_topic(vm.id, topic.id, student_id, 0, "Topic", "", false).await.unwrap();
    virt.upsert_virtual_topic_content(vt.id, source_content.id, ContentType::Slide, 0, serde_json::json!({}), "fp-1")
        .await
        .unwrap();

    let first = reconciler.content_deleted(source_content.id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(first.len(), 1);

    // the source is already soft-deleted virtually once, but the queue task
    // it created is still pending, so a second call collapses via dedup
    let second = reconciler.content_deleted(source_content.id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(second.is_empty());

    Ok(())
}
