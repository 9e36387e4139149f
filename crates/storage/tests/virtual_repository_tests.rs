#![cfg(feature = "postgres-tests")]

use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{ContentType, GenerationStatus, VirtualTopicStatus, VirtualizationSettings};
use platform_storage::{ContentRepository, VirtualRepository};

async fn seed_module_and_topic(content: &ContentRepository) -> (Uuid, Uuid) {
    let plan = content
        .create_plan(Uuid::new_v4(), None, "Fixture Plan")
        .await
        .unwrap();
    let module = content
        .create_module(
            plan.id,
            0,
            "Fixture Module",
            VirtualizationSettings {
                initial_batch_size: 2,
                generation_threshold: 0.8,
            },
        )
        .await
        .unwrap();
    let topic = content
        .create_topic(module.id, 0, "Fixture Topic", "some theory")
        .await
        .unwrap();
    (module.id, topic.id)
}

#[sqlx::test(migrations = "../../migrations")]
async fn mark_topic_progress_is_monotone(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let (module_id, topic_id) = seed_module_and_topic(&content).await;
    let student_id = Uuid::new_v4();

    let vm = virt.upsert_virtual_module(module_id, student_id).await.unwrap();
    let vt = virt
        .create_virtual_topic(vm.id, topic_id, student_id, 0, "Fixture Topic", "", false)
        .await
        .unwrap();

    let updated = virt.mark_topic_progress(vt.id, 0.6).await.unwrap();
    assert_eq!(updated.progress, 0.6);
    assert_eq!(updated.status, VirtualTopicStatus::Active);

    // a lower value never regresses progress
    let regressed = virt.mark_topic_progress(vt.id, 0.3).await.unwrap();
    assert_eq!(regressed.progress, 0.6);

    let completed = virt.mark_topic_progress(vt.id, 1.0).await.unwrap();
    assert_eq!(completed.progress, 1.0);
    assert_eq!(completed.status, VirtualTopicStatus::Completed);
    assert!(completed.completion_timestamp.is_some());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn unlock_next_topic_respects_order_and_predecessor_completion(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let (module_id, topic_a) = seed_module_and_topic(&content).await;
    let topic_b = content.create_topic(module_id, 1, "Second Topic", "more theory").await.unwrap().id;
    let student_id = Uuid::new_v4();

    let vm = virt.upsert_virtual_module(module_id, student_id).await.unwrap();
    let vt_a = virt
        .create_virtual_topic(vm.id, topic_a, student_id, 0, "First", "", false)
        .await
        .unwrap();
    let vt_b = virt
        .create_virtual_topic(vm.id, topic_b, student_id, 1, "Second", "", true)
        .await
        .unwrap();

    // topic_b is locked behind topic_a, which isn't complete yet
    assert!(virt.unlock_next_topic(vm.id).await.unwrap().is_none());

    virt.mark_topic_progress(vt_a.id, 1.0).await.unwrap();

    let unlocked = virt.unlock_next_topic(vm.id).await.unwrap().expect("topic_b should unlock");
    assert_eq!(unlocked.id, vt_b.id);
    assert!(!unlocked.locked);
    assert_eq!(unlocked.status, VirtualTopicStatus::Active);

    // nothing left to unlock
    assert!(virt.unlock_next_topic(vm.id).await.unwrap().is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn module_progress_excludes_removed_topics(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let (module_id, topic_a) = seed_module_and_topic(&content).await;
    let topic_b = content.create_topic(module_id, 1, "Second Topic", "").await.unwrap().id;
    let student_id = Uuid::new_v4();

    let vm = virt.upsert_virtual_module(module_id, student_id).await.unwrap();
    let vt_a = virt
        .create_virtual_topic(vm.id, topic_a, student_id, 0, "First", "", false)
        .await
        .unwrap();
    let vt_b = virt
        .create_virtual_topic(vm.id, topic_b, student_id, 1, "Second", "", false)
        .await
        .unwrap();

    virt.mark_topic_progress(vt_a.id, 1.0).await.unwrap();
    virt.mark_topic_progress(vt_b.id, 0.0).await.unwrap();

    assert_eq!(virt.module_progress(vm.id).await.unwrap(), 0.5);

    virt.mark_topic_removed(vt_b.id).await.unwrap();
    assert_eq!(virt.module_progress(vm.id).await.unwrap(), 1.0);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn upsert_virtual_topic_content_is_idempotent_on_source(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let (module_id, topic_id) = seed_module_and_topic(&content).await;
    let student_id = Uuid::new_v4();
    let source_content_id = Uuid::new_v4();

    let vm = virt.upsert_virtual_module(module_id, student_id).await.unwrap();
    let vt = virt
        .create_virtual_topic(vm.id, topic_id, student_id, 0, "First", "", false)
        .await
        .unwrap();

    let first = virt
        .upsert_virtual_topic_content(
            vt.id,
            source_content_id,
            ContentType::Slide,
            0,
            serde_json::json!({"text": "v1"}),
            "fp-v1",
        )
        .await
        .unwrap();

    let second = virt
        .upsert_virtual_topic_content(
            vt.id,
            source_content_id,
            ContentType::Slide,
            0,
            serde_json::json!({"text": "v2"}),
            "fp-v2",
        )
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.personalization_fingerprint, "fp-v2");

    let contents = virt.list_virtual_topic_contents(vt.id).await.unwrap();
    assert_eq!(contents.len(), 1);

    Ok(())
}
