#![cfg(feature = "postgres-tests")]

use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{GenerationStatus, VirtualizationSettings};
use platform_queue::GenerationQueue;
use platform_scheduler::ProgressiveScheduler;
use platform_storage::{ContentRepository, QueueRepository, VirtualRepository};

async fn make_scheduler(pool: PgPool) -> (ProgressiveScheduler, ContentRepository, VirtualRepository) {
    let content = ContentRepository::new(pool.clone());
    let virtual_store = VirtualRepository::new(pool.clone());
    let queue = GenerationQueue::new(QueueRepository::new(pool));
    (
        ProgressiveScheduler::new(content.clone(), virtual_store.clone(), queue),
        content,
        virtual_store,
    )
}

#[sqlx::test(migrations = "../../migrations")]
async fn bootstrap_generates_the_first_module_when_no_vm_exists(pool: PgPool) -> Result<(), sqlx::Error> {
    let (scheduler, content, _virt) = make_scheduler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let first = content
        .create_module(plan.id, 0, "Module 1", VirtualizationSettings { initial_batch_size: 2, generation_threshold: 0.8 })
        .await
        .unwrap();
    content
        .create_module(plan.id, 1, "Module 2", VirtualizationSettings { initial_batch_size: 2, generation_threshold: 0.8 })
        .await
        .unwrap();

    let student_id = Uuid::new_v4();
    let outcome = scheduler.schedule(plan.id, student_id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    assert_eq!(outcome.virtual_modules.len(), 1);
    assert_eq!(outcome.virtual_modules[0].module_id, first.id);
    assert_eq!(outcome.virtual_modules[0].generation_status, GenerationStatus::Generating);
    assert_eq!(outcome.enqueued_task_ids.len(), 1);

    // calling schedule again before the first module is ready does nothing new
    let again = scheduler.schedule(plan.id, student_id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(again.enqueued_task_ids.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn advances_to_next_module_once_threshold_and_readiness_are_met(pool: PgPool) -> Result<(), sqlx::Error> {
    let (scheduler, content, virt) = make_scheduler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let first = content
        .create_module(plan.id, 0, "Module 1", VirtualizationSettings { initial_batch_size: 2, generation_threshold: 0.8 })
        .await
        .unwrap();
    let second = content
        .create_module(plan.id, 1, "Module 2", VirtualizationSettings { initial_batch_size: 2, generation_threshold: 0.8 })
        .await
        .unwrap();
    let second_topic = content.create_topic(second.id, 0, "Topic", "theory").await.unwrap();
    content.publish_topic(second_topic.id).await.unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(first.id, student_id).await.unwrap();
    virt.set_generation_status(vm.id, GenerationStatus::Ready, None).await.unwrap();
    let vt = virt
        .create_virtual_topic(vm.id, content.create_topic(first.id, 0, "T1", "theory").await.unwrap().id, student_id, 0, "T1", "", false)
        .await
        .unwrap();
    virt.mark_topic_progress(vt.id, 1.0).await.unwrap();

    let outcome = scheduler.schedule(plan.id, student_id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    assert!(outcome.virtual_modules.iter().any(|m| m.module_id == second.id));
    assert_eq!(outcome.enqueued_task_ids.len(), 1);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn on_topic_completed_unlocks_and_enqueues_targeted_generation(pool: PgPool) -> Result<(), sqlx::Error> {
    let (scheduler, content, virt) = make_scheduler(pool).await;

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.unwrap();
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .unwrap();
    let topic_a = content.create_topic(module.id, 0, "A", "theory").await.unwrap();
    let topic_b = content.create_topic(module.id, 1, "B", "theory").await.unwrap();

    let student_id = Uuid::new_v4();
    let vm = virt.upsert_virtual_module(module.id, student_id).await.unwrap();
    let vt_a = virt.create_virtual_topic(vm.id, topic_a.id, student_id, 0, "A", "", false).await.unwrap();
    virt.create_virtual_topic(vm.id, topic_b.id, student_id, 1, "B", "", true).await.unwrap();

    virt.mark_topic_progress(vt_a.id, 1.0).await.unwrap();

    let enqueued = scheduler.on_topic_completed(vm.id).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(enqueued.is_some());

    let unlocked = virt.get_virtual_topic_by_topic(vm.id, topic_b.id).await.unwrap().unwrap();
    assert!(!unlocked.locked);

    Ok(())
}
