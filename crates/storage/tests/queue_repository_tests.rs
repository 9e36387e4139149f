#![cfg(feature = "postgres-tests")]

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{TaskStatus, TaskType};
use platform_storage::QueueRepository;

#[sqlx::test(migrations = "../../migrations")]
async fn enqueue_dedupes_on_fingerprint_while_in_flight(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = QueueRepository::new(pool);
    let student_id = Uuid::new_v4();
    let module_id = Uuid::new_v4();

    repo.enqueue(
        TaskType::Generate,
        student_id,
        module_id,
        serde_json::json!({}),
        "fp-1",
        5,
        3,
    )
    .await
    .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let duplicate = repo
        .enqueue(
            TaskType::Generate,
            student_id,
            module_id,
            serde_json::json!({}),
            "fp-1",
            5,
            3,
        )
        .await;

    assert!(duplicate.is_err());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn lease_next_claims_highest_priority_oldest_task(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = QueueRepository::new(pool);
    let student_id = Uuid::new_v4();
    let module_id = Uuid::new_v4();

    let low_priority = repo
        .enqueue(TaskType::Generate, student_id, module_id, serde_json::json!({}), "fp-low", 9, 3)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let high_priority = repo
        .enqueue(TaskType::Update, student_id, module_id, serde_json::json!({}), "fp-high", 1, 3)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let leased = repo
        .lease_next(300)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?
        .expect("a pending task should be leased");

    assert_eq!(leased.task_id, high_priority.task_id);
    assert_eq!(leased.status, TaskStatus::Processing);
    assert_eq!(leased.attempts, 1);
    assert!(leased.lease_expires_at.is_some());

    let next = repo
        .lease_next(300)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?
        .expect("the remaining task should lease next");
    assert_eq!(next.task_id, low_priority.task_id);

    assert!(repo.lease_next(300).await.unwrap().is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn requeue_or_fail_fails_permanently_after_max_attempts(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = QueueRepository::new(pool);
    let student_id = Uuid::new_v4();
    let module_id = Uuid::new_v4();

    let task = repo
        .enqueue(TaskType::Generate, student_id, module_id, serde_json::json!({}), "fp-retry", 5, 1)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    repo.lease_next(300).await.unwrap();

    let requeued = repo
        .requeue_or_fail(task.task_id, "provider timeout", Utc::now())
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    // attempts (1) >= max_attempts (1): permanently failed, not retried
    assert_eq!(requeued.status, TaskStatus::Failed);
    assert_eq!(requeued.last_error.as_deref(), Some("provider timeout"));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn reclaim_expired_leases_returns_tasks_to_pending(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = QueueRepository::new(pool);
    let student_id = Uuid::new_v4();
    let module_id = Uuid::new_v4();

    repo.enqueue(TaskType::Generate, student_id, module_id, serde_json::json!({}), "fp-expire", 5, 3)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    // lease with a negative duration so it is already expired
    repo.lease_next(-1).await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let reclaimed = repo
        .reclaim_expired_leases()
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(reclaimed, 1);

    let leased_again = repo
        .lease_next(300)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(leased_again.is_some());

    Ok(())
}
