//! Generation Queue (C5): durable task store, lease/dequeue, heartbeat sweeper, backoff.

pub mod backoff;
pub mod fingerprint;
pub mod sweeper;

use chrono::Utc;
use uuid::Uuid;

use platform_domain::{GenerationTask, TaskType};
use platform_storage::{QueueRepository, StorageError};

pub use sweeper::Sweeper;

/// Thin policy wrapper over `QueueRepository`: computes the dedup fingerprint
/// on enqueue and turns the dedup unique-index hit into "already queued"
/// instead of an error, and turns a lease-expired/failed task into a
/// backoff-scheduled retry or terminal failure.
#[derive(Clone)]
pub struct GenerationQueue {
    repository: QueueRepository,
}

/// Outcome of an enqueue attempt distinguishing a fresh task from a
/// dedup-collapsed one, since callers (the Progressive Scheduler, the Sync
/// Reconciler) need to know whether they actually created new work (§4.5, §4.8).
#[derive(Debug)]
pub enum EnqueueOutcome {
    Created(GenerationTask),
    AlreadyQueued,
}

impl GenerationQueue {
    pub fn new(repository: QueueRepository) -> Self {
        Self { repository }
    }

    pub async fn enqueue(
        &self,
        task_type: TaskType,
        student_id: Uuid,
        module_id: Uuid,
        payload: serde_json::Value,
        priority: i32,
        max_attempts: i32,
    ) -> Result<EnqueueOutcome, StorageError> {
        let digest = fingerprint::fingerprint(&payload);
        match self
            .repository
            .enqueue(task_type, student_id, module_id, payload, &digest, priority, max_attempts)
            .await
        {
            Ok(task) => Ok(EnqueueOutcome::Created(task)),
            Err(StorageError::DuplicateKey(_)) => Ok(EnqueueOutcome::AlreadyQueued),
            Err(err) => Err(err),
        }
    }

    pub async fn get(&self, task_id: Uuid) -> Result<Option<GenerationTask>, StorageError> {
        self.repository.get(task_id).await
    }

    pub async fn lease_next(&self, lease_seconds: i64) -> Result<Option<GenerationTask>, StorageError> {
        self.repository.lease_next(lease_seconds).await
    }

    pub async fn complete(&self, task_id: Uuid) -> Result<(), StorageError> {
        self.repository.complete(task_id).await
    }

    pub async fn cancel(&self, task_id: Uuid) -> Result<(), StorageError> {
        self.repository.cancel(task_id).await
    }

    /// Records a failed attempt. A task is scheduled for retry under backoff
    /// until `attempts >= max_attempts`, after which `requeue_or_fail` marks
    /// it permanently `failed` regardless of the `available_at` we pass here.
    pub async fn fail_attempt(&self, task: &GenerationTask, error: &str) -> Result<GenerationTask, StorageError> {
        let retry_at = backoff::available_at(task.attempts, Utc::now());
        self.repository.requeue_or_fail(task.task_id, error, retry_at).await
    }

    pub async fn list_by_module(&self, module_id: Uuid) -> Result<Vec<GenerationTask>, StorageError> {
        self.repository.list_by_module(module_id).await
    }

    /// Terminal failure with no retry — budget-denied and logic failures
    /// (§4.6) skip backoff entirely rather than waiting out `max_attempts`.
    pub async fn fail_permanently(&self, task_id: Uuid, error: &str) -> Result<GenerationTask, StorageError> {
        self.repository.fail_permanently(task_id, error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_deterministic() {
        let p = json!({"topic_id": "abc"});
        assert_eq!(fingerprint::fingerprint(&p), fingerprint::fingerprint(&p));
    }
}
