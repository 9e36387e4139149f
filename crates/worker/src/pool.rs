//! The worker pool: N long-lived tasks draining the Generation Queue (§4.6).
//! No per-task thread spawn — a fixed pool leases, dispatches, and sleeps
//! jittered when the queue runs dry, mirroring the sweeper's run-loop shape.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use platform_budget::BudgetGate;
use platform_domain::{GenerationStatus, GenerationTask, TaskType};
use platform_llm::LlmProvider;
use platform_queue::GenerationQueue;
use platform_scheduler::ProgressiveScheduler;
use platform_storage::{ContentRepository, VirtualRepository};

use crate::dispatch;
use crate::error::WorkerError;

#[derive(Clone)]
pub struct WorkerDeps {
    pub content: ContentRepository,
    pub virtual_store: VirtualRepository,
    pub queue: GenerationQueue,
    pub budget: Arc<BudgetGate>,
    pub llm: Arc<dyn LlmProvider>,
    pub scheduler: Arc<ProgressiveScheduler>,
    pub lease_seconds: i64,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(worker_count: usize, deps: WorkerDeps) -> Self {
        let handles = (0..worker_count)
            .map(|id| {
                let deps = deps.clone();
                tokio::spawn(async move { run(id, deps).await })
            })
            .collect();
        Self { handles }
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

async fn run(worker_id: usize, deps: WorkerDeps) {
    loop {
        match deps.queue.lease_next(deps.lease_seconds).await {
            Ok(Some(task)) => process_task(&deps, task).await,
            Ok(None) => {
                let jitter_ms = rand::thread_rng().gen_range(500..=1500);
                tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
            }
            Err(err) => {
                tracing::error!(worker_id, error = %err, "worker lease failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn process_task(deps: &WorkerDeps, task: GenerationTask) {
    let task_id = task.task_id;
    match dispatch::handle(deps, &task).await {
        Ok(()) => {
            if let Err(err) = deps.queue.complete(task_id).await {
                tracing::error!(%task_id, error = %err, "failed to mark task complete");
                return;
            }
            if matches!(task.task_type, TaskType::Generate) {
                if let Err(err) = mark_module_ready(deps, &task).await {
                    tracing::error!(%task_id, error = %err, "failed to mark virtual module ready");
                }
            }
        }
        Err(WorkerError::Transient(message)) => {
            tracing::warn!(%task_id, %message, "transient worker failure, will retry");
            if let Err(err) = deps.queue.fail_attempt(&task, &message).await {
                tracing::error!(%task_id, error = %err, "failed to record retry attempt");
            }
        }
        Err(WorkerError::BudgetDenied(message)) => {
            tracing::warn!(%task_id, %message, "task denied by budget gate, not retrying");
            if let Err(err) = deps.queue.fail_permanently(task_id, &message).await {
                tracing::error!(%task_id, error = %err, "failed to record permanent failure");
            }
            fail_module_if_generate(deps, &task, &message).await;
        }
        Err(WorkerError::NotFound(message)) => {
            tracing::info!(%task_id, %message, "task references a deleted entity, cancelling");
            if let Err(err) = deps.queue.cancel(task_id).await {
                tracing::error!(%task_id, error = %err, "failed to record cancellation");
            }
        }
        Err(WorkerError::Logic(message)) => {
            tracing::error!(%task_id, %message, "task failed with a logic error, not retrying");
            if let Err(err) = deps.queue.fail_permanently(task_id, &message).await {
                tracing::error!(%task_id, error = %err, "failed to record permanent failure");
            }
            fail_module_if_generate(deps, &task, &message).await;
        }
    }
}

async fn mark_module_ready(deps: &WorkerDeps, task: &GenerationTask) -> Result<(), platform_storage::StorageError> {
    if let Some(vm) = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await?
    {
        deps.virtual_store.set_generation_status(vm.id, GenerationStatus::Ready, None).await?;
    }
    Ok(())
}

async fn fail_module_if_generate(deps: &WorkerDeps, task: &GenerationTask, reason: &str) {
    if !matches!(task.task_type, TaskType::Generate) {
        return;
    }
    if let Ok(Some(vm)) = deps
        .virtual_store
        .get_virtual_module_for_student(task.module_id, task.student_id)
        .await
    {
        let _ = deps
            .virtual_store
            .set_generation_status(vm.id, GenerationStatus::Failed, Some(reason))
            .await;
    }
}
