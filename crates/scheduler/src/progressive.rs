//! Progressive Scheduler (C7): per-student policy engine deciding which
//! module/topic to enqueue next, under a sliding window of size 2.

use uuid::Uuid;

use platform_domain::{
    GeneratePayload, GenerationStatus, SchedulingOutcome, TaskType, VirtualModule,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_PRIORITY,
};
use platform_queue::{EnqueueOutcome, GenerationQueue};
use platform_storage::{ContentRepository, StorageError, VirtualRepository};

pub struct ProgressiveScheduler {
    content: ContentRepository,
    virtual_store: VirtualRepository,
    queue: GenerationQueue,
}

fn generate_payload(initial_topic_count: Option<i32>, topic_id: Option<Uuid>) -> serde_json::Value {
    serde_json::to_value(GeneratePayload { initial_topic_count, topic_id })
        .expect("GeneratePayload always serializes")
}

impl ProgressiveScheduler {
    pub fn new(content: ContentRepository, virtual_store: VirtualRepository, queue: GenerationQueue) -> Self {
        Self { content, virtual_store, queue }
    }

    /// Entry point for all three triggers in spec §4.7 (bootstrap, trigger-next,
    /// periodic sweep) — each just calls `schedule` for the student/plan pair.
    pub async fn schedule(
        &self,
        plan_id: Uuid,
        student_id: Uuid,
    ) -> Result<SchedulingOutcome, StorageError> {
        let modules = self.content.list_modules_by_plan(plan_id).await?;
        let mut enqueued = Vec::new();
        let mut virtual_modules = Vec::new();

        if modules.is_empty() {
            return Ok(SchedulingOutcome { virtual_modules, enqueued_task_ids: enqueued });
        }

        // Tie-break per module.order ascending, then created_at ascending
        // (list_modules_by_plan is already ordered by "order" asc).
        let mut existing = Vec::with_capacity(modules.len());
        for module in &modules {
            existing.push(self.virtual_store.get_virtual_module_for_student(module.id, student_id).await?);
        }

        let g = existing
            .iter()
            .filter(|vm| matches!(vm.as_ref().map(|v| v.generation_status), Some(GenerationStatus::Ready) | Some(GenerationStatus::Generating)))
            .count();

        for vm in existing.iter().flatten() {
            virtual_modules.push(vm.clone());
        }

        if g == 0 {
            let first = &modules[0];
            let vm = self.virtual_store.upsert_virtual_module(first.id, student_id).await?;
            self.virtual_store
                .set_generation_status(vm.id, GenerationStatus::Generating, None)
                .await?;
            let payload = generate_payload(Some(first.virtualization_settings.initial_batch_size), None);
            if let EnqueueOutcome::Created(task) = self
                .queue
                .enqueue(TaskType::Generate, student_id, first.id, payload, DEFAULT_PRIORITY, DEFAULT_MAX_ATTEMPTS)
                .await?
            {
                enqueued.push(task.task_id);
            }
            virtual_modules = vec![vm];
            return Ok(SchedulingOutcome { virtual_modules, enqueued_task_ids: enqueued });
        }

        // M_current: the VirtualModule with greatest module.order whose progress > 0.
        let mut current: Option<(&platform_domain::Module, VirtualModule)> = None;
        for (module, vm) in modules.iter().zip(existing.iter()) {
            if let Some(vm) = vm {
                if vm.progress > 0.0 {
                    current = Some((module, vm.clone()));
                }
            }
        }

        let Some((current_module, current_vm)) = current else {
            return Ok(SchedulingOutcome { virtual_modules, enqueued_task_ids: enqueued });
        };

        let progress = self.virtual_store.module_progress(current_vm.id).await?;
        if progress < current_module.virtualization_settings.generation_threshold {
            return Ok(SchedulingOutcome { virtual_modules, enqueued_task_ids: enqueued });
        }

        // Find the next module after current_module, by order, with no VM yet
        // and at least one published topic.
        let current_index = modules.iter().position(|m| m.id == current_module.id).unwrap_or(0);
        for (module, vm) in modules.iter().zip(existing.iter()).skip(current_index + 1) {
            if vm.is_some() {
                continue;
            }
            let readiness = self.content.virtualization_readiness(module.id, student_id).await?;
            if !readiness.ready_for_virtualization() {
                continue;
            }

            let new_vm = self.virtual_store.upsert_virtual_module(module.id, student_id).await?;
            self.virtual_store
                .set_generation_status(new_vm.id, GenerationStatus::Generating, None)
                .await?;
            let payload = generate_payload(Some(module.virtualization_settings.initial_batch_size), None);
            if let EnqueueOutcome::Created(task) = self
                .queue
                .enqueue(TaskType::Generate, student_id, module.id, payload, DEFAULT_PRIORITY, DEFAULT_MAX_ATTEMPTS)
                .await?
            {
                enqueued.push(task.task_id);
            }
            virtual_modules.push(new_vm);
            break;
        }

        Ok(SchedulingOutcome { virtual_modules, enqueued_task_ids: enqueued })
    }

    /// Topic-level advancement (spec §4.7): called once a VirtualTopic reaches
    /// `completed`. Unlocks the next sibling and, if it hasn't been generated
    /// yet, enqueues a targeted `generate` task scoped to just that topic.
    pub async fn on_topic_completed(&self, virtual_module_id: Uuid) -> Result<Option<Uuid>, StorageError> {
        let Some(unlocked) = self.virtual_store.unlock_next_topic(virtual_module_id).await? else {
            return Ok(None);
        };

        let existing_contents = self.virtual_store.list_virtual_topic_contents(unlocked.id).await?;
        if !existing_contents.is_empty() {
            return Ok(None);
        }

        let vm = self
            .virtual_store
            .get_virtual_module(virtual_module_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("virtual module {virtual_module_id}")))?;

        let payload = generate_payload(None, Some(unlocked.topic_id));
        match self
            .queue
            .enqueue(TaskType::Generate, vm.student_id, vm.module_id, payload, DEFAULT_PRIORITY, DEFAULT_MAX_ATTEMPTS)
            .await?
        {
            EnqueueOutcome::Created(task) => Ok(Some(task.task_id)),
            EnqueueOutcome::AlreadyQueued => Ok(None),
        }
    }
}
