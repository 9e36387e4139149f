//! Sync Reconciler (C8): propagates instructor-side Content Store mutations
//! into already-generated Virtual Store structures by enqueueing
//! `sync_content_change` tasks, per spec §4.8's mutation table.

use uuid::Uuid;

use platform_domain::{
    SyncContentChangePayload, SyncKind, TaskType, DEFAULT_MAX_ATTEMPTS, DEFAULT_PRIORITY,
};
use platform_queue::{EnqueueOutcome, GenerationQueue};
use platform_storage::{ContentRepository, StorageError, VirtualRepository};

/// Reconciler tasks preempt fresh generation work by two priority levels
/// (lower number = more urgent) per spec §4.8.
const SYNC_PRIORITY: i32 = DEFAULT_PRIORITY + 2;

pub struct SyncReconciler {
    content: ContentRepository,
    virtual_store: VirtualRepository,
    queue: GenerationQueue,
}

impl SyncReconciler {
    pub fn new(content: ContentRepository, virtual_store: VirtualRepository, queue: GenerationQueue) -> Self {
        Self { content, virtual_store, queue }
    }

    fn payload(kind: SyncKind, topic_id: Option<Uuid>, content_id: Option<Uuid>) -> serde_json::Value {
        serde_json::to_value(SyncContentChangePayload { kind, topic_id, content_id })
            .expect("SyncContentChangePayload always serializes")
    }

    async fn enqueue_one(
        &self,
        student_id: Uuid,
        module_id: Uuid,
        kind: SyncKind,
        topic_id: Option<Uuid>,
        content_id: Option<Uuid>,
    ) -> Result<Option<Uuid>, StorageError> {
        let payload = Self::payload(kind, topic_id, content_id);
        match self
            .queue
            .enqueue(TaskType::SyncContentChange, student_id, module_id, payload, SYNC_PRIORITY, DEFAULT_MAX_ATTEMPTS)
            .await?
        {
            EnqueueOutcome::Created(task) => Ok(Some(task.task_id)),
            EnqueueOutcome::AlreadyQueued => Ok(None),
        }
    }

    /// Topic published (false → true): `publish_topic` already returns the
    /// student ids with a VirtualModule over the parent module in
    /// `{ready, generating}` — fan out one `kind: publish` task each.
    pub async fn topic_published(&self, topic_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let topic = self
            .content
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("topic {topic_id}")))?;
        let affected_students = self.content.publish_topic(topic_id).await?;

        let mut enqueued = Vec::new();
        for student_id in affected_students {
            if let Some(id) = self
                .enqueue_one(student_id, topic.module_id, SyncKind::Publish, Some(topic_id), None)
                .await?
            {
                enqueued.push(id);
            }
        }
        Ok(enqueued)
    }

    /// Topic unpublished: `unpublish_topic` doesn't carry the affected set, so
    /// the reconciler fans out to every student with an active VirtualModule
    /// over the parent module directly.
    pub async fn topic_unpublished(&self, topic_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let topic = self
            .content
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("topic {topic_id}")))?;
        self.content.unpublish_topic(topic_id).await?;

        let students = self.virtual_store.list_students_with_active_vm(topic.module_id).await?;
        let mut enqueued = Vec::new();
        for student_id in students {
            if let Some(id) = self
                .enqueue_one(student_id, topic.module_id, SyncKind::Retract, Some(topic_id), None)
                .await?
            {
                enqueued.push(id);
            }
        }
        Ok(enqueued)
    }

    /// TopicContent edited: every active VirtualTopicContent derived from
    /// `source_content_id` is conservatively considered stale — there's no
    /// separate content-version hash on the source to diff against, so a
    /// source edit always triggers a `refresh` rather than only on an
    /// observed fingerprint mismatch.
    pub async fn content_edited(&self, source_content_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let instances = self.virtual_store.list_virtual_topic_contents_by_source(source_content_id).await?;
        let mut enqueued = Vec::new();
        for instance in instances {
            let Some((student_id, module_id)) = self.resolve_student_module(instance.virtual_topic_id).await? else {
                continue;
            };
            if let Some(id) = self
                .enqueue_one(student_id, module_id, SyncKind::Refresh, None, Some(source_content_id))
                .await?
            {
                enqueued.push(id);
            }
        }
        Ok(enqueued)
    }

    /// TopicContent added: fan out to every student with an active
    /// VirtualModule over the topic's parent module.
    pub async fn content_added(&self, topic_id: Uuid, content_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let topic = self
            .content
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("topic {topic_id}")))?;
        let students = self.virtual_store.list_students_with_active_vm(topic.module_id).await?;

        let mut enqueued = Vec::new();
        for student_id in students {
            if let Some(id) = self
                .enqueue_one(student_id, topic.module_id, SyncKind::Add, Some(topic_id), Some(content_id))
                .await?
            {
                enqueued.push(id);
            }
        }
        Ok(enqueued)
    }

    /// TopicContent deleted: every active VirtualTopicContent derived from it
    /// gets a targeted `remove` task; the worker soft-deletes, preserving
    /// ContentResult audit history (spec §4.8).
    pub async fn content_deleted(&self, source_content_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let instances = self.virtual_store.list_virtual_topic_contents_by_source(source_content_id).await?;
        let mut enqueued = Vec::new();
        for instance in instances {
            let Some((student_id, module_id)) = self.resolve_student_module(instance.virtual_topic_id).await? else {
                continue;
            };
            if let Some(id) = self
                .enqueue_one(student_id, module_id, SyncKind::Remove, None, Some(source_content_id))
                .await?
            {
                enqueued.push(id);
            }
        }
        Ok(enqueued)
    }

    async fn resolve_student_module(&self, virtual_topic_id: Uuid) -> Result<Option<(Uuid, Uuid)>, StorageError> {
        let Some(topic) = self.virtual_store.get_virtual_topic(virtual_topic_id).await? else {
            return Ok(None);
        };
        let Some(vm) = self.virtual_store.get_virtual_module(topic.virtual_module_id).await? else {
            return Ok(None);
        };
        Ok(Some((vm.student_id, vm.module_id)))
    }
}
