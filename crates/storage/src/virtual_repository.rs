//! Virtual Store (C2) storage: per-student materializations of Content Store entities.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::error::DatabaseError;
use uuid::Uuid;

use platform_domain::{
    ContentResult, ContentStatus, ContentType, GenerationStatus, VirtualModule, VirtualTopic,
    VirtualTopicContent, VirtualTopicStatus,
};

use crate::StorageError;

#[derive(Clone)]
pub struct VirtualRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct VirtualModuleRow {
    id: Uuid,
    module_id: Uuid,
    student_id: Uuid,
    generation_status: String,
    progress: f64,
    locked: bool,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_generation_status(s: &str) -> GenerationStatus {
    match s {
        "generating" => GenerationStatus::Generating,
        "ready" => GenerationStatus::Ready,
        "failed" => GenerationStatus::Failed,
        _ => GenerationStatus::Pending,
    }
}

fn generation_status_str(s: GenerationStatus) -> &'static str {
    match s {
        GenerationStatus::Pending => "pending",
        GenerationStatus::Generating => "generating",
        GenerationStatus::Ready => "ready",
        GenerationStatus::Failed => "failed",
    }
}

impl From<VirtualModuleRow> for VirtualModule {
    fn from(row: VirtualModuleRow) -> Self {
        VirtualModule {
            id: row.id,
            module_id: row.module_id,
            student_id: row.student_id,
            generation_status: parse_generation_status(&row.generation_status),
            progress: row.progress,
            locked: row.locked,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VirtualTopicRow {
    id: Uuid,
    virtual_module_id: Uuid,
    topic_id: Uuid,
    student_id: Uuid,
    order: i32,
    name: String,
    description: String,
    locked: bool,
    status: String,
    progress: f64,
    completion_timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_virtual_topic_status(s: &str) -> VirtualTopicStatus {
    match s {
        "active" => VirtualTopicStatus::Active,
        "completed" => VirtualTopicStatus::Completed,
        "removed" => VirtualTopicStatus::Removed,
        _ => VirtualTopicStatus::Locked,
    }
}


impl From<VirtualTopicRow> for VirtualTopic {
    fn from(row: VirtualTopicRow) -> Self {
        VirtualTopic {
            id: row.id,
            virtual_module_id: row.virtual_module_id,
            topic_id: row.topic_id,
            student_id: row.student_id,
            order: row.order,
            name: row.name,
            description: row.description,
            locked: row.locked,
            status: parse_virtual_topic_status(&row.status),
            progress: row.progress,
            completion_timestamp: row.completion_timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VirtualTopicContentRow {
    id: Uuid,
    virtual_topic_id: Uuid,
    source_content_id: Uuid,
    content_type: String,
    order: i32,
    payload: serde_json::Value,
    personalization_fingerprint: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VirtualTopicContentRow> for VirtualTopicContent {
    fn from(row: VirtualTopicContentRow) -> Self {
        VirtualTopicContent {
            id: row.id,
            virtual_topic_id: row.virtual_topic_id,
            source_content_id: row.source_content_id,
            content_type: ContentType::from_str(&row.content_type),
            order: row.order,
            payload: row.payload,
            personalization_fingerprint: row.personalization_fingerprint,
            status: if row.status == "deleted" {
                ContentStatus::Deleted
            } else {
                ContentStatus::Active
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const VTC_COLUMNS: &str = r#"id, virtual_topic_id, source_content_id, content_type, "order", payload, personalization_fingerprint, status, created_at, updated_at"#;

#[derive(sqlx::FromRow)]
struct ContentResultRow {
    id: Uuid,
    student_id: Uuid,
    virtual_content_id: Uuid,
    score: f64,
    completion_percentage: f64,
    created_at: DateTime<Utc>,
}

impl From<ContentResultRow> for ContentResult {
    fn from(row: ContentResultRow) -> Self {
        ContentResult {
            id: row.id,
            student_id: row.student_id,
            virtual_content_id: row.virtual_content_id,
            score: row.score,
            completion_percentage: row.completion_percentage,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PlanStudentRow {
    plan_id: Uuid,
    student_id: Uuid,
}

impl VirtualRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a student's VirtualModule if absent, otherwise returns the
    /// existing one untouched — bootstrap is idempotent per spec §7.
    pub async fn upsert_virtual_module(
        &self,
        module_id: Uuid,
        student_id: Uuid,
    ) -> Result<VirtualModule, StorageError> {
        let row = sqlx::query_as::<_, VirtualModuleRow>(
            r#"
            INSERT INTO virtual_modules (id, module_id, student_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (module_id, student_id) DO UPDATE SET updated_at = virtual_modules.updated_at
            RETURNING id, module_id, student_id, generation_status, progress, locked, failure_reason, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Students with a VirtualModule over `module_id` already in `generating`
    /// or `ready` — the audience for a `sync_content_change` fan-out (§4.8).
    pub async fn list_students_with_active_vm(&self, module_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT student_id FROM virtual_modules WHERE module_id = $1 AND generation_status IN ('generating', 'ready')",
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Every distinct (plan, student) pair with at least one VirtualModule not
    /// yet `completed` or `failed` — the periodic sweep's worklist (§4.7's
    /// third trigger), since those are the only students who could still have
    /// a missed module-advancement transition to catch up on.
    pub async fn list_active_plan_student_pairs(&self) -> Result<Vec<(Uuid, Uuid)>, StorageError> {
        let rows: Vec<PlanStudentRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT m.plan_id AS plan_id, vm.student_id AS student_id
            FROM virtual_modules vm
            JOIN modules m ON m.id = vm.module_id
            WHERE vm.generation_status IN ('generating', 'ready')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.plan_id, r.student_id)).collect())
    }

    pub async fn get_virtual_module(&self, id: Uuid) -> Result<Option<VirtualModule>, StorageError> {
        let row = sqlx::query_as::<_, VirtualModuleRow>(
            r#"SELECT id, module_id, student_id, generation_status, progress, locked, failure_reason, created_at, updated_at
               FROM virtual_modules WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn get_virtual_module_for_student(
        &self,
        module_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<VirtualModule>, StorageError> {
        let row = sqlx::query_as::<_, VirtualModuleRow>(
            r#"SELECT id, module_id, student_id, generation_status, progress, locked, failure_reason, created_at, updated_at
               FROM virtual_modules WHERE module_id = $1 AND student_id = $2"#,
        )
        .bind(module_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn list_virtual_modules_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<VirtualModule>, StorageError> {
        let rows = sqlx::query_as::<_, VirtualModuleRow>(
            r#"SELECT id, module_id, student_id, generation_status, progress, locked, failure_reason, created_at, updated_at
               FROM virtual_modules WHERE student_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn set_generation_status(
        &self,
        id: Uuid,
        status: GenerationStatus,
        failure_reason: Option<&str>,
    ) -> Result<VirtualModule, StorageError> {
        let row = sqlx::query_as::<_, VirtualModuleRow>(
            r#"
            UPDATE virtual_modules
            SET generation_status = $2, locked = ($2 <> 'ready'), failure_reason = $3, updated_at = now()
            WHERE id = $1
            RETURNING id, module_id, student_id, generation_status, progress, locked, failure_reason, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(generation_status_str(status))
        .bind(failure_reason)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("virtual module {id}")))?;

        Ok(row.into())
    }

    /// Derived module progress — `AVG(progress)` over virtual topics, never
    /// stored redundantly on the module row (§4.2).
    /// Derived module progress, excluding topics retracted by `sync_content_change(kind=retract)` —
    /// a removed topic no longer counts toward the denominator (§4.2, §4.8).
    pub async fn module_progress(&self, virtual_module_id: Uuid) -> Result<f64, StorageError> {
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(progress) FROM virtual_topics WHERE virtual_module_id = $1 AND status <> 'removed'",
        )
        .bind(virtual_module_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(avg.unwrap_or(0.0))
    }

    pub async fn get_virtual_topic(&self, id: Uuid) -> Result<Option<VirtualTopic>, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"SELECT id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
               FROM virtual_topics WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn get_virtual_topic_by_topic(
        &self,
        virtual_module_id: Uuid,
        topic_id: Uuid,
    ) -> Result<Option<VirtualTopic>, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"SELECT id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
               FROM virtual_topics WHERE virtual_module_id = $1 AND topic_id = $2"#,
        )
        .bind(virtual_module_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Marks a VirtualTopic `removed` — `sync_content_change(kind=retract)`
    /// after an instructor unpublishes its source topic (§4.8). Progress is
    /// left untouched; `module_progress` excludes removed topics from its mean.
    pub async fn mark_topic_removed(&self, virtual_topic_id: Uuid) -> Result<VirtualTopic, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"
            UPDATE virtual_topics SET status = 'removed', updated_at = now()
            WHERE id = $1
            RETURNING id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
            "#,
        )
        .bind(virtual_topic_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("virtual topic {virtual_topic_id}")))?;

        Ok(row.into())
    }

    pub async fn create_virtual_topic(
        &self,
        virtual_module_id: Uuid,
        topic_id: Uuid,
        student_id: Uuid,
        order: i32,
        name: &str,
        description: &str,
        locked: bool,
    ) -> Result<VirtualTopic, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"
            INSERT INTO virtual_topics (id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CASE WHEN $8 THEN 'locked' ELSE 'active' END)
            ON CONFLICT (virtual_module_id, topic_id) DO UPDATE SET updated_at = virtual_topics.updated_at
            RETURNING id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(virtual_module_id)
        .bind(topic_id)
        .bind(student_id)
        .bind(order)
        .bind(name)
        .bind(description)
        .bind(locked)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn list_virtual_topics(
        &self,
        virtual_module_id: Uuid,
    ) -> Result<Vec<VirtualTopic>, StorageError> {
        let rows = sqlx::query_as::<_, VirtualTopicRow>(
            r#"SELECT id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
               FROM virtual_topics WHERE virtual_module_id = $1 ORDER BY "order" ASC"#,
        )
        .bind(virtual_module_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Monotone progress update: clamps to `max(old, new)`, flips to
    /// `completed` and stamps `completion_timestamp` once progress reaches
    /// `1.0`. A lower incoming value is a silent no-op, never a regression.
    pub async fn mark_topic_progress(
        &self,
        virtual_topic_id: Uuid,
        new_progress: f64,
    ) -> Result<VirtualTopic, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"
            UPDATE virtual_topics
            SET progress = GREATEST(progress, $2),
                status = CASE WHEN GREATEST(progress, $2) >= 1.0 THEN 'completed'
                              WHEN locked THEN 'locked' ELSE 'active' END,
                completion_timestamp = CASE WHEN GREATEST(progress, $2) >= 1.0 AND completion_timestamp IS NULL
                                             THEN now() ELSE completion_timestamp END,
                updated_at = now()
            WHERE id = $1
            RETURNING id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
            "#,
        )
        .bind(virtual_topic_id)
        .bind(new_progress)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("virtual topic {virtual_topic_id}")))?;

        Ok(row.into())
    }

    /// Picks the lowest-ordered locked topic whose immediate predecessor is
    /// completed (or which is the first topic) and unlocks it, atomically,
    /// inside one transaction to avoid a race between two completions.
    pub async fn unlock_next_topic(
        &self,
        virtual_module_id: Uuid,
    ) -> Result<Option<VirtualTopic>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let candidate = sqlx::query_as::<_, VirtualTopicRow>(
            r#"
            SELECT vt.id, vt.virtual_module_id, vt.topic_id, vt.student_id, vt."order", vt.name,
                   vt.description, vt.locked, vt.status, vt.progress, vt.completion_timestamp,
                   vt.created_at, vt.updated_at
            FROM virtual_topics vt
            WHERE vt.virtual_module_id = $1 AND vt.locked = true
              AND NOT EXISTS (
                  SELECT 1 FROM virtual_topics prev
                  WHERE prev.virtual_module_id = $1 AND prev."order" < vt."order" AND prev.status NOT IN ('completed', 'removed')
              )
            ORDER BY vt."order" ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(virtual_module_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, VirtualTopicRow>(
            r#"
            UPDATE virtual_topics SET locked = false, status = 'active', updated_at = now()
            WHERE id = $1
            RETURNING id, virtual_module_id, topic_id, student_id, "order", name, description, locked, status, progress, completion_timestamp, created_at, updated_at
            "#,
        )
        .bind(candidate.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    pub async fn upsert_virtual_topic_content(
        &self,
        virtual_topic_id: Uuid,
        source_content_id: Uuid,
        content_type: ContentType,
        order: i32,
        payload: serde_json::Value,
        personalization_fingerprint: &str,
    ) -> Result<VirtualTopicContent, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicContentRow>(&format!(
            r#"
            INSERT INTO virtual_topic_contents
                (id, virtual_topic_id, source_content_id, content_type, "order", payload, personalization_fingerprint, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'active')
            ON CONFLICT (virtual_topic_id, source_content_id) DO UPDATE
                SET payload = EXCLUDED.payload,
                    personalization_fingerprint = EXCLUDED.personalization_fingerprint,
                    status = 'active',
                    updated_at = now()
            RETURNING {VTC_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(virtual_topic_id)
        .bind(source_content_id)
        .bind(content_type.as_str())
        .bind(order)
        .bind(payload)
        .bind(personalization_fingerprint)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get_virtual_topic_content(&self, id: Uuid) -> Result<Option<VirtualTopicContent>, StorageError> {
        let row = sqlx::query_as::<_, VirtualTopicContentRow>(&format!(
            r#"SELECT {VTC_COLUMNS} FROM virtual_topic_contents WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn list_virtual_topic_contents(
        &self,
        virtual_topic_id: Uuid,
    ) -> Result<Vec<VirtualTopicContent>, StorageError> {
        let rows = sqlx::query_as::<_, VirtualTopicContentRow>(&format!(
            r#"SELECT {VTC_COLUMNS}
               FROM virtual_topic_contents WHERE virtual_topic_id = $1 AND status = 'active'
               ORDER BY content_type, "order" ASC"#
        ))
        .bind(virtual_topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// All active virtual contents across every student that were derived
    /// from `source_content_id` — the set a `TopicContent` edit must chase
    /// down to either refresh in place or flag for a `sync_content_change` (§4.8).
    pub async fn list_virtual_topic_contents_by_source(
        &self,
        source_content_id: Uuid,
    ) -> Result<Vec<VirtualTopicContent>, StorageError> {
        let rows = sqlx::query_as::<_, VirtualTopicContentRow>(&format!(
            r#"SELECT {VTC_COLUMNS}
               FROM virtual_topic_contents WHERE source_content_id = $1 AND status = 'active'"#
        ))
        .bind(source_content_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft-deletes every virtual counterpart of a removed `TopicContent`.
    /// Never touches `content_results` — audit retention per spec §4.8.
    pub async fn soft_delete_virtual_topic_content_by_source(
        &self,
        source_content_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE virtual_topic_contents SET status = 'deleted', updated_at = now() WHERE source_content_id = $1 AND status = 'active'",
        )
        .bind(source_content_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Same, scoped to one student's virtual topic — what a worker processing
    /// a single `sync_content_change(kind=remove)` task actually wants, since
    /// the broad form above would touch every other student's copy too.
    pub async fn soft_delete_virtual_topic_content_for_topic(
        &self,
        virtual_topic_id: Uuid,
        source_content_id: Uuid,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE virtual_topic_contents SET status = 'deleted', updated_at = now() WHERE virtual_topic_id = $1 AND source_content_id = $2 AND status = 'active'",
        )
        .bind(virtual_topic_id)
        .bind(source_content_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Dedupes on `(student_id, virtual_content_id, minute bucket)` via the
    /// unique index; a resubmission within the same minute is idempotent —
    /// the existing row is fetched and returned instead of inserting again.
    pub async fn submit_content_result(
        &self,
        student_id: Uuid,
        virtual_content_id: Uuid,
        score: f64,
        completion_percentage: f64,
    ) -> Result<ContentResult, StorageError> {
        let inserted = sqlx::query_as::<_, ContentResultRow>(
            r#"
            INSERT INTO content_results (id, student_id, virtual_content_id, score, completion_percentage)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, student_id, virtual_content_id, score, completion_percentage, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(virtual_content_id)
        .bind(score)
        .bind(completion_percentage)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(row) => Ok(row.into()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                let existing = sqlx::query_as::<_, ContentResultRow>(
                    r#"
                    SELECT id, student_id, virtual_content_id, score, completion_percentage, created_at
                    FROM content_results
                    WHERE student_id = $1 AND virtual_content_id = $2
                      AND date_trunc('minute', created_at) = date_trunc('minute', now())
                    "#,
                )
                .bind(student_id)
                .bind(virtual_content_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(existing.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
