//! Content Store (C1): study plans, modules, topics, typed topic-contents.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{
    CascadeSummary, ContentStatus, ContentType, GenerationStatus, Module, PlanStatus,
    PublishedTopicInventory, StudyPlan, Topic, TopicContent, VirtualizationReadiness,
    VirtualizationSettings,
};

use crate::StorageError;

#[derive(Clone)]
pub struct ContentRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct StudyPlanRow {
    id: Uuid,
    author_id: Uuid,
    workspace_id: Option<Uuid>,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<StudyPlanRow> for StudyPlan {
    fn from(row: StudyPlanRow) -> Self {
        let status = match row.status.as_str() {
            "active" => PlanStatus::Active,
            "archived" => PlanStatus::Archived,
            _ => PlanStatus::Draft,
        };
        StudyPlan {
            id: row.id,
            author_id: row.author_id,
            workspace_id: row.workspace_id,
            title: row.title,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: Uuid,
    plan_id: Uuid,
    order: i32,
    title: String,
    initial_batch_size: i32,
    generation_threshold: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ModuleRow> for Module {
    fn from(row: ModuleRow) -> Self {
        Module {
            id: row.id,
            plan_id: row.plan_id,
            order: row.order,
            title: row.title,
            virtualization_settings: VirtualizationSettings {
                initial_batch_size: row.initial_batch_size,
                generation_threshold: row.generation_threshold,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TopicRow {
    id: Uuid,
    module_id: Uuid,
    order: i32,
    name: String,
    theory: String,
    published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TopicRow> for Topic {
    fn from(row: TopicRow) -> Self {
        Topic {
            id: row.id,
            module_id: row.module_id,
            order: row.order,
            name: row.name,
            theory: row.theory,
            published: row.published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TopicContentRow {
    id: Uuid,
    topic_id: Uuid,
    content_type: String,
    order: i32,
    parent_content_id: Option<Uuid>,
    content: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TopicContentRow> for TopicContent {
    fn from(row: TopicContentRow) -> Self {
        TopicContent {
            id: row.id,
            topic_id: row.topic_id,
            content_type: ContentType::from_str(&row.content_type),
            order: row.order,
            parent_content_id: row.parent_content_id,
            content: row.content,
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

impl ContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_plan(
        &self,
        author_id: Uuid,
        workspace_id: Option<Uuid>,
        title: &str,
    ) -> Result<StudyPlan, StorageError> {
        let row = sqlx::query_as::<_, StudyPlanRow>(
            r#"
            INSERT INTO study_plans (id, author_id, workspace_id, title, status)
            VALUES ($1, $2, $3, $4, 'draft')
            RETURNING id, author_id, workspace_id, title, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(workspace_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn create_module(
        &self,
        plan_id: Uuid,
        order: i32,
        title: &str,
        settings: VirtualizationSettings,
    ) -> Result<Module, StorageError> {
        let row = sqlx::query_as::<_, ModuleRow>(
            r#"
            INSERT INTO modules (id, plan_id, "order", title, initial_batch_size, generation_threshold)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, plan_id, "order", title, initial_batch_size, generation_threshold, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(plan_id)
        .bind(order)
        .bind(title)
        .bind(settings.initial_batch_size)
        .bind(settings.generation_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn update_virtualization_settings(
        &self,
        module_id: Uuid,
        settings: VirtualizationSettings,
    ) -> Result<Module, StorageError> {
        let row = sqlx::query_as::<_, ModuleRow>(
            r#"
            UPDATE modules
            SET initial_batch_size = $2, generation_threshold = $3, updated_at = now()
            WHERE id = $1
            RETURNING id, plan_id, "order", title, initial_batch_size, generation_threshold, created_at, updated_at
            "#,
        )
        .bind(module_id)
        .bind(settings.initial_batch_size)
        .bind(settings.generation_threshold)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("module {module_id}")))?;

        Ok(row.into())
    }

    pub async fn get_module(&self, module_id: Uuid) -> Result<Option<Module>, StorageError> {
        let row = sqlx::query_as::<_, ModuleRow>(
            r#"SELECT id, plan_id, "order", title, initial_batch_size, generation_threshold, created_at, updated_at
               FROM modules WHERE id = $1"#,
        )
        .bind(module_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn list_modules_by_plan(&self, plan_id: Uuid) -> Result<Vec<Module>, StorageError> {
        let rows = sqlx::query_as::<_, ModuleRow>(
            r#"SELECT id, plan_id, "order", title, initial_batch_size, generation_threshold, created_at, updated_at
               FROM modules WHERE plan_id = $1 ORDER BY "order" ASC"#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn create_topic(
        &self,
        module_id: Uuid,
        order: i32,
        name: &str,
        theory: &str,
    ) -> Result<Topic, StorageError> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            INSERT INTO topics (id, module_id, "order", name, theory, published)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id, module_id, "order", name, theory, published, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(module_id)
        .bind(order)
        .bind(name)
        .bind(theory)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get_topic(&self, topic_id: Uuid) -> Result<Option<Topic>, StorageError> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"SELECT id, module_id, "order", name, theory, published, created_at, updated_at
               FROM topics WHERE id = $1"#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn get_topic_content(&self, content_id: Uuid) -> Result<Option<TopicContent>, StorageError> {
        let row = sqlx::query_as::<_, TopicContentRow>(
            r#"SELECT id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
               FROM topic_contents WHERE id = $1"#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Active `TopicContent` rows of one topic, ordered the same as the
    /// per-topic query inside `published_topic_inventory` — used by the
    /// worker when it generates/updates/enhances a single already-known topic.
    pub async fn topic_contents(&self, topic_id: Uuid) -> Result<Vec<TopicContent>, StorageError> {
        let rows = sqlx::query_as::<_, TopicContentRow>(
            r#"SELECT id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
               FROM topic_contents
               WHERE topic_id = $1 AND status = 'active'
               ORDER BY content_type, "order" ASC"#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Sets `published` and, on a false -> true transition, returns the ids
    /// of students with a VirtualModule over the parent module already in
    /// `ready` state, so the caller can enqueue `sync_content_change` tasks.
    pub async fn publish_topic(&self, topic_id: Uuid) -> Result<Vec<Uuid>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let previous = sqlx::query_scalar::<_, bool>("SELECT published FROM topics WHERE id = $1")
            .bind(topic_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("topic {topic_id}")))?;

        sqlx::query("UPDATE topics SET published = true, updated_at = now() WHERE id = $1")
            .bind(topic_id)
            .execute(&mut *tx)
            .await?;

        if previous {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let affected: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT vm.student_id
            FROM virtual_modules vm
            JOIN topics t ON t.module_id = vm.module_id
            WHERE t.id = $1 AND vm.generation_status IN ('ready', 'generating')
            "#,
        )
        .bind(topic_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(affected)
    }

    pub async fn unpublish_topic(&self, topic_id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE topics SET published = false, updated_at = now() WHERE id = $1")
            .bind(topic_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Creates or updates a `TopicContent`. Slide/quiz uniqueness is enforced
    /// by partial unique indexes; a violation surfaces as
    /// `StorageError::DuplicateKey`, which the worker handles by upsert-merge
    /// on `(topic_id, order, content_type)` per spec §4.1.
    pub async fn create_or_update_topic_content(
        &self,
        topic_id: Uuid,
        content_type: ContentType,
        order: i32,
        parent_content_id: Option<Uuid>,
        content: serde_json::Value,
    ) -> Result<TopicContent, StorageError> {
        let row = sqlx::query_as::<_, TopicContentRow>(
            r#"
            INSERT INTO topic_contents (id, topic_id, content_type, "order", parent_content_id, content, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'active')
            RETURNING id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(topic_id)
        .bind(content_type.as_str())
        .bind(order)
        .bind(parent_content_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Upsert on the natural key `(topic_id, order, content_type)`, used by
    /// the worker's content-invariant failure handler (§4.6).
    pub async fn upsert_topic_content_by_natural_key(
        &self,
        topic_id: Uuid,
        content_type: ContentType,
        order: i32,
        content: serde_json::Value,
    ) -> Result<TopicContent, StorageError> {
        let existing = sqlx::query_as::<_, TopicContentRow>(
            r#"
            SELECT id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
            FROM topic_contents
            WHERE topic_id = $1 AND content_type = $2 AND "order" = $3 AND status = 'active'
            "#,
        )
        .bind(topic_id)
        .bind(content_type.as_str())
        .bind(order)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(existing) = existing {
            let row = sqlx::query_as::<_, TopicContentRow>(
                r#"
                UPDATE topic_contents SET content = $2, updated_at = now()
                WHERE id = $1
                RETURNING id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
                "#,
            )
            .bind(existing.id)
            .bind(content)
            .fetch_one(&self.pool)
            .await?;
            return Ok(row.into());
        }

        self.create_or_update_topic_content(topic_id, content_type, order, None, content)
            .await
    }

    pub async fn soft_delete_topic_content(&self, content_id: Uuid) -> Result<(), StorageError> {
        sqlx::query("UPDATE topic_contents SET status = 'deleted', updated_at = now() WHERE id = $1")
            .bind(content_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Published topics of a module, ordered, with their content inventory.
    /// Used by C6 (generation order) and C7 (readiness checks).
    pub async fn published_topic_inventory(
        &self,
        module_id: Uuid,
    ) -> Result<Vec<PublishedTopicInventory>, StorageError> {
        let topics = sqlx::query_as::<_, TopicRow>(
            r#"SELECT id, module_id, "order", name, theory, published, created_at, updated_at
               FROM topics WHERE module_id = $1 AND published = true ORDER BY "order" ASC"#,
        )
        .bind(module_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(topics.len());
        for topic_row in topics {
            let topic: Topic = topic_row.into();
            let contents = sqlx::query_as::<_, TopicContentRow>(
                r#"SELECT id, topic_id, content_type, "order", parent_content_id, content, status, created_at, updated_at
                   FROM topic_contents
                   WHERE topic_id = $1 AND status = 'active'
                   ORDER BY content_type, "order" ASC"#,
            )
            .bind(topic.id)
            .fetch_all(&self.pool)
            .await?;

            out.push(PublishedTopicInventory {
                topic,
                contents: contents.into_iter().map(Into::into).collect(),
            });
        }

        Ok(out)
    }

    /// `{ published_topic_count, total_topic_count, generation_status_for_student }`.
    pub async fn virtualization_readiness(
        &self,
        module_id: Uuid,
        student_id: Uuid,
    ) -> Result<VirtualizationReadiness, StorageError> {
        let published_topic_count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM topics WHERE module_id = $1 AND published = true",
        )
        .bind(module_id)
        .fetch_one(&self.pool)
        .await?;

        let total_topic_count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM topics WHERE module_id = $1")
                .bind(module_id)
                .fetch_one(&self.pool)
                .await?;

        let status: Option<GenerationStatus> = sqlx::query_scalar(
            "SELECT generation_status FROM virtual_modules WHERE module_id = $1 AND student_id = $2",
        )
        .bind(module_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(VirtualizationReadiness {
            published_topic_count,
            total_topic_count,
            generation_status_for_student: status,
        })
    }

    /// Deletes a Topic, soft-deleting its TopicContents. Returns a summary
    /// for audit logging.
    pub async fn delete_topic(&self, topic_id: Uuid) -> Result<CascadeSummary, StorageError> {
        let mut tx = self.pool.begin().await?;

        let contents = sqlx::query(
            "UPDATE topic_contents SET status = 'deleted', updated_at = now() WHERE topic_id = $1 AND status = 'active'",
        )
        .bind(topic_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM topics WHERE id = $1")
            .bind(topic_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CascadeSummary {
            topics: 1,
            contents,
            virtual_modules: 0,
        })
    }

    /// Deletes a Module, cascading to its Topics and to any VirtualModules
    /// over it. Runs inside one transaction; returns row counts for audit
    /// logging (mirrors the original's cascade deletion service).
    pub async fn delete_module(&self, module_id: Uuid) -> Result<CascadeSummary, StorageError> {
        let mut tx = self.pool.begin().await?;

        let contents = sqlx::query(
            r#"
            UPDATE topic_contents SET status = 'deleted', updated_at = now()
            WHERE topic_id IN (SELECT id FROM topics WHERE module_id = $1) AND status = 'active'
            "#,
        )
        .bind(module_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let topics = sqlx::query("DELETE FROM topics WHERE module_id = $1")
            .bind(module_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let virtual_modules = sqlx::query("DELETE FROM virtual_modules WHERE module_id = $1")
            .bind(module_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM modules WHERE id = $1")
            .bind(module_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CascadeSummary {
            topics,
            contents,
            virtual_modules,
        })
    }
}
