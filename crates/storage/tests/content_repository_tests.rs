#![cfg(feature = "postgres-tests")]

use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{ContentType, VirtualizationSettings};
use platform_storage::{ContentRepository, VirtualRepository};

#[sqlx::test(migrations = "../../migrations")]
async fn publish_topic_reports_affected_students_only_on_first_publish(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let topic = content
        .create_topic(module.id, 0, "Topic", "theory")
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let student_id = Uuid::new_v4();
    let vm = virt
        .upsert_virtual_module(module.id, student_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    virt.set_generation_status(vm.id, platform_domain::GenerationStatus::Ready, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let affected = content
        .publish_topic(topic.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert_eq!(affected, vec![student_id]);

    // publishing an already-published topic is a no-op, not a re-notification
    let affected_again = content
        .publish_topic(topic.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(affected_again.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn slide_order_uniqueness_is_enforced_per_topic(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let topic = content
        .create_topic(module.id, 0, "Topic", "theory")
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({"text": "a"}))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let duplicate = content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({"text": "b"}))
        .await;
    assert!(duplicate.is_err());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn quiz_uniqueness_is_enforced_per_topic_regardless_of_order(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let topic = content
        .create_topic(module.id, 0, "Topic", "theory")
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    content
        .create_or_update_topic_content(topic.id, ContentType::Quiz, 0, None, serde_json::json!({}))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let duplicate = content
        .create_or_update_topic_content(topic.id, ContentType::Quiz, 1, None, serde_json::json!({}))
        .await;
    assert!(duplicate.is_err());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_module_cascades_to_topics_contents_and_virtual_modules(pool: PgPool) -> Result<(), sqlx::Error> {
    let content = ContentRepository::new(pool.clone());
    let virt = VirtualRepository::new(pool);

    let plan = content.create_plan(Uuid::new_v4(), None, "Plan").await.map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let module = content
        .create_module(plan.id, 0, "Module", VirtualizationSettings { initial_batch_size: 1, generation_threshold: 0.8 })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    let topic = content
        .create_topic(module.id, 0, "Topic", "theory")
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    content
        .create_or_update_topic_content(topic.id, ContentType::Slide, 0, None, serde_json::json!({}))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    virt.upsert_virtual_module(module.id, Uuid::new_v4())
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let summary = content
        .delete_module(module.id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    assert_eq!(summary.topics, 1);
    assert_eq!(summary.contents, 1);
    assert_eq!(summary.virtual_modules, 1);
    assert!(content.get_module(module.id).await.unwrap().is_none());

    Ok(())
}
