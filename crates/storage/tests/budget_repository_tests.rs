#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{BudgetScope, ModelPrice};
use platform_storage::BudgetRepository;

#[sqlx::test(migrations = "../../migrations")]
async fn calculate_usage_only_counts_successful_calls_in_window(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = BudgetRepository::new(pool);
    let user_id = Uuid::new_v4();

    let successful = repo
        .insert_inflight(Uuid::new_v4(), "openai", "gpt-4o-mini", user_id, "adapt", 100, 0.01)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    repo.finalize_call(successful.call_id, 50, 150, 0.02, 0.03, 200, true, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let failed = repo
        .insert_inflight(Uuid::new_v4(), "openai", "gpt-4o-mini", user_id, "adapt", 100, 0.01)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    repo.finalize_call(failed.call_id, 0, 100, 0.0, 0.01, 50, false, Some("provider error"))
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let since = Utc::now() - Duration::hours(1);
    let until = Utc::now() + Duration::hours(1);
    let total = repo
        .calculate_usage(since, until, None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    assert_eq!(total, 0.03);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn register_model_price_merges_into_custom_prices(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = BudgetRepository::new(pool);

    let config = repo
        .register_model_price("claude-fixture", ModelPrice { input: 0.003, output: 0.015 })
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let price = config
        .custom_model_prices
        .get("claude-fixture")
        .expect("price should be registered");
    assert_eq!(price.input, 0.003);
    assert_eq!(price.output, 0.015);

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn dismiss_alert_is_idempotent(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = BudgetRepository::new(pool);

    let alert = repo
        .insert_alert(BudgetScope::Global, 0.8, 80.0, None, None)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let dismissed = repo
        .dismiss_alert(alert.alert_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(dismissed.dismissed);

    let dismissed_again = repo
        .dismiss_alert(alert.alert_id)
        .await
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
    assert!(dismissed_again.dismissed);

    Ok(())
}
