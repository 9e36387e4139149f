//! Budget Ledger (C3) storage: `AICall` log, singleton `BudgetConfig`, `BudgetAlert`s.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use platform_domain::{
    AICall, BudgetAlert, BudgetConfig, BudgetScope, ModelPrice, ProviderLimits, UsageStats,
};

use crate::StorageError;

#[derive(Clone)]
pub struct BudgetRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct AiCallRow {
    call_id: Uuid,
    timestamp: DateTime<Utc>,
    provider: String,
    model_name: String,
    user_id: Uuid,
    feature: String,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    input_cost: f64,
    output_cost: f64,
    total_cost: f64,
    response_time_ms: Option<i64>,
    success: Option<bool>,
    error_message: Option<String>,
}

impl From<AiCallRow> for AICall {
    fn from(row: AiCallRow) -> Self {
        AICall {
            call_id: row.call_id,
            timestamp: row.timestamp,
            provider: row.provider,
            model_name: row.model_name,
            user_id: row.user_id,
            feature: row.feature,
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            input_cost: row.input_cost,
            output_cost: row.output_cost,
            total_cost: row.total_cost,
            response_time_ms: row.response_time_ms,
            success: row.success,
            error_message: row.error_message,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BudgetConfigRow {
    daily_budget: f64,
    weekly_budget: f64,
    monthly_budget: f64,
    provider_limits: serde_json::Value,
    user_daily_limit: f64,
    user_weekly_limit: f64,
    user_monthly_limit: f64,
    alert_thresholds: serde_json::Value,
    custom_model_prices: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl From<BudgetConfigRow> for BudgetConfig {
    fn from(row: BudgetConfigRow) -> Self {
        BudgetConfig {
            daily_budget: row.daily_budget,
            weekly_budget: row.weekly_budget,
            monthly_budget: row.monthly_budget,
            provider_limits: serde_json::from_value::<HashMap<String, ProviderLimits>>(
                row.provider_limits,
            )
            .unwrap_or_default(),
            user_daily_limit: row.user_daily_limit,
            user_weekly_limit: row.user_weekly_limit,
            user_monthly_limit: row.user_monthly_limit,
            alert_thresholds: serde_json::from_value(row.alert_thresholds).unwrap_or_default(),
            custom_model_prices: serde_json::from_value::<HashMap<String, ModelPrice>>(
                row.custom_model_prices,
            )
            .unwrap_or_default(),
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BudgetAlertRow {
    alert_id: Uuid,
    scope: String,
    threshold: f64,
    current_usage: f64,
    provider: Option<String>,
    user_id: Option<Uuid>,
    triggered_at: DateTime<Utc>,
    dismissed: bool,
    dismissed_at: Option<DateTime<Utc>>,
}

impl From<BudgetAlertRow> for BudgetAlert {
    fn from(row: BudgetAlertRow) -> Self {
        let scope = match row.scope.as_str() {
            "provider" => BudgetScope::Provider,
            "user" => BudgetScope::User,
            _ => BudgetScope::Global,
        };
        BudgetAlert {
            alert_id: row.alert_id,
            scope,
            threshold: row.threshold,
            current_usage: row.current_usage,
            provider: row.provider,
            user_id: row.user_id,
            triggered_at: row.triggered_at,
            dismissed: row.dismissed,
            dismissed_at: row.dismissed_at,
        }
    }
}

fn scope_str(scope: BudgetScope) -> &'static str {
    match scope {
        BudgetScope::Global => "global",
        BudgetScope::Provider => "provider",
        BudgetScope::User => "user",
    }
}

impl BudgetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an in-flight call row (`success = NULL`). `call_id` is
    /// client-supplied; a replay surfaces as `StorageError::DuplicateKey`,
    /// which the gate maps to a no-op success per spec §7 idempotency.
    pub async fn insert_inflight(
        &self,
        call_id: Uuid,
        provider: &str,
        model_name: &str,
        user_id: Uuid,
        feature: &str,
        prompt_tokens: i64,
        input_cost: f64,
    ) -> Result<AICall, StorageError> {
        let row = sqlx::query_as::<_, AiCallRow>(
            r#"
            INSERT INTO ai_calls (call_id, provider, model_name, user_id, feature, prompt_tokens, input_cost)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING call_id, "timestamp", provider, model_name, user_id, feature, prompt_tokens,
                      completion_tokens, total_tokens, input_cost, output_cost, total_cost,
                      response_time_ms, success, error_message
            "#,
        )
        .bind(call_id)
        .bind(provider)
        .bind(model_name)
        .bind(user_id)
        .bind(feature)
        .bind(prompt_tokens)
        .bind(input_cost)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get_call(&self, call_id: Uuid) -> Result<Option<AICall>, StorageError> {
        let row = sqlx::query_as::<_, AiCallRow>(
            r#"SELECT call_id, "timestamp", provider, model_name, user_id, feature, prompt_tokens,
                      completion_tokens, total_tokens, input_cost, output_cost, total_cost,
                      response_time_ms, success, error_message
               FROM ai_calls WHERE call_id = $1"#,
        )
        .bind(call_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Finalizes a previously-registered call with server-computed costs.
    pub async fn finalize_call(
        &self,
        call_id: Uuid,
        completion_tokens: i64,
        total_tokens: i64,
        output_cost: f64,
        total_cost: f64,
        response_time_ms: i64,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<AICall, StorageError> {
        let row = sqlx::query_as::<_, AiCallRow>(
            r#"
            UPDATE ai_calls
            SET completion_tokens = $2, total_tokens = $3, output_cost = $4,
                total_cost = input_cost + $4, response_time_ms = $5, success = $6, error_message = $7
            WHERE call_id = $1
            RETURNING call_id, "timestamp", provider, model_name, user_id, feature, prompt_tokens,
                      completion_tokens, total_tokens, input_cost, output_cost, total_cost,
                      response_time_ms, success, error_message
            "#,
        )
        .bind(call_id)
        .bind(completion_tokens)
        .bind(total_tokens)
        .bind(output_cost)
        .bind(response_time_ms)
        .bind(success)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("ai call {call_id}")))?;

        Ok(row.into())
    }

    /// Sum of `total_cost` over successful calls in `[since, until)`, optionally
    /// narrowed to one provider or one user — the unit `calculate_usage` reads
    /// for both admission checks and the `/ai-monitoring/stats` projection.
    pub async fn calculate_usage(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        provider: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<f64, StorageError> {
        let total: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_cost) FROM ai_calls
            WHERE success = true AND "timestamp" >= $1 AND "timestamp" < $2
              AND ($3::text IS NULL OR provider = $3)
              AND ($4::uuid IS NULL OR user_id = $4)
            "#,
        )
        .bind(since)
        .bind(until)
        .bind(provider)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total.unwrap_or(0.0))
    }

    /// Full breakdown for `GET /ai-monitoring/stats` (§10 supplemented feature).
    pub async fn usage_stats(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        provider: Option<&str>,
        user_id: Option<Uuid>,
        feature: Option<&str>,
    ) -> Result<UsageStats, StorageError> {
        let rows = sqlx::query_as::<_, AiCallRow>(
            r#"SELECT call_id, "timestamp", provider, model_name, user_id, feature, prompt_tokens,
                      completion_tokens, total_tokens, input_cost, output_cost, total_cost,
                      response_time_ms, success, error_message
               FROM ai_calls
               WHERE success = true AND "timestamp" >= $1 AND "timestamp" < $2
                 AND ($3::text IS NULL OR provider = $3)
                 AND ($4::uuid IS NULL OR user_id = $4)
                 AND ($5::text IS NULL OR feature = $5)"#,
        )
        .bind(since)
        .bind(until)
        .bind(provider)
        .bind(user_id)
        .bind(feature)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = UsageStats::default();
        for row in rows {
            stats.total_cost += row.total_cost;
            stats.total_calls += 1;
            *stats.by_model.entry(row.model_name.clone()).or_default() += row.total_cost;
            *stats.by_provider.entry(row.provider.clone()).or_default() += row.total_cost;
            *stats.by_feature.entry(row.feature.clone()).or_default() += row.total_cost;
            *stats.by_user.entry(row.user_id).or_default() += row.total_cost;
        }

        Ok(stats)
    }

    pub async fn get_config(&self) -> Result<BudgetConfig, StorageError> {
        let row = sqlx::query_as::<_, BudgetConfigRow>(
            r#"SELECT daily_budget, weekly_budget, monthly_budget, provider_limits,
                      user_daily_limit, user_weekly_limit, user_monthly_limit,
                      alert_thresholds, custom_model_prices, updated_at
               FROM budget_config WHERE singleton = true"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Applies a PATCH: only fields present in `patch` overwrite the current row.
    pub async fn update_config(
        &self,
        patch: platform_domain::UpdateBudgetConfigRequest,
    ) -> Result<BudgetConfig, StorageError> {
        let current = self.get_config().await?;

        let daily_budget = patch.daily_budget.unwrap_or(current.daily_budget);
        let weekly_budget = patch.weekly_budget.unwrap_or(current.weekly_budget);
        let monthly_budget = patch.monthly_budget.unwrap_or(current.monthly_budget);
        let provider_limits = patch.provider_limits.unwrap_or(current.provider_limits);
        let user_daily_limit = patch.user_daily_limit.unwrap_or(current.user_daily_limit);
        let user_weekly_limit = patch.user_weekly_limit.unwrap_or(current.user_weekly_limit);
        let user_monthly_limit = patch.user_monthly_limit.unwrap_or(current.user_monthly_limit);
        let alert_thresholds = patch.alert_thresholds.unwrap_or(current.alert_thresholds);
        let custom_model_prices = patch
            .custom_model_prices
            .unwrap_or(current.custom_model_prices);

        let row = sqlx::query_as::<_, BudgetConfigRow>(
            r#"
            UPDATE budget_config
            SET daily_budget = $1, weekly_budget = $2, monthly_budget = $3, provider_limits = $4,
                user_daily_limit = $5, user_weekly_limit = $6, user_monthly_limit = $7,
                alert_thresholds = $8, custom_model_prices = $9, updated_at = now()
            WHERE singleton = true
            RETURNING daily_budget, weekly_budget, monthly_budget, provider_limits,
                      user_daily_limit, user_weekly_limit, user_monthly_limit,
                      alert_thresholds, custom_model_prices, updated_at
            "#,
        )
        .bind(daily_budget)
        .bind(weekly_budget)
        .bind(monthly_budget)
        .bind(serde_json::to_value(&provider_limits).unwrap_or_default())
        .bind(user_daily_limit)
        .bind(user_weekly_limit)
        .bind(user_monthly_limit)
        .bind(serde_json::to_value(&alert_thresholds).unwrap_or_default())
        .bind(serde_json::to_value(&custom_model_prices).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Registers (or overwrites) one custom model price — the thin wrapper
    /// the §10 `POST /ai-monitoring/models` endpoint needs.
    pub async fn register_model_price(
        &self,
        model_name: &str,
        price: ModelPrice,
    ) -> Result<BudgetConfig, StorageError> {
        let mut current = self.get_config().await?;
        current
            .custom_model_prices
            .insert(model_name.to_string(), price);

        let row = sqlx::query_as::<_, BudgetConfigRow>(
            r#"
            UPDATE budget_config SET custom_model_prices = $1, updated_at = now()
            WHERE singleton = true
            RETURNING daily_budget, weekly_budget, monthly_budget, provider_limits,
                      user_daily_limit, user_weekly_limit, user_monthly_limit,
                      alert_thresholds, custom_model_prices, updated_at
            "#,
        )
        .bind(serde_json::to_value(&current.custom_model_prices).unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Inserts an alert, relying on `budget_alerts_single_fire_idx` to make a
    /// second insert for the same `(scope, threshold, provider/user, UTC day)`
    /// a no-op duplicate-key the caller can swallow.
    pub async fn insert_alert(
        &self,
        scope: BudgetScope,
        threshold: f64,
        current_usage: f64,
        provider: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<BudgetAlert, StorageError> {
        let row = sqlx::query_as::<_, BudgetAlertRow>(
            r#"
            INSERT INTO budget_alerts (alert_id, scope, threshold, current_usage, provider, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING alert_id, scope, threshold, current_usage, provider, user_id,
                      triggered_at, dismissed, dismissed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(scope_str(scope))
        .bind(threshold)
        .bind(current_usage)
        .bind(provider)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    pub async fn list_alerts(&self, include_dismissed: bool) -> Result<Vec<BudgetAlert>, StorageError> {
        let rows = sqlx::query_as::<_, BudgetAlertRow>(
            r#"SELECT alert_id, scope, threshold, current_usage, provider, user_id,
                      triggered_at, dismissed, dismissed_at
               FROM budget_alerts
               WHERE dismissed = false OR $1
               ORDER BY triggered_at DESC"#,
        )
        .bind(include_dismissed)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn dismiss_alert(&self, alert_id: Uuid) -> Result<BudgetAlert, StorageError> {
        let row = sqlx::query_as::<_, BudgetAlertRow>(
            r#"
            UPDATE budget_alerts SET dismissed = true, dismissed_at = now()
            WHERE alert_id = $1
            RETURNING alert_id, scope, threshold, current_usage, provider, user_id,
                      triggered_at, dismissed, dismissed_at
            "#,
        )
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("budget alert {alert_id}")))?;

        Ok(row.into())
    }
}
