//! Budget Ledger / Budget Gate entities (C3/C4).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Per-1k-token USD prices for a single model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

/// Conservative fallback applied when an unknown model is billed
/// (see `crates::budget::ledger::PricingTable`).
pub const FALLBACK_PRICE: ModelPrice = ModelPrice {
    input: 0.001,
    output: 0.002,
};

/// One per LLM invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AICall {
    /// Client-supplied, unique. Rejects on replay (see Budget Gate `register_call`).
    pub call_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model_name: String,
    pub user_id: Uuid,
    pub feature: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
    pub response_time_ms: Option<i64>,
    /// Tri-state: `None` = in-flight, `Some(true/false)` = finalized.
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

/// Body of `POST /ai-monitoring/calls` (pre-flight admission).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterCallRequest {
    pub call_id: Uuid,
    pub provider: String,
    pub model_name: String,
    pub feature: String,
    #[validate(range(min = 0))]
    pub prompt_tokens: i64,
}

#[derive(Debug, Serialize)]
pub struct RegisterCallResponse {
    pub call_id: Uuid,
}

/// Body of `PUT /ai-monitoring/calls/{call_id}` (post-flight). Note:
/// `total_cost`/`input_cost`/`output_cost` are deliberately absent here —
/// the server recomputes them authoritatively and a client-supplied value
/// would be ignored even if present in the raw JSON.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCallRequest {
    #[validate(range(min = 0))]
    pub completion_tokens: i64,
    pub response_time_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Per-provider daily/weekly/monthly limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ProviderLimits {
    pub daily: f64,
    pub weekly: f64,
    pub monthly: f64,
}

/// Singleton budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub daily_budget: f64,
    pub weekly_budget: f64,
    pub monthly_budget: f64,
    pub provider_limits: HashMap<String, ProviderLimits>,
    pub user_daily_limit: f64,
    pub user_weekly_limit: f64,
    pub user_monthly_limit: f64,
    pub alert_thresholds: Vec<f64>,
    pub custom_model_prices: HashMap<String, ModelPrice>,
    pub updated_at: DateTime<Utc>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_budget: 100.0,
            weekly_budget: 600.0,
            monthly_budget: 2000.0,
            provider_limits: HashMap::new(),
            user_daily_limit: 10.0,
            user_weekly_limit: 50.0,
            user_monthly_limit: 150.0,
            alert_thresholds: vec![0.5, 0.8, 0.95],
            custom_model_prices: HashMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Body of `PUT /ai-monitoring/config`. All fields optional; unspecified
/// fields keep their current value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBudgetConfigRequest {
    pub daily_budget: Option<f64>,
    pub weekly_budget: Option<f64>,
    pub monthly_budget: Option<f64>,
    pub provider_limits: Option<HashMap<String, ProviderLimits>>,
    pub user_daily_limit: Option<f64>,
    pub user_weekly_limit: Option<f64>,
    pub user_monthly_limit: Option<f64>,
    pub alert_thresholds: Option<Vec<f64>>,
    pub custom_model_prices: Option<HashMap<String, ModelPrice>>,
}

/// Body of `POST /ai-monitoring/models` — registers a custom model price
/// without a full config rewrite.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterModelPriceRequest {
    pub model_name: String,
    #[validate(range(min = 0.0))]
    pub input: f64,
    #[validate(range(min = 0.0))]
    pub output: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    Global,
    Provider,
    User,
}

/// One threshold breach. Unique per `(scope, threshold, UTC day)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub alert_id: Uuid,
    pub scope: BudgetScope,
    pub threshold: f64,
    pub current_usage: f64,
    pub provider: Option<String>,
    pub user_id: Option<Uuid>,
    pub triggered_at: DateTime<Utc>,
    pub dismissed: bool,
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Query params for `GET /ai-monitoring/stats`.
#[derive(Debug, Deserialize, Default)]
pub struct UsageStatsQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub user_id: Option<Uuid>,
    pub feature: Option<String>,
}

/// Full usage breakdown: total plus by-model/by-feature/by-provider/by-user
/// slices over the filtered window.
#[derive(Debug, Serialize, Default)]
pub struct UsageStats {
    pub total_cost: f64,
    pub total_calls: i64,
    pub by_model: HashMap<String, f64>,
    pub by_provider: HashMap<String, f64>,
    pub by_feature: HashMap<String, f64>,
    pub by_user: HashMap<Uuid, f64>,
}
