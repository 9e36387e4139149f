//! `/ai-monitoring/*` handlers (spec §6, SPEC_FULL §10): the Budget Gate's
//! HTTP surface — pre/post-flight call accounting, usage stats, config, and
//! the supplemented model-price and alert-dismissal endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use uuid::Uuid;
use validator::Validate;

use platform_budget::GateError;
use platform_domain::{
    AICall, BudgetAlert, BudgetConfig, DomainError, Envelope, ModelPrice, RegisterCallRequest,
    RegisterCallResponse, RegisterModelPriceRequest, UpdateBudgetConfigRequest, UpdateCallRequest,
    UsageStats, UsageStatsQuery,
};

use crate::AppState;
use crate::middleware::{Admin, AnyRole, RoleGuard};

/// `POST /ai-monitoring/calls` — pre-flight admission (spec §4.4). Any
/// authenticated caller may register a call; the gate is what enforces budget.
///
/// `strict_admission = false` ("staging mode", see `AppConfig`) downgrades a
/// budget denial to a logged warning and lets the caller proceed with the
/// client-supplied `call_id` unreserved — the caller is then responsible for
/// skipping `update_call` too, since no ledger row was actually opened.
pub async fn register_call(
    State(state): State<Arc<AppState>>,
    auth: RoleGuard<AnyRole>,
    Json(body): Json<RegisterCallRequest>,
) -> Result<Json<Envelope<RegisterCallResponse>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let call_id = body.call_id;
    match state.budget.register_call(body, auth.principal.user_id).await {
        Ok(response) => Ok(Envelope::ok(response)),
        Err(err @ (GateError::DailyBudgetExceeded { .. }
        | GateError::ProviderBudgetExceeded { .. }
        | GateError::UserBudgetExceeded { .. }))
            if !state.config.strict_admission =>
        {
            tracing::warn!(%call_id, error = %err, "budget denial downgraded, strict_admission is off");
            Ok(Envelope::ok(RegisterCallResponse { call_id }))
        }
        Err(err) => Err(err.into()),
    }
}

/// `PUT /ai-monitoring/calls/{call_id}` — post-flight, server-authoritative
/// cost finalization (spec §4.4).
pub async fn update_call(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<AnyRole>,
    Path(call_id): Path<Uuid>,
    Json(body): Json<UpdateCallRequest>,
) -> Result<Json<Envelope<AICall>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let call = state.budget.update_call(call_id, body).await?;
    Ok(Envelope::ok(call))
}

/// `GET /ai-monitoring/stats` (spec §6, SPEC_FULL §10): full by-model /
/// by-provider / by-feature / by-user breakdown over the filtered window.
pub async fn usage_stats(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Admin>,
    Query(query): Query<UsageStatsQuery>,
) -> Result<Json<Envelope<UsageStats>>, DomainError> {
    let stats = state.budget.usage_stats(query).await?;
    Ok(Envelope::ok(stats))
}

/// `PUT /ai-monitoring/config` — updates the singleton `BudgetConfig`.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Admin>,
    Json(body): Json<UpdateBudgetConfigRequest>,
) -> Result<Json<Envelope<BudgetConfig>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let config = state.budget.update_config(body).await?;
    Ok(Envelope::ok(config))
}

/// `POST /ai-monitoring/models` (SPEC_FULL §10): registers a custom model
/// price without a full config rewrite.
pub async fn register_model_price(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Admin>,
    Json(body): Json<RegisterModelPriceRequest>,
) -> Result<Json<Envelope<BudgetConfig>>, DomainError> {
    body.validate().map_err(DomainError::from_validation_errors)?;

    let price = ModelPrice {
        input: body.input,
        output: body.output,
    };
    let config = state.budget.register_model_price(&body.model_name, price).await?;
    Ok(Envelope::ok(config))
}

/// `POST /ai-monitoring/alerts/{id}/dismiss` (SPEC_FULL §10).
pub async fn dismiss_alert(
    State(state): State<Arc<AppState>>,
    _auth: RoleGuard<Admin>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<BudgetAlert>>, DomainError> {
    let alert = state.budget.dismiss_alert(id).await?;
    Ok(Envelope::ok(alert))
}
