//! Adaptive Learning Backend — HTTP surface over the Progressive
//! Virtualization Engine, Generation Queue, and AI-Call Monitoring / Budget Gate.

pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use platform_budget::BudgetGate;
use platform_config::AppConfig;
use platform_llm::LlmProvider;
use platform_queue::GenerationQueue;
use platform_scheduler::{ProgressiveScheduler, SyncReconciler};
use platform_storage::{ContentRepository, VirtualRepository};
use platform_worker::WorkerDeps;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub content: ContentRepository,
    pub virtual_store: VirtualRepository,
    pub queue: GenerationQueue,
    pub budget: Arc<BudgetGate>,
    pub llm: Arc<dyn LlmProvider>,
    pub scheduler: Arc<ProgressiveScheduler>,
    pub reconciler: Arc<SyncReconciler>,
    pub config: AppConfig,
    pub start_time: Instant,
}

impl AppState {
    /// Bundles the pieces a worker task needs — used only to build `WorkerDeps`
    /// at startup, handlers never see the worker pool directly.
    pub fn worker_deps(&self) -> WorkerDeps {
        WorkerDeps {
            content: self.content.clone(),
            virtual_store: self.virtual_store.clone(),
            queue: self.queue.clone(),
            budget: self.budget.clone(),
            llm: self.llm.clone(),
            scheduler: self.scheduler.clone(),
            lease_seconds: self.config.default_lease_seconds,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(handlers::health::health))
        .route("/v1/ready", get(handlers::health::ready))
        .route(
            "/v1/virtual/progressive-generation",
            post(handlers::virtualization::progressive_generation),
        )
        .route(
            "/v1/virtual/trigger-next-topic",
            post(handlers::virtualization::trigger_next_topic),
        )
        .route(
            "/v1/virtual/modules/{id}",
            get(handlers::virtualization::get_virtual_module),
        )
        .route(
            "/v1/content/results",
            post(handlers::virtualization::submit_content_result),
        )
        .route(
            "/v1/modules/{id}/virtualization-settings",
            put(handlers::modules::update_virtualization_settings),
        )
        .route("/v1/content/topics/{id}/publish", post(handlers::content_sync::publish_topic))
        .route(
            "/v1/content/topics/{id}/unpublish",
            post(handlers::content_sync::unpublish_topic),
        )
        .route(
            "/v1/content/topics/{topic_id}/items/{content_id}/added",
            post(handlers::content_sync::content_added),
        )
        .route(
            "/v1/content/items/{id}/edited",
            post(handlers::content_sync::content_edited),
        )
        .route(
            "/v1/content/items/{id}/deleted",
            post(handlers::content_sync::content_deleted),
        )
        .route(
            "/v1/ai-monitoring/calls",
            post(handlers::ai_monitoring::register_call),
        )
        .route(
            "/v1/ai-monitoring/calls/{call_id}",
            put(handlers::ai_monitoring::update_call),
        )
        .route("/v1/ai-monitoring/stats", get(handlers::ai_monitoring::usage_stats))
        .route("/v1/ai-monitoring/config", put(handlers::ai_monitoring::update_config))
        .route(
            "/v1/ai-monitoring/models",
            post(handlers::ai_monitoring::register_model_price),
        )
        .route(
            "/v1/ai-monitoring/alerts/{id}/dismiss",
            post(handlers::ai_monitoring::dismiss_alert),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
