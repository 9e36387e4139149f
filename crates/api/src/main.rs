//! Adaptive Learning Backend Server.

use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use platform_api::{AppState, build_router};
use platform_budget::BudgetGate;
use platform_config::AppConfig;
use platform_llm::{LlmProvider, MockProvider};
use platform_queue::{GenerationQueue, Sweeper};
use platform_scheduler::{ProgressiveScheduler, Sweeper as SchedulerSweeper, SyncReconciler};
use platform_storage::{BudgetRepository, ContentRepository, QueueRepository, VirtualRepository, create_pool, run_migrations};
use platform_worker::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting adaptive-learning backend server");
    tracing::info!("binding to {}", config.bind_address);

    let pool = create_pool(&config.database_url).await?;
    tracing::info!("database connection pool created");

    run_migrations(&pool).await?;
    tracing::info!("database migrations complete");

    let content = ContentRepository::new(pool.clone());
    let virtual_store = VirtualRepository::new(pool.clone());
    let queue = GenerationQueue::new(QueueRepository::new(pool.clone()));
    let budget = Arc::new(BudgetGate::new(BudgetRepository::new(pool.clone())));

    // Swap for an `HttpProvider` pointed at a real provider endpoint in
    // production; the mock keeps local/dev runs free of outbound calls.
    let llm: Arc<dyn LlmProvider> = Arc::new(MockProvider::new(
        "mock",
        vec!["mock-small".to_string(), "mock-large".to_string()],
    ));

    let scheduler = Arc::new(ProgressiveScheduler::new(content.clone(), virtual_store.clone(), queue.clone()));
    let reconciler = Arc::new(SyncReconciler::new(content.clone(), virtual_store.clone(), queue.clone()));

    let state = Arc::new(AppState {
        pool: pool.clone(),
        content,
        virtual_store,
        queue: queue.clone(),
        budget,
        llm,
        scheduler,
        reconciler,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let worker_pool = WorkerPool::spawn(config.worker_concurrency as usize, state.worker_deps());

    let sweeper = Sweeper::new(QueueRepository::new(pool.clone()), std::time::Duration::from_secs(30));
    tokio::spawn(sweeper.run());

    let scheduler_sweeper = SchedulerSweeper::new(
        scheduler.clone(),
        VirtualRepository::new(pool.clone()),
        std::time::Duration::from_secs(3600),
    );
    tokio::spawn(scheduler_sweeper.run());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    worker_pool.shutdown();
    Ok(())
}
