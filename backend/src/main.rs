use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod services;
mod workflows;



use workflows::{
    NodeExecutor, PgGraphStore, PgProspectDirectory, PgProspectStateStore, RandomConditionEvaluator,
    RuleConditionEvaluator, SystemClock, TaskActionHandler, WorkflowEngine,
};

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub engine: Arc<WorkflowEngine>,
}

/// Wire the Postgres-backed engine with the production collaborators
fn build_engine(db_pool: &sqlx::PgPool, config: &config::Config) -> anyhow::Result<WorkflowEngine> {
    if !config.smtp.is_configured() {
        tracing::warn!("SMTP credentials are not configured; email nodes will fail until they are");
    }

    let email_service = services::EmailService::new(&config.smtp)?;
    let conditions = RuleConditionEvaluator::new(Arc::new(RandomConditionEvaluator));
    let executor = NodeExecutor::new(
        Arc::new(email_service),
        Arc::new(conditions),
        Arc::new(TaskActionHandler::new(db_pool.clone())),
    );

    Ok(WorkflowEngine::new(
        Arc::new(PgGraphStore::new(db_pool.clone())),
        Arc::new(PgProspectStateStore::new(db_pool.clone())),
        Arc::new(PgProspectDirectory::new(db_pool.clone())),
        executor,
        Arc::new(SystemClock),
        config.engine.clone(),
    ))
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Cadence Workflow API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/workflow", handlers::workflow_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let engine = Arc::new(build_engine(&db_pool, &config)?);

    let mut scheduler = jobs::JobScheduler::new(engine.clone(), config.engine.clone()).await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState { db_pool, engine });
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    scheduler.shutdown().await?;

    Ok(())
}
