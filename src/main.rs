//! QuickCash Backend Server
//!
//! Micro-lending back-office: loan applications backed by collateral
//! images, staff approval, amortized repayments, and a daily
//! reconciliation job for reminders and overdue handling.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use tokio::signal;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::cors::{Any, CorsLayer};

use quickcash_backend::analytics::DashboardService;
use quickcash_backend::config::Config;
use quickcash_backend::loan_service::LoanService;
use quickcash_backend::middleware;
use quickcash_backend::notifier::{LogNotifier, Notifier, WebhookNotifier};
use quickcash_backend::payment_service::PaymentService;
use quickcash_backend::reconciler::Reconciler;
use quickcash_backend::routes;
use quickcash_backend::state::AppState;
use quickcash_backend::storage::LocalImageStore;
use quickcash_backend::{db, error::ApiError};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    // Initialize database connection pool
    let db_pool = match db::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = db::run_migrations(&db_pool).await {
        tracing::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }

    // Wire up the notifier collaborator
    let notifier: Arc<dyn Notifier> = match &config.notifier_webhook_url {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Using webhook notifier");
            Arc::new(WebhookNotifier::new(endpoint.clone()))
        }
        None => {
            tracing::info!("No notifier webhook configured, logging notifications only");
            Arc::new(LogNotifier)
        }
    };

    // Construct services; the pool is injected, never global
    let loan_service = Arc::new(LoanService::new(
        db_pool.clone(),
        notifier.clone(),
        config.lock_timeout_ms,
    ));
    let payment_service = Arc::new(PaymentService::new(db_pool.clone(), config.lock_timeout_ms));
    let dashboard_service = Arc::new(DashboardService::new(db_pool.clone()));
    let image_store = Arc::new(LocalImageStore::new(&config.upload_dir));
    let reconciler = Arc::new(Reconciler::new(
        db_pool.clone(),
        loan_service.clone(),
        notifier.clone(),
        config.reminder_lead_days,
        config.overdue_grace_days,
    ));

    // Schedule the daily reconciliation job
    let scheduler = JobScheduler::new()
        .await
        .expect("Failed to create job scheduler");

    let job_reconciler = reconciler.clone();
    let job = Job::new_async(config.reconciliation_schedule.as_str(), move |_id, _sched| {
        let reconciler = job_reconciler.clone();
        Box::pin(async move {
            tracing::info!("Running scheduled reconciliation");
            reconciler.run_daily().await;
        })
    })
    .expect("Invalid reconciliation schedule");

    scheduler
        .add(job)
        .await
        .expect("Failed to schedule reconciliation job");
    scheduler
        .start()
        .await
        .expect("Failed to start job scheduler");

    // Create shared app state
    let app_state = AppState::new(
        loan_service,
        payment_service,
        dashboard_service,
        reconciler,
        image_store,
    );

    // Clone db_pool for health check
    let health_db_pool = db_pool.clone();

    // Create the app router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health_check(health_db_pool.clone())))
        .merge(routes::loan_routes())
        .merge(routes::payment_routes())
        .merge(routes::admin_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server port");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

async fn root() -> &'static str {
    "QuickCash API Server"
}

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(pool: sqlx::PgPool) -> Result<axum::Json<HealthResponse>, ApiError> {
    let database = match db::check_health(&pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if database == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Ok(axum::Json(HealthResponse {
        status: status.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed) = config.cors_allowed_origins.as_deref() else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
