//! Application startup and lifecycle management.

use crate::config::{RequisitionConfig, StorageBackend};
use crate::handlers::requisitions;
use crate::services::{
    get_metrics, ActivityAudit, AdjustmentLog, BlobStore, Database, EvidenceLedger, LocalStorage,
    MockNotifier, PaymentLedger, ReviewNotifier, S3Storage, SmtpNotifier,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RequisitionConfig,
    pub db: Arc<Database>,
    pub audit: ActivityAudit,
    pub payments: PaymentLedger,
    pub evidence: EvidenceLedger,
    pub adjustments: AdjustmentLog,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "requisition-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "requisition-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RequisitionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test
    /// harness.
    pub async fn build_without_migrations(config: RequisitionConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(
        config: RequisitionConfig,
        run_migrations: bool,
    ) -> Result<Self, AppError> {
        crate::services::init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);

        let storage: Arc<dyn BlobStore> = match config.storage.backend {
            StorageBackend::Local => {
                Arc::new(LocalStorage::new(config.storage.local_path.clone()).await?)
            }
            StorageBackend::S3 => {
                let bucket = config.storage.s3_bucket.clone().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "STORAGE_S3_BUCKET is required for the s3 backend"
                    ))
                })?;
                let aws_config =
                    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
                Arc::new(S3Storage::new(
                    aws_sdk_s3::Client::new(&aws_config),
                    bucket,
                ))
            }
        };

        let notifier: Arc<dyn ReviewNotifier> = if config.smtp.enabled {
            Arc::new(SmtpNotifier::new(config.smtp.clone()).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build SMTP notifier: {}", e))
            })?)
        } else {
            Arc::new(MockNotifier::new(config.smtp.review_recipient.clone()))
        };

        let audit = ActivityAudit::new(db.pool().clone());

        let state = AppState {
            payments: PaymentLedger::new(db.clone(), storage.clone(), audit.clone()),
            evidence: EvidenceLedger::new(
                db.clone(),
                storage.clone(),
                audit.clone(),
                notifier.clone(),
            ),
            adjustments: AdjustmentLog::new(db.clone(), audit.clone()),
            config: config.clone(),
            db,
            audit,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Requisition service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/requisitions", post(requisitions::create_requisition))
            .route("/requisitions/:id", get(requisitions::get_requisition))
            .route(
                "/requisitions/:id/payments",
                post(requisitions::record_payment),
            )
            .route(
                "/requisitions/:id/evidence",
                post(requisitions::record_evidence),
            )
            .route(
                "/requisitions/:id/accept-review",
                post(requisitions::accept_review),
            )
            .route(
                "/requisitions/:id/adjustments",
                post(requisitions::record_adjustment),
            )
            .route("/evidence/:id/review", post(requisitions::review_evidence))
            .route("/evidence/:id", delete(requisitions::delete_evidence))
            .route(
                "/adjustments/:id/resolve",
                post(requisitions::resolve_adjustment),
            )
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "requisition-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
