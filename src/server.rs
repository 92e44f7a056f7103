//! HTTP API server.
//!
//! Exposes the fetch pipeline and the import writer as a JSON API so a UI
//! (or another fieldqc instance, via [`HttpImportStore`](crate::remote_store::HttpImportStore))
//! can drive them.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/orders/fetch` | Run the fetch pipeline for a date range |
//! | `POST` | `/orders/import` | Import any number of canonical orders |
//! | `POST` | `/orders/import-batch` | Persist one batch of canonical orders |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "from must not be after to" } }
//! ```
//!
//! Error codes: `bad_request` (400), `timeout` (408), `provider_unavailable` (503),
//! `cancelled` (503), `upstream_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use fieldqc_core::models::{BatchImportOutcome, CanonicalOrder, DateRange, ImportResult};
use fieldqc_core::store::OrderStore;

use crate::config::{self, Config};
use crate::db;
use crate::error::FetchError;
use crate::import::import_orders;
use crate::migrate;
use crate::pipeline::{fetch_orders, FetchOptions, FetchReport};
use crate::progress::NoProgress;
use crate::provider::ProviderClient;
use crate::sqlite_store::SqliteOrderStore;
use crate::traits::OrderProvider;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<SqliteOrderStore>,
    /// `None` when no provider credential was available at startup.
    provider: Option<Arc<dyn OrderProvider>>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        pool: SqlitePool,
        provider: Option<Arc<dyn OrderProvider>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(SqliteOrderStore::new(pool)),
            provider,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/orders/fetch", post(handle_fetch))
        .route("/orders/import", post(handle_import))
        .route("/orders/import-batch", post(handle_import_batch))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, applies migrations, and serves until
/// `shutdown` is cancelled.
pub async fn run_server(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let provider: Option<Arc<dyn OrderProvider>> =
        match ProviderClient::from_config(&config.provider) {
            Ok(client) => Some(Arc::new(client)),
            Err(err) => {
                tracing::warn!(error = %err, "provider unavailable, /orders/fetch disabled");
                None
            }
        };

    let state = AppState::new(config.clone(), pool, provider, shutdown.clone());
    let app = router(state);

    println!("fieldqc server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(err: anyhow::Error) -> AppError {
    app_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        format!("{:#}", err),
    )
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        let message = err.to_string();
        match err {
            FetchError::Config(_) => bad_request(message),
            FetchError::Timeout(_) => app_error(StatusCode::REQUEST_TIMEOUT, "timeout", message),
            FetchError::Cancelled => {
                app_error(StatusCode::SERVICE_UNAVAILABLE, "cancelled", message)
            }
            FetchError::Http { .. }
            | FetchError::Transport(_)
            | FetchError::Parse(_)
            | FetchError::Provider { .. } => {
                app_error(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /orders/fetch ============

/// Body for `POST /orders/fetch`. Dates are UTC unless `utc_offset_minutes`
/// is given, in which case they are local dates at that offset.
#[derive(Deserialize)]
struct FetchRequest {
    from: NaiveDate,
    to: NaiveDate,
    #[serde(default)]
    valid_statuses: Option<Vec<String>>,
    #[serde(default)]
    utc_offset_minutes: Option<i32>,
}

async fn handle_fetch(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchReport>, AppError> {
    let provider = state.provider.clone().ok_or_else(|| {
        app_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            format!(
                "provider credential missing; set {}",
                state.config.provider.api_key_env
            ),
        )
    })?;

    let range = match req.utc_offset_minutes {
        Some(minutes) => {
            let offset = minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| bad_request("utc_offset_minutes out of range"))?;
            DateRange::from_local_dates(req.from, req.to, offset)
        }
        None => DateRange::new(req.from, req.to),
    }
    .map_err(|e| bad_request(e.to_string()))?;

    let mut options = FetchOptions::from_config(&state.config);
    if let Some(statuses) = req.valid_statuses {
        config::validate_statuses(&statuses).map_err(|e| bad_request(e.to_string()))?;
        options.valid_statuses = statuses;
    }

    let cancel = state.shutdown.child_token();
    let report = fetch_orders(provider, &range, &options, &cancel, &NoProgress).await?;
    Ok(Json(report))
}

// ============ POST /orders/import ============

#[derive(Deserialize)]
struct ImportRequest {
    orders: Vec<CanonicalOrder>,
}

async fn handle_import(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Json<ImportResult> {
    let cancel = state.shutdown.child_token();
    let result = import_orders(
        state.store.as_ref(),
        &req.orders,
        state.config.pipeline.import_batch_size,
        &cancel,
        &NoProgress,
    )
    .await;
    Json(result)
}

// ============ POST /orders/import-batch ============

async fn handle_import_batch(
    State(state): State<AppState>,
    Json(req): Json<ImportRequest>,
) -> Result<Json<BatchImportOutcome>, AppError> {
    let limit = state.config.pipeline.import_batch_size;
    if req.orders.len() > limit {
        return Err(bad_request(format!(
            "batch of {} orders exceeds the limit of {}",
            req.orders.len(),
            limit
        )));
    }
    let outcome = state
        .store
        .persist_batch(&req.orders)
        .await
        .map_err(internal)?;
    Ok(Json(outcome))
}
