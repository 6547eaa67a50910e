use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method, StatusCode,
};
use axum::{middleware, routing::{get, post}, Router};
use common_http_errors::ApiError;
use common_notify::Notifier;
use common_observability::LoanMetrics;
use prometheus::{Encoder, TextEncoder};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::approval_handlers::decide_loan;
use crate::consumption_handlers::list_consumptions;
use crate::item_handlers::list_items;
use crate::loan_handlers::{get_loan, list_loans, loan_stats, submit_loans};
use crate::return_handlers::return_loan;
use crate::stock::{is_transient_conflict, StockError};
use crate::SERVICE_NAME;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub notifier: Notifier,
    pub metrics: Arc<LoanMetrics>,
}

pub async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}"));
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

// Error metrics middleware using dedicated state (Arc<LoanMetrics>) passed via from_fn_with_state.
async fn error_metrics_mw(
    State(metrics): State<Arc<LoanMetrics>>,
    req: axum::http::Request<Body>,
    next: middleware::Next,
) -> axum::response::Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get("x-error-code")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics
            .http_errors_total
            .with_label_values(&[SERVICE_NAME, code, status.as_str()])
            .inc();
    }
    resp
}

/// Transient storage conflicts surface as retryable 409s; everything else
/// from the pool is an internal error.
pub fn db_error(err: sqlx::Error, trace_id: Option<Uuid>) -> ApiError {
    if is_transient_conflict(&err) {
        return ApiError::Conflict {
            code: "conflict",
            trace_id,
            message: Some("storage conflict, retry the operation".into()),
        };
    }
    ApiError::internal(err, trace_id)
}

pub fn stock_error(err: StockError, trace_id: Option<Uuid>) -> ApiError {
    match err {
        StockError::NotFound(id) => {
            tracing::debug!(item_id = %id, "reservation against unknown item");
            ApiError::NotFound { code: "item_not_found", trace_id }
        }
        StockError::KindMismatch { .. } | StockError::UnknownKind { .. } => ApiError::BadRequest {
            code: "kind_mismatch",
            trace_id,
            message: Some(err.to_string()),
        },
        StockError::Insufficient { .. } => ApiError::BadRequest {
            code: "insufficient_stock",
            trace_id,
            message: Some(err.to_string()),
        },
        StockError::Db(e) => db_error(e, trace_id),
    }
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-user-name"),
            HeaderName::from_static("x-roles"),
            HeaderName::from_static("x-trace-id"),
        ]);

    let metrics = state.metrics.clone();

    Router::new()
        .route("/healthz", get(health))
        .route("/items", get(list_items))
        .route("/loans", post(submit_loans).get(list_loans))
        .route("/loans/stats", get(loan_stats))
        .route("/loans/:request_id", get(get_loan))
        .route("/loans/:request_id/decision", post(decide_loan))
        .route("/loans/:request_id/return", post(return_loan))
        .route("/consumptions", get(list_consumptions))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(middleware::from_fn_with_state(metrics, error_metrics_mw))
        .layer(cors)
}
