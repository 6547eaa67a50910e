use axum::extract::{Path, State};
use axum::Json;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::app::{db_error, stock_error, AppState};
use crate::stock;
use crate::{ItemKind, LoanStatus};

#[derive(Debug, Serialize)]
pub struct ReturnResponse {
    pub request_id: Uuid,
    pub status: LoanStatus,
    pub stock_after: i32,
}

/// Close an approved asset loan: restore the reserved stock and stamp the
/// return time. Materials never reach this path; their requests were
/// replaced by consumption records at approval.
pub async fn return_loan(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ReturnResponse>, ApiError> {
    ensure_capability(&sec, Capability::LoanReturn)
        .map_err(|_| ApiError::ForbiddenMissingRole { role: "loan_return", trace_id: sec.trace_id })?;

    let mut tx = stock::begin_repeatable_read(&state.db)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?;

    let row = sqlx::query(
        "SELECT item_id, item_kind, quantity, status FROM loan_requests WHERE id = $1 FOR UPDATE",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| db_error(e, sec.trace_id))?
    .ok_or(ApiError::NotFound { code: "loan_not_found", trace_id: sec.trace_id })?;

    let status_tag: String = row.get("status");
    let kind_tag: String = row.get("item_kind");
    let status = LoanStatus::parse(&status_tag)
        .ok_or_else(|| ApiError::internal(format!("loan {request_id} has corrupt status '{status_tag}'"), sec.trace_id))?;
    let kind = ItemKind::parse(&kind_tag)
        .ok_or_else(|| ApiError::internal(format!("loan {request_id} has corrupt kind '{kind_tag}'"), sec.trace_id))?;

    if !status.accepts_return(kind) {
        return Err(ApiError::Conflict {
            code: "not_borrowed",
            trace_id: sec.trace_id,
            message: Some(format!("request is a {kind} loan in status {status}; only approved asset loans can be returned")),
        });
    }

    let item_id: Uuid = row.get("item_id");
    let quantity: i32 = row.get("quantity");

    let stock_after = stock::release(&mut tx, item_id, quantity)
        .await
        .map_err(|e| stock_error(e, sec.trace_id))?;

    sqlx::query(
        "UPDATE loan_requests SET status = 'returned', actual_return_date = now() WHERE id = $1",
    )
    .bind(request_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| db_error(e, sec.trace_id))?;

    tx.commit().await.map_err(|e| db_error(e, sec.trace_id))?;
    state.metrics.returns_total.inc();

    tracing::info!(
        request_id = %request_id,
        item_id = %item_id,
        quantity,
        stock_after,
        "asset loan returned"
    );

    Ok(Json(ReturnResponse { request_id, status: LoanStatus::Returned, stock_after }))
}
