use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use common_notify::LoanEventKind;
use common_security::{ensure_capability, has_capability, Capability, SecurityCtxExtractor};
use serde::{Deserialize, Serialize};
use sqlx::query_as;
use uuid::Uuid;

use crate::app::{db_error, stock_error, AppState};
use crate::stock::{self, StockError};
use crate::{ItemKind, LoanStatus};

#[derive(Debug, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    /// "aset"/"asset" or "bahan"/"material"; the explicit tag, never inferred.
    pub item_type: String,
    pub quantity: i32,
    pub target_return_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitLoansRequest {
    pub items: Vec<CartLine>,
    pub agreement_accepted: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedLoan {
    pub request_id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub quantity: i32,
    pub status: LoanStatus,
    pub stock_remaining: i32,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub requests: Vec<CreatedLoan>,
}

#[derive(Debug)]
pub(crate) struct ValidatedLine {
    pub item_id: Uuid,
    pub kind: ItemKind,
    pub quantity: i32,
    pub target_return_date: Option<DateTime<Utc>>,
    pub note: String,
}

#[derive(Debug, PartialEq)]
pub(crate) struct LineError {
    pub code: &'static str,
    pub message: String,
}

/// All input checks run before any transaction starts; a cart that fails
/// here never touches stock.
pub(crate) fn validate_lines(
    payload: &SubmitLoansRequest,
    now: DateTime<Utc>,
) -> Result<Vec<ValidatedLine>, LineError> {
    if !payload.agreement_accepted {
        return Err(LineError {
            code: "agreement_required",
            message: "Borrowing terms must be accepted before submitting".into(),
        });
    }
    if payload.items.is_empty() {
        return Err(LineError {
            code: "empty_cart",
            message: "Submission must include at least one item".into(),
        });
    }

    let mut lines = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let kind = ItemKind::parse(&item.item_type).ok_or_else(|| LineError {
            code: "invalid_item_type",
            message: format!("unknown item type '{}' for item {}", item.item_type, item.item_id),
        })?;
        if item.quantity <= 0 {
            return Err(LineError {
                code: "invalid_quantity",
                message: format!("Quantity for item {} must be positive", item.item_id),
            });
        }
        let target_return_date = match kind {
            ItemKind::Asset => {
                let date = item.target_return_date.ok_or_else(|| LineError {
                    code: "missing_return_date",
                    message: format!("Asset {} requires a target return date", item.item_id),
                })?;
                if date <= now {
                    return Err(LineError {
                        code: "past_return_date",
                        message: format!("Target return date for item {} must be in the future", item.item_id),
                    });
                }
                Some(date)
            }
            // Materials are consumed, not returned; any date sent is dropped.
            ItemKind::Material => None,
        };
        lines.push(ValidatedLine {
            item_id: item.item_id,
            kind,
            quantity: item.quantity,
            target_return_date,
            note: item.note.clone().unwrap_or_default(),
        });
    }
    Ok(lines)
}

const INSERT_LOAN_SQL: &str = "INSERT INTO loan_requests \
    (id, item_id, item_kind, requester_id, requester_name, quantity, status, requested_at, target_return_date, note, agreement_accepted) \
    VALUES ($1, $2, $3, $4, $5, $6, 'pending', now(), $7, $8, true)";

/// Cart submission: reserve stock and create one Pending request per line,
/// all inside a single transaction. Any line failing rolls back every
/// reservation made so far, so partial carts are never persisted.
pub async fn submit_loans(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Json(payload): Json<SubmitLoansRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    ensure_capability(&sec, Capability::LoanSubmit)
        .map_err(|_| ApiError::ForbiddenMissingRole { role: "loan_submit", trace_id: sec.trace_id })?;
    let requester = sec.subject()?;
    let requester_name = sec.actor.name.clone().unwrap_or_else(|| requester.to_string());

    let lines = validate_lines(&payload, Utc::now()).map_err(|e| ApiError::BadRequest {
        code: e.code,
        trace_id: sec.trace_id,
        message: Some(e.message),
    })?;

    let mut tx = stock::begin_repeatable_read(&state.db)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?;

    let mut created = Vec::with_capacity(lines.len());
    for line in &lines {
        let reserved = stock::reserve(&mut tx, line.item_id, line.kind, line.quantity)
            .await
            .map_err(|e| {
                if matches!(e, StockError::Insufficient { .. }) {
                    state.metrics.insufficient_stock_total.inc();
                }
                // Dropping the transaction rolls back every reservation
                // made earlier in this cart.
                stock_error(e, sec.trace_id)
            })?;

        let request_id = Uuid::new_v4();
        sqlx::query(INSERT_LOAN_SQL)
            .bind(request_id)
            .bind(line.item_id)
            .bind(line.kind.as_str())
            .bind(requester)
            .bind(&requester_name)
            .bind(line.quantity)
            .bind(line.target_return_date)
            .bind(&line.note)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, sec.trace_id))?;

        created.push(CreatedLoan {
            request_id,
            item_id: line.item_id,
            item_name: reserved.name,
            quantity: line.quantity,
            status: LoanStatus::Pending,
            stock_remaining: reserved.stock_after,
        });
    }

    tx.commit().await.map_err(|e| db_error(e, sec.trace_id))?;
    state.metrics.reservations_total.inc_by(created.len() as u64);

    tracing::info!(
        requester = %requester,
        lines = created.len(),
        "loan submission reserved and pending approval"
    );

    for loan in &created {
        if let Err(err) = state
            .notifier
            .emit(
                LoanEventKind::LoanCreated,
                loan.request_id,
                loan.item_name.clone(),
                requester_name.clone(),
                loan.quantity,
                sec.trace_id,
            )
            .await
        {
            state.metrics.notify_failures_total.inc();
            tracing::warn!(error = %err, request_id = %loan.request_id, "failed to emit loan_created");
        }
    }

    Ok(Json(SubmissionResponse { requests: created }))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LoanRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub item_name: String,
    pub item_code: String,
    pub item_kind: String,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub quantity: i32,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub target_return_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,
    pub note: String,
    pub approver_id: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_note: Option<String>,
    pub overdue: bool,
}

const LIST_LOANS_BASE: &str = "SELECT lr.id, lr.item_id, ii.name AS item_name, ii.code AS item_code, \
    lr.item_kind, lr.requester_id, lr.requester_name, lr.quantity, lr.status, lr.requested_at, \
    lr.target_return_date, lr.actual_return_date, lr.note, lr.approver_id, lr.approved_at, lr.approval_note, \
    (lr.status = 'approved' AND lr.target_return_date IS NOT NULL AND lr.target_return_date < now()) AS overdue \
    FROM loan_requests lr JOIN inventory_items ii ON ii.id = lr.item_id";

pub async fn list_loans(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
) -> Result<Json<Vec<LoanRecord>>, ApiError> {
    let subject = sec.subject()?;
    let loans = if has_capability(&sec, Capability::LoanViewAll) {
        query_as::<_, LoanRecord>(&format!("{LIST_LOANS_BASE} ORDER BY lr.requested_at DESC"))
            .fetch_all(&state.db)
            .await
    } else {
        query_as::<_, LoanRecord>(&format!(
            "{LIST_LOANS_BASE} WHERE lr.requester_id = $1 ORDER BY lr.requested_at DESC"
        ))
        .bind(subject)
        .fetch_all(&state.db)
        .await
    }
    .map_err(|e| db_error(e, sec.trace_id))?;

    Ok(Json(loans))
}

pub async fn get_loan(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(request_id): Path<Uuid>,
) -> Result<Json<LoanRecord>, ApiError> {
    let subject = sec.subject()?;
    let loan = query_as::<_, LoanRecord>(&format!("{LIST_LOANS_BASE} WHERE lr.id = $1"))
        .bind(request_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?
        .ok_or(ApiError::NotFound { code: "loan_not_found", trace_id: sec.trace_id })?;

    if loan.requester_id != subject && !has_capability(&sec, Capability::LoanViewAll) {
        return Err(ApiError::Forbidden { trace_id: sec.trace_id });
    }

    Ok(Json(loan))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LoanStats {
    pub total: i64,
    pub pending: i64,
    pub active: i64,
    pub returned: i64,
    pub rejected: i64,
    pub overdue: i64,
    #[sqlx(default)]
    pub consumed: i64,
}

const LOAN_STATS_SQL: &str = "SELECT COUNT(*) AS total, \
    COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
    COUNT(*) FILTER (WHERE status = 'approved') AS active, \
    COUNT(*) FILTER (WHERE status = 'returned') AS returned, \
    COUNT(*) FILTER (WHERE status = 'rejected') AS rejected, \
    COUNT(*) FILTER (WHERE status = 'approved' AND target_return_date < now()) AS overdue \
    FROM loan_requests";

pub async fn loan_stats(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
) -> Result<Json<LoanStats>, ApiError> {
    let subject = sec.subject()?;
    let privileged = has_capability(&sec, Capability::LoanViewAll);

    let mut stats = if privileged {
        query_as::<_, LoanStats>(LOAN_STATS_SQL).fetch_one(&state.db).await
    } else {
        query_as::<_, LoanStats>(&format!("{LOAN_STATS_SQL} WHERE requester_id = $1"))
            .bind(subject)
            .fetch_one(&state.db)
            .await
    }
    .map_err(|e| db_error(e, sec.trace_id))?;

    // Approved material requests live on as consumption records, not loan
    // rows, so they are counted separately.
    let consumed: i64 = if privileged {
        sqlx::query_scalar("SELECT COUNT(*) FROM consumption_records")
            .fetch_one(&state.db)
            .await
    } else {
        sqlx::query_scalar("SELECT COUNT(*) FROM consumption_records WHERE consumer_id = $1")
            .bind(subject)
            .fetch_one(&state.db)
            .await
    }
    .map_err(|e| db_error(e, sec.trace_id))?;
    stats.consumed = consumed;

    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn asset_line(quantity: i32, days_ahead: i64) -> CartLine {
        CartLine {
            item_id: Uuid::new_v4(),
            item_type: "aset".into(),
            quantity,
            target_return_date: Some(Utc::now() + Duration::days(days_ahead)),
            note: None,
        }
    }

    fn submission(items: Vec<CartLine>) -> SubmitLoansRequest {
        SubmitLoansRequest { items, agreement_accepted: true }
    }

    #[test]
    fn rejects_unaccepted_agreement() {
        let payload = SubmitLoansRequest { items: vec![asset_line(1, 7)], agreement_accepted: false };
        let err = validate_lines(&payload, Utc::now()).unwrap_err();
        assert_eq!(err.code, "agreement_required");
    }

    #[test]
    fn rejects_empty_cart() {
        let err = validate_lines(&submission(vec![]), Utc::now()).unwrap_err();
        assert_eq!(err.code, "empty_cart");
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let err = validate_lines(&submission(vec![asset_line(0, 7)]), Utc::now()).unwrap_err();
        assert_eq!(err.code, "invalid_quantity");
    }

    #[test]
    fn asset_requires_future_return_date() {
        let err = validate_lines(&submission(vec![asset_line(1, -1)]), Utc::now()).unwrap_err();
        assert_eq!(err.code, "past_return_date");

        let mut line = asset_line(1, 7);
        line.target_return_date = None;
        let err = validate_lines(&submission(vec![line]), Utc::now()).unwrap_err();
        assert_eq!(err.code, "missing_return_date");
    }

    #[test]
    fn material_line_drops_return_date() {
        let line = CartLine {
            item_id: Uuid::new_v4(),
            item_type: "bahan".into(),
            quantity: 10,
            target_return_date: Some(Utc::now() + Duration::days(3)),
            note: Some("praktikum elektronika".into()),
        };
        let lines = validate_lines(&submission(vec![line]), Utc::now()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, ItemKind::Material);
        assert!(lines[0].target_return_date.is_none());
        assert_eq!(lines[0].note, "praktikum elektronika");
    }

    #[test]
    fn unknown_item_type_is_rejected() {
        let line = CartLine {
            item_id: Uuid::new_v4(),
            item_type: "equipment".into(),
            quantity: 1,
            target_return_date: None,
            note: None,
        };
        let err = validate_lines(&submission(vec![line]), Utc::now()).unwrap_err();
        assert_eq!(err.code, "invalid_item_type");
    }

    #[test]
    fn mixed_cart_validates_every_line() {
        let material = CartLine {
            item_id: Uuid::new_v4(),
            item_type: "material".into(),
            quantity: 5,
            target_return_date: None,
            note: None,
        };
        let lines = validate_lines(&submission(vec![asset_line(2, 14), material]), Utc::now()).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].kind, ItemKind::Asset);
        assert!(lines[0].target_return_date.is_some());
    }

    #[test]
    fn overdue_predicate_only_counts_approved() {
        assert!(LIST_LOANS_BASE.contains("lr.status = 'approved' AND lr.target_return_date IS NOT NULL"));
    }
}
