use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use common_notify::LoanEventKind;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use serde::{Deserialize, Serialize};
use sqlx::query_as;
use uuid::Uuid;

use crate::app::{db_error, stock_error, AppState};
use crate::stock;
use crate::{ItemKind, LoanStatus};

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub action: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub request_id: Uuid,
    pub result: LoanStatus,
    /// Set when approving a material: the loan row is gone and this record
    /// replaced it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumption_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_restored: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecisionAction {
    Approve,
    Reject,
}

/// Reject must always be explained; approve may carry an optional note.
pub(crate) fn parse_decision(action: &str, note: Option<&str>) -> Result<(DecisionAction, String), (&'static str, String)> {
    let action = match action {
        "approve" => DecisionAction::Approve,
        "reject" => DecisionAction::Reject,
        other => return Err(("invalid_action", format!("unknown action '{other}'"))),
    };
    let note = note.map(str::trim).unwrap_or_default().to_string();
    if action == DecisionAction::Reject && note.is_empty() {
        return Err(("note_required", "A rejection must carry an explanation".into()));
    }
    Ok((action, note))
}

#[derive(Debug, sqlx::FromRow)]
struct PendingLoanRow {
    id: Uuid,
    item_id: Uuid,
    item_kind: String,
    requester_id: Uuid,
    requester_name: String,
    quantity: i32,
    status: String,
    requested_at: DateTime<Utc>,
    note: String,
    item_name: String,
}

// Lock only the loan row here; the stock ledger takes the item lock itself.
const LOCK_LOAN_SQL: &str = "SELECT lr.id, lr.item_id, lr.item_kind, lr.requester_id, \
    lr.requester_name, lr.quantity, lr.status, lr.requested_at, lr.note, ii.name AS item_name \
    FROM loan_requests lr JOIN inventory_items ii ON ii.id = lr.item_id \
    WHERE lr.id = $1 FOR UPDATE OF lr";

const INSERT_CONSUMPTION_SQL: &str = "INSERT INTO consumption_records \
    (id, material_id, consumer_id, consumer_name, quantity_used, used_at, purpose, approver_id, approved_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())";

/// Approve or reject a pending request. The Pending check runs after the
/// row lock is taken, so two concurrent decisions resolve to exactly one
/// winner; the loser gets `already_processed`.
pub async fn decide_loan(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    ensure_capability(&sec, Capability::LoanApprove)
        .map_err(|_| ApiError::ForbiddenMissingRole { role: "loan_approve", trace_id: sec.trace_id })?;
    let approver = sec.subject()?;

    let (action, note) = parse_decision(&payload.action, payload.note.as_deref())
        .map_err(|(code, message)| ApiError::BadRequest { code, trace_id: sec.trace_id, message: Some(message) })?;

    let timer = state.metrics.decision_duration_seconds.start_timer();

    let mut tx = stock::begin_repeatable_read(&state.db)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?;

    let loan = query_as::<_, PendingLoanRow>(LOCK_LOAN_SQL)
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?
        .ok_or(ApiError::NotFound { code: "loan_not_found", trace_id: sec.trace_id })?;

    let status = LoanStatus::parse(&loan.status)
        .ok_or_else(|| ApiError::internal(format!("loan {} has corrupt status '{}'", loan.id, loan.status), sec.trace_id))?;
    if !status.accepts_decision() {
        return Err(ApiError::Conflict {
            code: "already_processed",
            trace_id: sec.trace_id,
            message: Some(format!("request is {status}, not pending")),
        });
    }
    let kind = ItemKind::parse(&loan.item_kind)
        .ok_or_else(|| ApiError::internal(format!("loan {} has corrupt kind '{}'", loan.id, loan.item_kind), sec.trace_id))?;

    let mut consumption_id = None;
    let mut stock_restored = None;
    let result = match (action, kind) {
        (DecisionAction::Approve, ItemKind::Asset) => {
            // Stock stays decremented while the asset is out.
            sqlx::query(
                "UPDATE loan_requests SET status = 'approved', approver_id = $2, approved_at = now(), approval_note = $3 WHERE id = $1",
            )
            .bind(loan.id)
            .bind(approver)
            .bind(&note)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, sec.trace_id))?;
            LoanStatus::Approved
        }
        (DecisionAction::Approve, ItemKind::Material) => {
            // The reservation becomes permanent consumption: record it and
            // drop the request in the same transaction.
            let record_id = Uuid::new_v4();
            sqlx::query(INSERT_CONSUMPTION_SQL)
                .bind(record_id)
                .bind(loan.item_id)
                .bind(loan.requester_id)
                .bind(&loan.requester_name)
                .bind(loan.quantity)
                .bind(loan.requested_at)
                .bind(&loan.note)
                .bind(approver)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(e, sec.trace_id))?;
            sqlx::query("DELETE FROM loan_requests WHERE id = $1")
                .bind(loan.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(e, sec.trace_id))?;
            consumption_id = Some(record_id);
            LoanStatus::Approved
        }
        (DecisionAction::Reject, _) => {
            let restored = stock::release(&mut tx, loan.item_id, loan.quantity)
                .await
                .map_err(|e| stock_error(e, sec.trace_id))?;
            sqlx::query(
                "UPDATE loan_requests SET status = 'rejected', approver_id = $2, approved_at = now(), approval_note = $3 WHERE id = $1",
            )
            .bind(loan.id)
            .bind(approver)
            .bind(&note)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, sec.trace_id))?;
            stock_restored = Some(restored);
            LoanStatus::Rejected
        }
    };

    tx.commit().await.map_err(|e| db_error(e, sec.trace_id))?;
    // The histogram covers the decision transaction only, not the
    // notification delivery below.
    timer.observe_duration();

    let event_kind = match result {
        LoanStatus::Rejected => {
            state.metrics.rejections_total.inc();
            LoanEventKind::LoanRejected
        }
        _ => {
            state.metrics.approvals_total.inc();
            LoanEventKind::LoanApproved
        }
    };
    tracing::info!(
        request_id = %loan.id,
        approver = %approver,
        result = %result,
        quantity = loan.quantity,
        "loan decision committed"
    );

    if let Err(err) = state
        .notifier
        .emit(
            event_kind,
            loan.id,
            loan.item_name.clone(),
            loan.requester_name.clone(),
            loan.quantity,
            sec.trace_id,
        )
        .await
    {
        state.metrics.notify_failures_total.inc();
        tracing::warn!(error = %err, request_id = %loan.id, "failed to emit decision notification");
    }

    Ok(Json(DecisionResponse { request_id: loan.id, result, consumption_id, stock_restored }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_without_note_is_refused() {
        let err = parse_decision("reject", None).unwrap_err();
        assert_eq!(err.0, "note_required");
        let err = parse_decision("reject", Some("   ")).unwrap_err();
        assert_eq!(err.0, "note_required");
    }

    #[test]
    fn reject_with_note_passes() {
        let (action, note) = parse_decision("reject", Some("duplicate")).unwrap();
        assert_eq!(action, DecisionAction::Reject);
        assert_eq!(note, "duplicate");
    }

    #[test]
    fn approve_note_is_optional() {
        let (action, note) = parse_decision("approve", None).unwrap();
        assert_eq!(action, DecisionAction::Approve);
        assert!(note.is_empty());
    }

    #[test]
    fn unknown_action_is_refused() {
        let err = parse_decision("cancel", Some("x")).unwrap_err();
        assert_eq!(err.0, "invalid_action");
    }

    #[test]
    fn lock_query_locks_only_the_loan_row() {
        assert!(LOCK_LOAN_SQL.ends_with("FOR UPDATE OF lr"));
    }
}
