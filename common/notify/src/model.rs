use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of the user a workflow call is performed for. Filled from
/// gateway-verified headers; the core never authenticates anyone itself.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
}

pub const LOAN_EVENT_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanEventKind {
    LoanCreated,
    LoanApproved,
    LoanRejected,
}

impl LoanEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanEventKind::LoanCreated => "loan_created",
            LoanEventKind::LoanApproved => "loan_approved",
            LoanEventKind::LoanRejected => "loan_rejected",
        }
    }
}

/// Outbound notification payload. Delivery (in-app, chat bot) is owned by
/// whatever sink the service is wired with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanEvent {
    pub event_id: Uuid,
    pub event_version: i32,
    pub kind: LoanEventKind,
    pub request_id: Uuid,
    pub item_name: String,
    pub requester_name: String,
    pub quantity: i32,
    pub occurred_at: DateTime<Utc>,
    pub source_service: String,
    pub trace_id: Option<Uuid>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("sink not configured")]
    NotConfigured,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("delivery error: {0}")]
    Delivery(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
