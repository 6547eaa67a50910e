use crate::{Actor, LoanEvent, LoanEventKind, NotifyError, NotifyResult, LOAN_EVENT_VERSION};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Boundary to the surrounding notification layer (in-app inbox, chat bot).
/// Implementations must be cheap to call; the service treats delivery as
/// fire-and-forget and never rolls back on a sink failure.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &LoanEvent) -> NotifyResult<()>;
}

/// Default sink: structured log line per event. Keeps the event stream
/// observable without wiring a real transport.
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &LoanEvent) -> NotifyResult<()> {
        tracing::info!(
            kind = event.kind.as_str(),
            request_id = %event.request_id,
            item_name = %event.item_name,
            requester_name = %event.requester_name,
            quantity = event.quantity,
            "loan notification"
        );
        Ok(())
    }
}

pub struct NoopSink;

#[async_trait::async_trait]
impl NotificationSink for NoopSink {
    async fn deliver(&self, _event: &LoanEvent) -> NotifyResult<()> {
        Ok(())
    }
}

/// Sink that records delivered events in memory; test helper.
#[derive(Default)]
pub struct MemorySink {
    pub delivered: std::sync::Mutex<Vec<LoanEvent>>,
}

#[async_trait::async_trait]
impl NotificationSink for MemorySink {
    async fn deliver(&self, event: &LoanEvent) -> NotifyResult<()> {
        self.delivered
            .lock()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    source_service: &'static str,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, source_service: &'static str) -> Self {
        Self { sink, source_service }
    }

    pub async fn emit(
        &self,
        kind: LoanEventKind,
        request_id: Uuid,
        item_name: impl Into<String>,
        requester_name: impl Into<String>,
        quantity: i32,
        trace_id: Option<Uuid>,
    ) -> NotifyResult<LoanEvent> {
        let event = LoanEvent {
            event_id: Uuid::new_v4(),
            event_version: LOAN_EVENT_VERSION,
            kind,
            request_id,
            item_name: item_name.into(),
            requester_name: requester_name.into(),
            quantity,
            occurred_at: Utc::now(),
            source_service: self.source_service.to_string(),
            trace_id,
        };
        self.sink.deliver(&event).await?;
        Ok(event)
    }
}

pub fn extract_actor_from_headers(headers: &axum::http::HeaderMap, subject: Option<Uuid>) -> Actor {
    use axum::http::HeaderMap;
    fn header_str(map: &HeaderMap, name: &str) -> Option<String> {
        map.get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
    let mut actor = Actor { id: subject, name: None, email: None };
    if let Some(v) = header_str(headers, "X-User-ID").and_then(|s| Uuid::parse_str(&s).ok()) {
        actor.id = Some(v);
    }
    if let Some(v) = header_str(headers, "X-User-Name") {
        actor.name = Some(v);
    }
    if let Some(v) = header_str(headers, "X-User-Email") {
        actor.email = Some(v);
    }
    actor
}
