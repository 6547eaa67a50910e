use axum::http::HeaderMap;
use common_notify::{extract_actor_from_headers, LoanEventKind, MemorySink, Notifier};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn header_overrides_subject() {
    let subject = Uuid::new_v4();
    let header_id = Uuid::new_v4();
    let mut headers = HeaderMap::new();
    headers.insert("X-User-ID", header_id.to_string().parse().unwrap());
    headers.insert("X-User-Name", "Budi Santoso".parse().unwrap());
    let actor = extract_actor_from_headers(&headers, Some(subject));
    assert_eq!(actor.id, Some(header_id));
    assert_eq!(actor.name.as_deref(), Some("Budi Santoso"));
}

#[test]
fn falls_back_to_subject_when_headers_absent() {
    let subject = Uuid::new_v4();
    let actor = extract_actor_from_headers(&HeaderMap::new(), Some(subject));
    assert_eq!(actor.id, Some(subject));
    assert!(actor.name.is_none());
}

#[tokio::test]
async fn emit_fills_envelope_and_reaches_sink() {
    let sink = Arc::new(MemorySink::default());
    let notifier = Notifier::new(sink.clone(), "loan-service");
    let request_id = Uuid::new_v4();
    let ev = notifier
        .emit(LoanEventKind::LoanApproved, request_id, "Multimeter", "Budi", 2, None)
        .await
        .expect("emit");
    assert_eq!(ev.kind, LoanEventKind::LoanApproved);
    assert_eq!(ev.request_id, request_id);
    assert_eq!(ev.quantity, 2);
    let delivered = sink.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].item_name, "Multimeter");
}
