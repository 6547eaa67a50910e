use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap};
use common_http_errors::ApiError;
use common_notify::{extract_actor_from_headers, Actor};
use serde::{Deserialize, Serialize};
use tracing::Span;
use uuid::Uuid;

use crate::roles::Role;

/// Caller identity for one workflow call. Authentication happens upstream
/// (session layer / gateway); this carries the already-established identity
/// into the core explicitly instead of reading an ambient global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub actor: Actor,
    pub roles: Vec<Role>,
    pub trace_id: Option<Uuid>,
}

impl SecurityContext {
    /// Subject id; present on every accepted request, the extractor
    /// rejects calls without one.
    pub fn subject(&self) -> Result<Uuid, ApiError> {
        self.actor.id.ok_or(ApiError::BadRequest {
            code: "missing_user_id",
            trace_id: self.trace_id,
            message: Some("Caller identity is required".into()),
        })
    }
}

pub struct SecurityCtxExtractor(pub SecurityContext);

fn subject_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn roles_from_headers(headers: &HeaderMap) -> Vec<Role> {
    headers
        .get("X-Roles")
        .and_then(|v| v.to_str().ok())
        .map(|csv| {
            csv.split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(Role::from_str)
                .collect()
        })
        .unwrap_or_default()
}

fn trace_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-Trace-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for SecurityCtxExtractor where S: Send + Sync {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let subject = subject_from_headers(headers)
            .ok_or_else(|| ApiError::BadRequest {
                code: "missing_user_id",
                trace_id: None,
                message: Some("Missing X-User-ID header".into()),
            })?;

        let actor = extract_actor_from_headers(headers, Some(subject));
        let roles = roles_from_headers(headers);
        let trace_id = trace_id_from_headers(headers).or_else(|| Some(Uuid::new_v4()));

        Span::current().record("user_id", tracing::field::display(subject));
        if let Some(tid) = trace_id.as_ref() {
            Span::current().record("trace_id", tracing::field::display(tid));
        }

        Ok(SecurityCtxExtractor(SecurityContext { actor, roles, trace_id }))
    }
}
