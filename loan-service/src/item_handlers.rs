use axum::extract::{Query, State};
use axum::Json;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityCtxExtractor};
use serde::{Deserialize, Serialize};
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::app::{db_error, AppState};
use crate::ItemKind;

#[derive(Debug, Deserialize)]
pub struct ItemFilter {
    pub kind: Option<String>,
    /// When true, only items with stock left; the borrow screen uses this.
    #[serde(default)]
    pub available: bool,
    pub q: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ItemRecord {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub code: String,
    pub stock: i32,
    pub condition: Option<String>,
}

pub async fn list_items(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
    Query(filter): Query<ItemFilter>,
) -> Result<Json<Vec<ItemRecord>>, ApiError> {
    ensure_capability(&sec, Capability::InventoryView)
        .map_err(|_| ApiError::ForbiddenMissingRole { role: "inventory_view", trace_id: sec.trace_id })?;

    let kind = match filter.kind.as_deref() {
        Some(tag) => Some(ItemKind::parse(tag).ok_or(ApiError::BadRequest {
            code: "invalid_kind",
            trace_id: sec.trace_id,
            message: Some(format!("unknown item kind '{tag}'")),
        })?),
        None => None,
    };

    let mut qb = QueryBuilder::new(
        "SELECT id, kind, name, code, stock, condition FROM inventory_items WHERE true",
    );
    if let Some(kind) = kind {
        qb.push(" AND kind = ").push_bind(kind.as_str());
    }
    if filter.available {
        qb.push(" AND stock > 0");
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| q.len() >= 2) {
        qb.push(" AND (name ILIKE ").push_bind(format!("%{q}%"));
        qb.push(" OR code ILIKE ").push_bind(format!("%{q}%"));
        qb.push(")");
    }
    qb.push(" ORDER BY name");

    let items = qb
        .build_query_as::<ItemRecord>()
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(e, sec.trace_id))?;

    Ok(Json(items))
}
