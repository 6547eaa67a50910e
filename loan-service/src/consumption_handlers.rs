use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use common_security::{has_capability, Capability, SecurityCtxExtractor};
use serde::Serialize;
use sqlx::query_as;
use uuid::Uuid;

use crate::app::{db_error, AppState};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ConsumptionRecord {
    pub id: Uuid,
    pub material_id: Uuid,
    pub material_name: String,
    pub material_code: String,
    pub consumer_id: Uuid,
    pub consumer_name: String,
    pub quantity_used: i32,
    pub used_at: DateTime<Utc>,
    pub purpose: String,
    pub approver_id: Uuid,
    pub approved_at: DateTime<Utc>,
}

const LIST_CONSUMPTIONS_BASE: &str = "SELECT cr.id, cr.material_id, ii.name AS material_name, \
    ii.code AS material_code, cr.consumer_id, cr.consumer_name, cr.quantity_used, cr.used_at, \
    cr.purpose, cr.approver_id, cr.approved_at \
    FROM consumption_records cr JOIN inventory_items ii ON ii.id = cr.material_id";

pub async fn list_consumptions(
    State(state): State<AppState>,
    SecurityCtxExtractor(sec): SecurityCtxExtractor,
) -> Result<Json<Vec<ConsumptionRecord>>, ApiError> {
    let subject = sec.subject()?;
    let records = if has_capability(&sec, Capability::LoanViewAll) {
        query_as::<_, ConsumptionRecord>(&format!("{LIST_CONSUMPTIONS_BASE} ORDER BY cr.approved_at DESC"))
            .fetch_all(&state.db)
            .await
    } else {
        query_as::<_, ConsumptionRecord>(&format!(
            "{LIST_CONSUMPTIONS_BASE} WHERE cr.consumer_id = $1 ORDER BY cr.approved_at DESC"
        ))
        .bind(subject)
        .fetch_all(&state.db)
        .await
    }
    .map_err(|e| db_error(e, sec.trace_id))?;

    Ok(Json(records))
}
