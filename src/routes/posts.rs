use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db;
use crate::error::AppError;
use crate::legacy;
use crate::routes::cron::require_secret;
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ImportRequest {
    pub records: Vec<Value>,
}

/// One-shot migration surface: accepts scheduled-post documents exported
/// from the old store, whatever generation of field names they carry, and
/// inserts the normalized rows. Bad records are reported per index, not
/// fatal to the batch.
pub async fn import(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ImportRequest>,
) -> Result<Json<Value>, AppError> {
    require_secret(&headers, &state.config)?;

    if req.records.is_empty() {
        return Err(AppError::BadRequest("records is empty".into()));
    }

    let mut imported = 0u32;
    let mut rejections: Vec<Value> = Vec::new();

    for (index, doc) in req.records.iter().enumerate() {
        match legacy::normalize(doc) {
            Ok(post) => {
                db::scheduled_posts::insert_legacy(
                    &state.pool,
                    &post,
                    state.config.default_max_attempts,
                )
                .await?;
                imported += 1;
            }
            Err(reason) => {
                rejections.push(json!({ "index": index, "error": reason }));
            }
        }
    }

    tracing::info!(
        "Legacy import: {imported} inserted, {} rejected",
        rejections.len()
    );

    Ok(Json(json!({
        "imported": imported,
        "rejected": rejections.len(),
        "errors": rejections,
    })))
}
