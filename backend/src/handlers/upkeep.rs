//! Upkeep operation HTTP handlers

use axum::{extract::State, response::Response, Json};
use serde_json::Value;

use shared::{upkeep_operation_schema, BatchOutcome};

use crate::handlers::{batch_response, rejected, screen_items};
use crate::middleware::CurrentContext;
use crate::services::UpkeepService;
use crate::AppState;

/// Create upkeep operations with their labour and material lines
pub async fn create_upkeeps(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "upkeep", |_| upkeep_operation_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = UpkeepService::new(state.db.clone());
    match service.create_operations(items, ctx.company_id, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn update_upkeeps(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "upkeep", |_| upkeep_operation_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = UpkeepService::new(state.db.clone());
    match service.update_operations(items, ctx.company_id, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}
