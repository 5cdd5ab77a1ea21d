//! Harvest operation HTTP handlers

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use shared::{harvest_operation_schema, BatchOutcome};

use crate::error::AppError;
use crate::handlers::{batch_response, rejected, screen_items, Envelope};
use crate::middleware::CurrentContext;
use crate::services::harvest::OperationAction;
use crate::services::HarvestService;
use crate::AppState;

/// Create harvest operations with their labour records
pub async fn create_harvests(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "harvest", |_| harvest_operation_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = HarvestService::new(state.db.clone());
    match service.create_operations(items, ctx.company_id, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn update_harvests(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "harvest", |_| harvest_operation_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = HarvestService::new(state.db.clone());
    match service.update_operations(items, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn harvest_action(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path((id, action)): Path<(i64, String)>,
) -> Response {
    let Some(action) = OperationAction::parse(&action) else {
        return rejected(
            ctx.request_id,
            AppError::ValidationError(format!("Unknown action '{}'", action)),
        );
    };

    let service = HarvestService::new(state.db.clone());
    match service.apply_action(id, action).await {
        Ok(summary) => Envelope::ok(ctx.request_id, "Success", summary).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Remove one labour record of a draft operation
pub async fn delete_harvest_record(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path(record_id): Path<i64>,
) -> Response {
    let service = HarvestService::new(state.db.clone());

    match service.remove_record(record_id).await {
        Ok(()) => Envelope::ok(ctx.request_id, "Record Deleted", Vec::<Value>::new()).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}
