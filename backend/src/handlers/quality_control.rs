//! Quality control HTTP handlers

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use shared::{quality_control_schema, BatchOutcome};

use crate::error::AppError;
use crate::handlers::{batch_response, rejected, screen_items, settings_for, Envelope};
use crate::middleware::CurrentContext;
use crate::services::quality_control::QcAction;
use crate::services::QualityControlService;
use crate::AppState;

pub async fn create_quality_controls(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "quality_control", |_| quality_control_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = QualityControlService::new(state.db.clone());
    match service
        .create_quality_controls(items, ctx.company_id, &settings, &mut batch)
        .await
    {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn update_quality_controls(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };
    if let Err(e) = ctx.ensure_can_update(&settings) {
        return rejected(ctx.request_id, e);
    }

    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "quality_control", |_| quality_control_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = QualityControlService::new(state.db.clone());
    match service.update_quality_controls(items, &settings, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn quality_control_action(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path((id, action)): Path<(Uuid, String)>,
) -> Response {
    let Some(action) = QcAction::parse(&action) else {
        return rejected(
            ctx.request_id,
            AppError::ValidationError(format!("Unknown action '{}'", action)),
        );
    };
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = QualityControlService::new(state.db.clone());
    match service.apply_action(id, action, &settings).await {
        Ok(summary) => Envelope::ok(ctx.request_id, "Success", summary).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Attach every kept payload whose ticket now exists
pub async fn upload_pending_quality_controls(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = QualityControlService::new(state.db.clone());
    match service.upload_pending(ctx.company_id, &settings).await {
        Ok(results) => {
            Envelope::ok(ctx.request_id, "Pending Data Uploaded", results).into_response()
        }
        Err(e) => rejected(ctx.request_id, e),
    }
}
