//! Scale ticket HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use shared::{scale_ticket_schema_for, BatchOutcome, Pagination, ReturnRequest, ScaleState};

use crate::error::AppError;
use crate::handlers::{batch_response, listing, rejected, screen_items, settings_for, Envelope};
use crate::middleware::CurrentContext;
use crate::services::scale_ticket::{MergeInput, ScaleAction, SplitInput, UnloadInput};
use crate::services::ScaleTicketService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub state: Option<String>,
}

pub async fn list_scale_tickets(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<TicketListQuery>,
) -> Response {
    let defaults = Pagination::default();
    let pagination = Pagination {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };
    let filter = query.state.as_deref().and_then(ScaleState::parse);

    let service = ScaleTicketService::new(state.db.clone());
    match service.list(ctx.company_id, &pagination, filter).await {
        Ok(items) => listing(ctx.request_id, "Success Get Scale Ticket Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn create_scale_tickets(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "scale_ticket", scale_ticket_schema_for, &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.create_tickets(items, ctx.company_id, &settings, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Replace draft tickets; gated by the company's update switch
pub async fn update_scale_tickets(
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
    let items = match screen_items(&body, "scale_ticket", scale_ticket_schema_for, &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.update_tickets(items, &settings, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn scale_ticket_action(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path((id, action)): Path<(Uuid, String)>,
) -> Response {
    let Some(action) = ScaleAction::parse(&action) else {
        return rejected(
            ctx.request_id,
            AppError::ValidationError(format!("Unknown action '{}'", action)),
        );
    };
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.apply_action(id, action, &settings).await {
        Ok(summary) => Envelope::ok(ctx.request_id, "Success", summary).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn record_unload(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path(id): Path<Uuid>,
    Json(input): Json<UnloadInput>,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.update_unload(id, &input, &settings).await {
        Ok(summary) => Envelope::ok(ctx.request_id, "Success", summary).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn split_scale_tickets(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(input): Json<SplitInput>,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.split(&input, &settings).await {
        Ok(outcome) => Envelope::ok(ctx.request_id, "Split Success", outcome).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn merge_scale_tickets(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(input): Json<MergeInput>,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.merge(&input, &settings).await {
        Ok(summary) => Envelope::ok(ctx.request_id, "Merge Success", summary).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn return_scale_tickets(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(request): Json<ReturnRequest>,
) -> Response {
    let settings = match settings_for(&state, &ctx).await {
        Ok(settings) => settings,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = ScaleTicketService::new(state.db.clone());
    match service.return_tickets(&request, &settings).await {
        Ok(returns) => Envelope::ok(ctx.request_id, "Return Success", returns).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}
