//! Weighbridge and partner master data handlers

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde_json::Value;

use shared::{partner_schema, weighbridge_schema, BatchOutcome};

use crate::handlers::{batch_response, listing, rejected, screen_items};
use crate::middleware::CurrentContext;
use crate::services::master_data::QualityTypeFilter;
use crate::services::MasterDataService;
use crate::AppState;

pub async fn list_weighbridges(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
) -> Response {
    let service = MasterDataService::new(state.db.clone());

    match service.list_weighbridges(ctx.company_id).await {
        Ok(items) => listing(ctx.request_id, "Success Get Weighbridge Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_partners(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
) -> Response {
    let service = MasterDataService::new(state.db.clone());

    match service.list_partners(ctx.company_id).await {
        Ok(items) => listing(ctx.request_id, "Success Get Partner Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// `penalty`, `return` or `fraction` quality types
pub async fn list_quality_types(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path(kind): Path<String>,
) -> Response {
    let Some(filter) = QualityTypeFilter::parse(&kind) else {
        return listing::<Value>(ctx.request_id, "", Vec::new());
    };
    let service = MasterDataService::new(state.db.clone());

    match service.list_quality_types(filter).await {
        Ok(items) => listing(
            ctx.request_id,
            &format!("Success Get {} Quality Type Data", filter.label()),
            items,
        ),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn create_weighbridges(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "weighbridge", |_| weighbridge_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = MasterDataService::new(state.db.clone());
    match service.create_weighbridges(items, ctx.company_id, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn create_partners(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(body): Json<Value>,
) -> Response {
    let mut batch = BatchOutcome::new();
    let items = match screen_items(&body, "partner", |_| partner_schema(), &mut batch) {
        Ok(items) => items,
        Err(e) => return rejected(ctx.request_id, e),
    };

    let service = MasterDataService::new(state.db.clone());
    match service.create_partners(items, ctx.company_id, &mut batch).await {
        Ok(()) => batch_response(ctx.request_id, batch),
        Err(e) => rejected(ctx.request_id, e),
    }
}
