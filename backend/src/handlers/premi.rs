//! Supervisor premi HTTP handlers

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::handlers::{rejected, Envelope};
use crate::middleware::CurrentContext;
use crate::services::premi::{monthly_premi, DailyPremiInput, MonthlyPremiInput};
use crate::services::PremiService;
use crate::AppState;

/// Daily supervisor premi computed from the day's harvest, not stored
pub async fn preview_daily_premi(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(input): Query<DailyPremiInput>,
) -> Response {
    let service = PremiService::new(state.db.clone());

    match service.preview_daily(ctx.company_id, &input).await {
        Ok(premi) => Envelope::ok(ctx.request_id, "Success Get Premi Data", premi).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn store_daily_premi(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Json(input): Json<DailyPremiInput>,
) -> Response {
    let service = PremiService::new(state.db.clone());

    match service.store_daily(ctx.company_id, &input).await {
        Ok(stored) => Envelope::new(ctx.request_id, 201, "Record Created Successfully", stored)
            .into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn post_daily_premi(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path(id): Path<i64>,
) -> Response {
    let service = PremiService::new(state.db.clone());

    match service.post_daily(id).await {
        Ok(stored) => Envelope::ok(ctx.request_id, "Success", stored).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn delete_daily_premi(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Path(id): Path<i64>,
) -> Response {
    let service = PremiService::new(state.db.clone());

    match service.delete_daily(id).await {
        Ok(()) => Envelope::ok(ctx.request_id, "Record Deleted", Vec::<Value>::new()).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Afdeling and estate manager premi for a period
pub async fn compute_monthly_premi(
    CurrentContext(ctx): CurrentContext,
    Json(input): Json<MonthlyPremiInput>,
) -> Response {
    match monthly_premi(&input) {
        Ok(result) => Envelope::ok(ctx.request_id, "Success", result).into_response(),
        Err(e) => rejected(ctx.request_id, e),
    }
}
