//! Farm master data listings for the mobile app

use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;

use shared::Pagination;

use crate::handlers::{listing, rejected};
use crate::middleware::{AuthContext, CurrentContext};
use crate::services::farm_data::PlanningKind;
use crate::services::FarmDataService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    /// Missing or zero values fall back to the defaults
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.filter(|p| *p > 0).unwrap_or(defaults.page),
            per_page: self.per_page.filter(|p| *p > 0).unwrap_or(defaults.per_page),
        }
    }
}

/// Active field workers of the caller's company
pub async fn list_farm_employees(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.employees(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Employee Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_farm_partners(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.partners(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Partner Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_estates(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.estates(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Estate Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_afdelings(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.afdelings(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Afdeling Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_blocks(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.blocks(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Block Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_farm_products(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.products(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Product Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_penalties(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.penalties(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Penalty Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_activities(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.activities(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Activity Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_harvest_teams(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.teams(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Harvest Team Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Mobile users without their credentials
pub async fn list_mobile_users(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.users(ctx.company_id, &query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get User Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_product_categories(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.product_categories(&query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Product Category Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

pub async fn list_operation_types(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service.operation_types(&query.pagination()).await {
        Ok(items) => listing(ctx.request_id, "Success Get Operation Type Data", items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

async fn planned(
    state: AppState,
    ctx: AuthContext,
    query: PageQuery,
    kind: PlanningKind,
    message: &str,
) -> Response {
    let service = FarmDataService::new(state.db.clone());
    match service
        .planned_operations(kind, ctx.company_id, ctx.partner_id, &query.pagination())
        .await
    {
        Ok(items) => listing(ctx.request_id, message, items),
        Err(e) => rejected(ctx.request_id, e),
    }
}

/// Confirmed harvest plans assigned to the caller
pub async fn list_planned_harvests(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    planned(state, ctx, query, PlanningKind::Harvest, "Success Get Planned Harvest Data").await
}

pub async fn list_planned_upkeeps(
    State(state): State<AppState>,
    CurrentContext(ctx): CurrentContext,
    Query(query): Query<PageQuery>,
) -> Response {
    planned(state, ctx, query, PlanningKind::Upkeep, "Success Get Planned Upkeep Data").await
}
