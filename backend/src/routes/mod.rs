//! Route definitions for the estate weighbridge platform

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create the application routes; everything under `/api` needs a bearer token
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .nest("/weighbridge", weighbridge_routes())
        .nest("/farm", farm_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        // Public
        .route("/health", get(handlers::health_check))
        .route("/auth/token/get", post(handlers::get_token))
        .nest("/api", protected)
}

fn weighbridge_routes() -> Router<AppState> {
    Router::new()
        .route("/weighbridges", get(handlers::list_weighbridges))
        .route("/partners", get(handlers::list_partners))
        .route("/quality_type/:kind", get(handlers::list_quality_types))
        .route("/weighbridge", post(handlers::create_weighbridges))
        .route("/partner", post(handlers::create_partners))
        .route(
            "/scale_ticket",
            get(handlers::list_scale_tickets)
                .post(handlers::create_scale_tickets)
                .put(handlers::update_scale_tickets),
        )
        .route("/scale_ticket/split", post(handlers::split_scale_tickets))
        .route("/scale_ticket/merge", post(handlers::merge_scale_tickets))
        .route("/scale_ticket/return", post(handlers::return_scale_tickets))
        .route("/scale_ticket/:id/unload", post(handlers::record_unload))
        .route("/scale_ticket/:id/:action", post(handlers::scale_ticket_action))
        .route(
            "/quality_control",
            post(handlers::create_quality_controls).put(handlers::update_quality_controls),
        )
        .route(
            "/quality_control/pending/upload",
            post(handlers::upload_pending_quality_controls),
        )
        .route("/quality_control/:id/:action", post(handlers::quality_control_action))
}

fn farm_routes() -> Router<AppState> {
    Router::new()
        .route("/employee", get(handlers::list_farm_employees))
        .route("/partners", get(handlers::list_farm_partners))
        .route("/estate", get(handlers::list_estates))
        .route("/afdeling", get(handlers::list_afdelings))
        .route("/block", get(handlers::list_blocks))
        .route("/product/category", get(handlers::list_product_categories))
        .route("/product/items", get(handlers::list_farm_products))
        .route("/penalty", get(handlers::list_penalties))
        .route("/activity", get(handlers::list_activities))
        .route("/teams", get(handlers::list_harvest_teams))
        .route("/users", get(handlers::list_mobile_users))
        .route("/operation_type", get(handlers::list_operation_types))
        .route("/planning/harvest", get(handlers::list_planned_harvests))
        .route("/planning/upkeep", get(handlers::list_planned_upkeeps))
        .route(
            "/harvesting",
            post(handlers::create_harvests).put(handlers::update_harvests),
        )
        .route("/harvesting/premi", get(handlers::preview_daily_premi))
        .route("/harvesting/record/:id", delete(handlers::delete_harvest_record))
        .route("/harvesting/:id/:action", post(handlers::harvest_action))
        .route(
            "/upkeeping",
            post(handlers::create_upkeeps).put(handlers::update_upkeeps),
        )
        .route("/premi/daily", post(handlers::store_daily_premi))
        .route("/premi/daily/:id", delete(handlers::delete_daily_premi))
        .route("/premi/daily/:id/post", post(handlers::post_daily_premi))
        .route("/premi/monthly", post(handlers::compute_monthly_premi))
}
