//! HTTP handlers and the response envelope they share

pub mod auth;
pub mod farm_data;
pub mod harvest;
pub mod health;
pub mod master_data;
pub mod premi;
pub mod quality_control;
pub mod scale_ticket;
pub mod upkeep;

pub use auth::*;
pub use farm_data::*;
pub use harvest::*;
pub use health::*;
pub use master_data::*;
pub use premi::*;
pub use quality_control::*;
pub use scale_ticket::*;
pub use upkeep::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use shared::{check_missing_or_incorrect_fields, BatchOutcome, FieldSchema, ItemResult, RefId};

use crate::config::OperationSettings;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthContext;
use crate::services::master_data::text;
use crate::services::MasterDataService;
use crate::AppState;

const DATA_NOT_FOUND: &str = "Data Not Found";

/// `{request_id, status, message, data}` body of every API response
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub request_id: Uuid,
    pub status: u16,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(request_id: Uuid, status: u16, message: impl Into<String>, data: T) -> Self {
        Self {
            request_id,
            status,
            message: message.into(),
            data,
        }
    }

    pub fn ok(request_id: Uuid, message: impl Into<String>, data: T) -> Self {
        Self::new(request_id, 200, message, data)
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        // 204 travels in the body; the response itself still carries data
        let code = match self.status {
            204 => StatusCode::OK,
            status => StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
        };
        (code, Json(self)).into_response()
    }
}

/// Listing envelope; an empty listing reports 204 "Data Not Found"
pub fn listing<T: Serialize>(request_id: Uuid, message: &str, items: Vec<T>) -> Response {
    if items.is_empty() {
        return Envelope::new(request_id, 204, DATA_NOT_FOUND, Vec::<T>::new()).into_response();
    }
    Envelope::ok(request_id, message, items).into_response()
}

/// Client errors become a 400 envelope, everything else the error body
pub fn rejected(request_id: Uuid, err: AppError) -> Response {
    match err {
        AppError::Forbidden(_) | AppError::ValidationError(_) | AppError::Validation { .. } => {
            Envelope::new(request_id, 400, err.item_message(), Vec::<Value>::new()).into_response()
        }
        other => other.into_response(),
    }
}

/// Items under `key` that pass `schema_for`; the rest are recorded as failed
pub fn screen_items(
    body: &Value,
    key: &str,
    schema_for: impl Fn(&Value) -> FieldSchema,
    batch: &mut BatchOutcome,
) -> AppResult<Vec<Value>> {
    let items = match body.get(key).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items,
        _ => return Err(AppError::ValidationError("Request data is empty".to_string())),
    };

    let mut accepted = Vec::with_capacity(items.len());
    for item in items {
        match check_missing_or_incorrect_fields(item, &schema_for(item)) {
            Some(message) => batch.push_schema_failure(ItemResult::failed(
                None,
                text(item, "name"),
                RefId::from_json(item),
                message,
            )),
            None => accepted.push(item.clone()),
        }
    }
    Ok(accepted)
}

pub fn batch_response(request_id: Uuid, batch: BatchOutcome) -> Response {
    let status = batch.status();
    let message = batch.message();
    Envelope::new(request_id, status, message, batch.into_items()).into_response()
}

/// Switches of the caller's company, falling back to configured defaults
pub async fn settings_for(state: &AppState, ctx: &AuthContext) -> AppResult<OperationSettings> {
    MasterDataService::new(state.db.clone())
        .operation_settings(ctx.company_id, &state.config.operations)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::scale_ticket_schema_for;

    #[test]
    fn schema_failures_are_reported_and_removed() {
        let body = json!({
            "scale_ticket": [
                {
                    "ref_id": 1, "name": "T1", "weighbridge_id": 1, "product_id": 2,
                    "partner_id": 3, "weight_in": 1000, "weight_out": 200.5
                },
                { "ref_id": 2, "name": "T2" }
            ]
        });
        let mut batch = BatchOutcome::new();
        let accepted = screen_items(&body, "scale_ticket", scale_ticket_schema_for, &mut batch).unwrap();

        assert_eq!(accepted.len(), 1);
        assert_eq!(batch.status(), 400);
        assert_eq!(batch.failed(), 1);
        let items = batch.into_items();
        assert_eq!(items[0].name.as_deref(), Some("T2"));
        assert!(items[0].message.starts_with("Required Fields Not Found: weighbridge_id"));
    }

    #[test]
    fn missing_key_is_an_empty_request() {
        let mut batch = BatchOutcome::new();
        let err = screen_items(&json!({}), "harvest", |_| FieldSchema::new(), &mut batch).unwrap_err();
        assert_eq!(err.item_message(), "Request data is empty");
    }

    #[test]
    fn empty_listing_reports_no_content_in_body() {
        let response = listing::<u8>(Uuid::new_v4(), "Success Get Partner Data", vec![]);
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = tokio_test::block_on(axum::body::to_bytes(response.into_body(), usize::MAX)).unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], 204);
        assert_eq!(body["message"], "Data Not Found");
        assert_eq!(body["data"], json!([]));
    }

    #[test]
    fn gate_failures_use_the_envelope() {
        let response = rejected(
            Uuid::new_v4(),
            AppError::Forbidden("You don't have access to update the data".to_string()),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
