//! Token handler

use axum::{
    body::Bytes,
    extract::{OriginalUri, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::handlers::rejected;
use crate::services::auth::TokenGrant;
use crate::services::AuthService;
use crate::AppState;

#[derive(Serialize)]
pub struct TokenResponse {
    pub request_id: Uuid,
    pub status: u16,
    pub message: String,
    #[serde(flatten)]
    pub grant: TokenGrant,
}

/// Signed token request; the signature covers the request path
pub async fn get_token(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4();
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let service = AuthService::new(state.db.clone(), &state.config);
    match service.grant_token(&request, uri.path()).await {
        Ok(grant) => Json(TokenResponse {
            request_id,
            status: 200,
            message: "Get Token Success".to_string(),
            grant,
        })
        .into_response(),
        Err(e) => rejected(request_id, e),
    }
}
