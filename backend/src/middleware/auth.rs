//! Authentication middleware
//!
//! Resolves the bearer token to the calling partner and company and stamps
//! every request with a request id used in response envelopes and logs.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::config::OperationSettings;
use crate::error::{AppError, ErrorDetail, ErrorResponse};
use crate::services::AuthService;
use crate::AppState;

/// Caller identity resolved from the JWT
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub partner_id: i64,
    pub company_id: Option<i64>,
    pub request_id: Uuid,
}

impl AuthContext {
    /// Company of the token, required by update endpoints
    pub fn require_company(&self) -> Result<i64, AppError> {
        self.company_id.ok_or_else(|| {
            AppError::Forbidden("Required Company Registry for JWT Token".to_string())
        })
    }

    /// Gate for PUT on tickets and quality controls
    pub fn ensure_can_update(&self, settings: &OperationSettings) -> Result<(), AppError> {
        self.require_company()?;
        if settings.allow_update_scale_ticket {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You don't have access to update the data".to_string(),
            ))
        }
    }
}

/// Validate the bearer token and attach an [`AuthContext`] to the request
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let service = AuthService::new(state.db.clone(), &state.config);
    let claims = match service.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let partner_id = match claims.sub.parse::<i64>() {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid partner ID in token"),
    };

    let context = AuthContext {
        partner_id,
        company_id: claims.company_id,
        request_id: Uuid::new_v4(),
    };
    tracing::debug!(
        request_id = %context.request_id,
        partner_id,
        company_id = ?context.company_id,
        "authenticated request"
    );

    request.extensions_mut().insert(context);

    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message, "Tidak memiliki otorisasi"),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for the authenticated caller
#[derive(Clone, Debug)]
pub struct CurrentContext(pub AuthContext);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentContext)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail::new(
                        "UNAUTHORIZED",
                        "Authentication required",
                        "Harus masuk terlebih dahulu",
                    ),
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}
