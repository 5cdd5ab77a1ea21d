//! Token issuance and validation
//!
//! Mobile clients obtain a token by signing their request with the API
//! licence they were given. The token carries the partner and the company
//! every later request runs under.

use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Parameters a token request must carry
const REQUIRED_PARAMS: &[&str] = &["timestamp", "sign", "email", "api_license"];

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    issuer: String,
    token_expiry: i64,
    leeway: u64,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Partner ID
    pub sub: String,
    pub email: String,
    pub company_id: Option<i64>,
    pub company_registry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub iss: String,
    pub exp: i64,
    pub iat: i64,
}

/// Body of a successful token request
#[derive(Debug, Serialize)]
pub struct TokenGrant {
    pub email: String,
    pub company_registry: Option<String>,
    pub access_token: String,
    /// Unix time the token expires at
    pub expires_in: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PartnerLogin {
    id: i64,
    company_id: Option<i64>,
    company_registry: Option<String>,
}

impl AuthService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            issuer: config.jwt.issuer.clone(),
            token_expiry: config.jwt.token_expiry,
            leeway: config.jwt.leeway_seconds,
        }
    }

    /// Verify a signed token request and issue a token for its partner.
    ///
    /// `path` is the request path the client included in its signature.
    pub async fn grant_token(&self, request: &Value, path: &str) -> AppResult<TokenGrant> {
        let params = match request.as_object() {
            Some(params) if !params.is_empty() => params,
            _ => return Err(AppError::ValidationError("Request data is empty".to_string())),
        };

        let email = params.get("email").and_then(Value::as_str).unwrap_or_default();
        let partner = sqlx::query_as::<_, PartnerLogin>(
            r#"
            SELECT p.id, p.company_id, c.company_registry
            FROM partners p
            LEFT JOIN companies c ON c.id = p.company_id
            WHERE p.email = $1 AND p.active
            ORDER BY p.id
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;

        let Some(partner) = partner else {
            tracing::warn!(email, "token requested for unknown email");
            return Err(AppError::ValidationError("Email not found".to_string()));
        };

        let missing = missing_params(request);
        if !missing.is_empty() {
            return Err(AppError::ValidationError(format!(
                "Missing parameters: {}",
                missing.join(", ")
            )));
        }

        let api_license = param_text(request, "api_license");
        let timestamp = param_text(request, "timestamp");
        let sign = param_text(request, "sign");

        // A registry in the request switches the token to that company
        let requested_registry = params
            .get("company_registry")
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()));
        let expected = signature(
            email,
            path,
            &timestamp,
            &api_license,
            requested_registry.as_deref(),
        );
        if !constant_time_eq(sign.as_bytes(), expected.as_bytes()) {
            tracing::warn!(email, timestamp = %timestamp, "invalid token request signature");
            return Err(AppError::ValidationError("Invalid signature".to_string()));
        }

        let licensed = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM api_licenses WHERE secret_key = $1 AND active",
        )
        .bind(&api_license)
        .fetch_one(&self.db)
        .await?;
        if licensed == 0 {
            return Err(AppError::ValidationError("Invalid signature".to_string()));
        }

        let (company_id, company_registry) = match requested_registry {
            Some(registry) => {
                let company = sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM companies WHERE company_registry = $1",
                )
                .bind(&registry)
                .fetch_optional(&self.db)
                .await?;
                (company, Some(registry))
            }
            None => (partner.company_id, partner.company_registry),
        };

        let aud = params.get("aud").and_then(Value::as_str).map(str::to_string);
        let (access_token, expires_in) =
            self.issue_token(partner.id, email, company_id, company_registry.clone(), aud)?;

        tracing::info!(partner_id = partner.id, company_id = ?company_id, "token issued");

        Ok(TokenGrant {
            email: email.to_string(),
            company_registry,
            access_token,
            expires_in,
        })
    }

    /// Sign a token for a partner; returns the token and its expiry time
    pub fn issue_token(
        &self,
        partner_id: i64,
        email: &str,
        company_id: Option<i64>,
        company_registry: Option<String>,
        aud: Option<String>,
    ) -> AppResult<(String, i64)> {
        let now = Utc::now();
        let exp = (now + Duration::seconds(self.token_expiry)).timestamp();

        let claims = Claims {
            sub: partner_id.to_string(),
            email: email.to_string(),
            company_id,
            company_registry,
            aud,
            iss: self.issuer.clone(),
            exp,
            iat: now.timestamp(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        Ok((token, exp))
    }

    /// Validate an access token and return its claims
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.leeway = self.leeway;
        validation.validate_aud = false;
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::Unauthorized {
                message: format!("Invalid token: {}", e),
                message_id: "Token tidak valid".to_string(),
            },
        })?;

        Ok(token_data.claims)
    }
}

/// Required parameters absent from the request, in declaration order
pub fn missing_params(request: &Value) -> Vec<&'static str> {
    REQUIRED_PARAMS
        .iter()
        .copied()
        .filter(|p| request.get(p).is_none())
        .collect()
}

/// Hex HMAC-SHA256 keyed by the API licence over
/// `email + path + timestamp + api_license [+ company_registry]`
pub fn signature(
    email: &str,
    path: &str,
    timestamp: &str,
    api_license: &str,
    company_registry: Option<&str>,
) -> String {
    let mut base = format!("{}{}{}{}", email, path, timestamp, api_license);
    if let Some(registry) = company_registry {
        base.push_str(registry);
    }

    let mut mac = match HmacSha256::new_from_slice(api_license.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(base.as_bytes());
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Strings and numbers both sign as their text
fn param_text(request: &Value, key: &str) -> String {
    match request.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signature_is_lowercase_hex_sha256() {
        let sign = signature("kud@estate.id", "/auth/token/get", "1719800000", "LIC-1", None);
        assert_eq!(sign.len(), 64);
        assert!(sign.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn registry_changes_the_signature() {
        let plain = signature("a@b.c", "/auth/token/get", "1", "K", None);
        let scoped = signature("a@b.c", "/auth/token/get", "1", "K", Some("EST-01"));
        assert_ne!(plain, scoped);
        assert_eq!(plain, signature("a@b.c", "/auth/token/get", "1", "K", None));
    }

    #[test]
    fn missing_params_are_listed_in_order() {
        let request = json!({"email": "a@b.c", "sign": "x"});
        assert_eq!(missing_params(&request), vec!["timestamp", "api_license"]);
        let request = json!({"email": "a@b.c", "sign": "x", "timestamp": 1, "api_license": "k"});
        assert!(missing_params(&request).is_empty());
    }

    #[test]
    fn numeric_timestamp_signs_as_text() {
        let request = json!({"timestamp": 1719800000});
        assert_eq!(param_text(&request, "timestamp"), "1719800000");
        assert_eq!(param_text(&request, "absent"), "");
    }

    #[test]
    fn comparison_rejects_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
