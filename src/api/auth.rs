use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::AppState;

/// Claims carried by a user access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub organization_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
    #[serde(rename = "type")]
    pub token_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// User JWT.
    User,
    /// Trusted `X-Organization-ID` header from an internal service.
    Service,
}

impl AuthKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthKind::User => "user",
            AuthKind::Service => "service",
        }
    }
}

/// Resolved caller identity. Every handler that touches integrations takes one.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub organization_id: Uuid,
    pub user_id: Option<String>,
    pub kind: AuthKind,
}

pub fn decode_access_token(config: &Config, token: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::new(config.jwt_algorithm))
        .map_err(|e| AppError::Authorization(format!("invalid token: {}", e)))?;
    if data.claims.token_type != "access" {
        return Err(AppError::Authorization("not an access token".into()));
    }
    Ok(data.claims)
}

fn parse_org(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Authorization("organization id is not a valid UUID".into()))
}

impl AuthContext {
    pub fn from_parts(config: &Config, parts: &Parts) -> Result<Self, AppError> {
        let bearer = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = bearer {
            let claims = decode_access_token(config, token)?;
            return Ok(Self {
                organization_id: parse_org(&claims.organization_id)?,
                user_id: Some(claims.sub),
                kind: AuthKind::User,
            });
        }

        let org = parts
            .headers
            .get("x-organization-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Authorization(
                    "missing Authorization bearer token or X-Organization-ID header".into(),
                )
            })?;
        Ok(Self {
            organization_id: parse_org(org)?,
            user_id: None,
            kind: AuthKind::Service,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = AuthContext::from_parts(&state.config, parts).map_err(|e| {
            tracing::warn!(path = %parts.uri.path(), "Rejected request: {}", e);
            e
        })?;
        tracing::debug!(
            path = %parts.uri.path(),
            org_id = %ctx.organization_id,
            caller = ctx.kind.as_str(),
            "Request authenticated"
        );
        Ok(ctx)
    }
}
