use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::integration::Provider;
use crate::providers::ProviderError;
use crate::vault::DecryptionError;

pub const PROVIDERS_FAILED_MESSAGE: &str = "All connected meeting integrations failed to book \
     the meeting. Check the integration errors or reconnect them in the admin panel.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    NotConnected(String),

    /// Every connected meeting provider failed; keyed by provider name.
    #[error("all connected meeting integrations failed")]
    ProvidersFailed(BTreeMap<String, String>),

    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error("{provider} rejected the request ({status}): {body}")]
    Vendor {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider} unavailable: {message}")]
    Transient { provider: Provider, message: String },

    #[error("credential decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("{0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_connected(provider: Provider) -> Self {
        AppError::NotConnected(format!(
            "{} integration is not connected. Please connect it in the admin panel.",
            provider.display_name()
        ))
    }

    /// Map a vendor client failure onto the HTTP taxonomy.
    pub fn provider(provider: Provider, err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthorized => AppError::NotConnected(format!(
                "{} integration is not connected or its authorization expired. Please re-authorize.",
                provider.display_name()
            )),
            ProviderError::NotConfigured(message) => AppError::Validation {
                field: provider.as_str().to_string(),
                message,
            },
            ProviderError::Vendor { status, body } => AppError::Vendor {
                provider,
                status,
                body,
            },
            ProviderError::Transient(message) | ProviderError::InvalidResponse(message) => {
                AppError::Transient { provider, message }
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Validation { .. } => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "validation_failed",
                self.to_string(),
            ),
            AppError::NotConnected(message) => (
                StatusCode::NOT_FOUND,
                "not_connected_error",
                "integration_not_connected",
                message.clone(),
            ),
            AppError::ProvidersFailed(_) => (
                StatusCode::NOT_FOUND,
                "not_connected_error",
                "integration_not_connected",
                PROVIDERS_FAILED_MESSAGE.to_string(),
            ),
            AppError::Authorization(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "unauthorized",
                self.to_string(),
            ),
            AppError::Vendor { .. } => (
                StatusCode::BAD_GATEWAY,
                "vendor_error",
                "vendor_rejected",
                self.to_string(),
            ),
            AppError::Transient { provider, .. } => {
                tracing::warn!(provider = %provider, "Transient vendor failure: {}", self);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "transient_error",
                    "vendor_unavailable",
                    self.to_string(),
                )
            }
            AppError::Decryption(e) => {
                tracing::error!("Credential decryption failed: {}", e);
                (
                    StatusCode::NOT_FOUND,
                    "not_connected_error",
                    "integration_not_connected",
                    "integration is not connected; please reconnect it".to_string(),
                )
            }
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "not_found",
                message.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let mut error = json!({
            "message": msg,
            "type": error_type,
            "code": code,
        });
        if let AppError::ProvidersFailed(errors) = &self {
            error["integrationErrors"] = json!(errors);
        }
        let body = Json(json!({ "error": error }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_names_field() {
        let resp = AppError::Validation {
            field: "bookingDate".into(),
            message: "use YYYY-MM-DD".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("bookingDate"));
    }

    #[tokio::test]
    async fn test_unauthorized_vendor_maps_to_not_connected() {
        let err = AppError::provider(Provider::GoogleCalendar, ProviderError::Unauthorized);
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["code"], "integration_not_connected");
        assert!(body["error"]["message"].as_str().unwrap().contains("re-authorize"));
    }

    #[tokio::test]
    async fn test_vendor_body_is_propagated() {
        let err = AppError::provider(
            Provider::Twilio,
            ProviderError::Vendor {
                status: 400,
                body: r#"{"code":21211,"message":"Invalid 'To' Phone Number"}"#.into(),
            },
        );
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(resp).await;
        assert!(body["error"]["message"].as_str().unwrap().contains("21211"));
    }

    #[tokio::test]
    async fn test_providers_failed_carries_per_provider_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("zoom".to_string(), "zoom unavailable: token endpoint returned 500".to_string());
        let resp = AppError::ProvidersFailed(errors).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["type"], "not_connected_error");
        assert_eq!(body["error"]["message"], PROVIDERS_FAILED_MESSAGE);
        assert!(body["error"]["integrationErrors"]["zoom"]
            .as_str()
            .unwrap()
            .contains("500"));
    }

    #[tokio::test]
    async fn test_internal_errors_are_redacted() {
        let resp = AppError::Internal(anyhow::anyhow!("pool exhausted at 10.0.0.4")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"]["message"], "internal server error");
    }
}
