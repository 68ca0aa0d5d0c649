//! Callhub: integration credential broker and meeting booking service.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` build the same state against an in-memory store.

pub mod api;
pub mod booking;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod oauth;
pub mod providers;
pub mod registry;
pub mod store;
pub mod vault;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};

use booking::BookingOrchestrator;
use bridge::{IntegrationsClient, ToolBridge};
use oauth::OAuthService;
use providers::gmail::{MailTransport, SmtpMailer};
use providers::{VendorEndpoints, VendorHttp};
use registry::IntegrationRegistry;
use store::IntegrationStore;
use vault::CredentialVault;

/// Shared application state passed to handlers.
pub struct AppState {
    pub config: config::Config,
    pub registry: IntegrationRegistry,
    pub oauth: OAuthService,
    pub http: VendorHttp,
    pub endpoints: VendorEndpoints,
    pub mailer: Arc<dyn MailTransport>,
    pub booking: BookingOrchestrator,
    pub bridge: ToolBridge,
}

impl AppState {
    /// Production wiring: SMTP mail and the default vendor hosts.
    pub fn new(config: config::Config, store: Arc<dyn IntegrationStore>) -> anyhow::Result<Self> {
        let endpoints = VendorEndpoints::default();
        let mailer = Arc::new(SmtpMailer::new(&endpoints, config.vendor_timeout));
        Self::build(config, store, endpoints, mailer)
    }

    /// Wire every component from its collaborators.
    pub fn build(
        config: config::Config,
        store: Arc<dyn IntegrationStore>,
        endpoints: VendorEndpoints,
        mailer: Arc<dyn MailTransport>,
    ) -> anyhow::Result<Self> {
        let vault = Arc::new(CredentialVault::new(&config.master_key)?);
        let registry = IntegrationRegistry::new(store, vault);
        let http = VendorHttp::new(config.vendor_timeout)?;
        let oauth = OAuthService::new(
            registry.clone(),
            http.clone(),
            endpoints.clone(),
            config.redirect_uri(),
        );
        let booking = BookingOrchestrator::new(
            registry.clone(),
            oauth.clone(),
            http.clone(),
            endpoints.clone(),
            mailer.clone(),
            config.default_timezone.clone(),
        );
        let bridge = ToolBridge::new(IntegrationsClient::new(
            config.integrations_api_url.clone(),
            config.vendor_timeout,
        )?);

        Ok(Self {
            config,
            registry,
            oauth,
            http,
            endpoints,
            mailer,
            booking,
            bridge,
        })
    }
}

/// Routes for the whole service, without the outer HTTP layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Tool bridge
        .route("/mcp", post(bridge::server::mcp_http))
        .route("/mcp/ws", get(bridge::server::mcp_ws))
        .nest("/api/v1", api::api_router())
        .with_state(state)
}

async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.registry.store().ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
