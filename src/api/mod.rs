use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod auth;
pub mod handlers;

/// Build the integrations API router.
/// Routes are relative; `app()` mounts this under `/api/v1`.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/integrations/list", get(handlers::list_integrations))
        .route("/integrations/health", get(handlers::integrations_health))
        // Actions
        .route("/integrations/send-sms", post(handlers::send_sms))
        .route("/integrations/send-email", post(handlers::send_email))
        .route(
            "/integrations/create-video-meeting",
            post(handlers::create_video_meeting),
        )
        .route("/integrations/book-meeting", post(handlers::book_meeting))
        // Provider-scoped
        .route(
            "/integrations/:provider/connect",
            post(handlers::connect_integration),
        )
        .route(
            "/integrations/:provider/oauth/complete",
            post(handlers::complete_oauth),
        )
        .route(
            "/integrations/:provider/config",
            post(handlers::configure_zoho_bookings).put(handlers::configure_zoho_bookings),
        )
        .route(
            "/integrations/:provider/create-booking",
            post(handlers::create_zoho_booking),
        )
        .route(
            "/integrations/:provider/event-types",
            get(handlers::calendly_event_types),
        )
        .route(
            "/integrations/:provider/import-leads",
            post(handlers::import_zoho_leads),
        )
        // By id. Shares the segment with the provider routes above.
        .route(
            "/integrations/:provider",
            get(handlers::get_integration)
                .put(handlers::update_integration)
                .delete(handlers::delete_integration),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
