use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::auth::AuthContext;
use crate::errors::AppError;
use crate::metrics;
use crate::models::booking::BookingRequest;
use crate::models::credentials::{ConnectParams, CredentialBlob};
use crate::models::integration::{
    IntegrationDetail, IntegrationPatch, IntegrationSummary, IntegrationType, Provider,
};
use crate::providers::calendly::{CalendlyClient, EventType};
use crate::providers::gmail::OutgoingEmail;
use crate::providers::twilio::{is_e164, TwilioClient};
use crate::providers::zoho_crm::{LeadRecord, ZohoCrmClient};
use crate::providers::zoom::{parse_start_time, ZoomClient, ZoomMeetingRequest};
use crate::AppState;

/// Credential writes that lose a version race are retried this many times.
const CONFIG_WRITE_ATTEMPTS: usize = 3;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(rename = "type")]
    pub integration_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailRequest {
    #[serde(default, alias = "to")]
    pub to_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub html_body: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoMeetingRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default = "default_meeting_duration", alias = "duration")]
    pub duration_minutes: u32,
    pub timezone: Option<String>,
    pub agenda: Option<String>,
}

fn default_meeting_duration() -> u32 {
    60
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoMeetingResponse {
    pub success: bool,
    pub meeting_id: String,
    pub join_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct CompleteOAuthRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZohoBookingsConfigRequest {
    pub service_id: Option<String>,
    pub staff_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLeadsRequest {
    /// Comma-separated Zoho lead ids.
    #[serde(default)]
    pub lead_ids: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadImportResult {
    pub lead_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead: Option<LeadRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────

fn invalid(field: &str, message: impl Into<String>) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse::<Provider>().map_err(|e| invalid("provider", e))
}

/// Provider-scoped routes that only make sense for one vendor.
fn expect_provider(raw: &str, expected: Provider) -> Result<(), AppError> {
    let provider = parse_provider(raw)?;
    if provider != expected {
        return Err(invalid(
            "provider",
            format!("operation is only available for {}", expected.as_str()),
        ));
    }
    Ok(())
}

/// `/integrations/:provider` doubles as the by-id route.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| invalid("id", format!("'{}' is not a valid integration id", raw)))
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(field, format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

// ── Registry ─────────────────────────────────────────────────

/// GET /api/v1/integrations/list
pub async fn list_integrations(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<IntegrationSummary>>, AppError> {
    let integration_type = params
        .integration_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<IntegrationType>().map_err(|e| invalid("type", e)))
        .transpose()?;

    let rows = state
        .registry
        .list(auth.organization_id, integration_type)
        .await?;
    Ok(Json(rows.iter().map(IntegrationSummary::from).collect()))
}

/// GET /api/v1/integrations/health
pub async fn integrations_health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "integrations" }))
}

/// GET /api/v1/integrations/:id
pub async fn get_integration(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_id): Path<String>,
) -> Result<Json<IntegrationDetail>, AppError> {
    let id = parse_id(&raw_id)?;
    let integration = state.registry.get(auth.organization_id, id).await?;
    Ok(Json(IntegrationDetail::from(&integration)))
}

/// PUT /api/v1/integrations/:id
pub async fn update_integration(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_id): Path<String>,
    Json(patch): Json<IntegrationPatch>,
) -> Result<Json<IntegrationDetail>, AppError> {
    let id = parse_id(&raw_id)?;
    let integration = state
        .registry
        .update(auth.organization_id, id, &patch)
        .await?;
    Ok(Json(IntegrationDetail::from(&integration)))
}

/// DELETE /api/v1/integrations/:id
pub async fn delete_integration(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&raw_id)?;
    let removed = state.registry.delete(auth.organization_id, id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "{} {} integration deleted successfully",
            removed.provider.label(),
            removed.integration_type
        ),
        "integrationId": removed.id,
    })))
}

// ── OAuth ────────────────────────────────────────────────────

/// POST /api/v1/integrations/:provider/connect
pub async fn connect_integration(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
    Json(params): Json<ConnectParams>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let provider = parse_provider(&raw_provider)?;
    let outcome = state
        .oauth
        .connect(auth.organization_id, auth.user_id.clone(), provider, params)
        .await?;

    let body = match (outcome.authorization_url, outcome.state) {
        (Some(url), Some(oauth_state)) => json!({
            "authorizationUrl": url,
            "state": oauth_state,
            "integrationId": outcome.integration.id,
        }),
        _ => json!({
            "integrationId": outcome.integration.id,
            "isConnected": outcome.integration.is_connected,
        }),
    };
    Ok((StatusCode::OK, Json(body)))
}

/// POST /api/v1/integrations/:provider/oauth/complete
pub async fn complete_oauth(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
    Json(payload): Json<CompleteOAuthRequest>,
) -> Result<Json<Value>, AppError> {
    let provider = parse_provider(&raw_provider)?;
    let state_param = required(&payload.state, "state")?;
    let completed = state
        .oauth
        .complete(auth.organization_id, provider, &payload.code, &state_param)
        .await?;
    Ok(Json(json!({
        "expiresAt": completed.expires_at,
        "integrationId": completed.integration_id,
    })))
}

// ── Messaging ────────────────────────────────────────────────

/// POST /api/v1/integrations/send-sms
pub async fn send_sms(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(payload): Json<SendSmsRequest>,
) -> Result<Json<Value>, AppError> {
    let to = required(&payload.phone_number, "phoneNumber")?;
    if !is_e164(&to) {
        return Err(invalid(
            "phoneNumber",
            format!("'{}' is not in E.164 format (e.g. +15551234567)", to),
        ));
    }
    let message = required(&payload.message, "message")?;

    let loaded = state
        .registry
        .load_connected(auth.organization_id, Provider::Twilio)
        .await?;
    let CredentialBlob::Twilio(credentials) = loaded.credentials else {
        return Err(AppError::not_connected(Provider::Twilio));
    };

    let client = TwilioClient::new(credentials, state.http.clone(), state.endpoints.clone());
    let result = client.send_sms(&to, &message).await;
    metrics::record_vendor_call(
        Provider::Twilio,
        result.as_ref().map(|_| "ok").unwrap_or_else(|e| e.kind()),
    );
    let sid = result.map_err(|e| AppError::provider(Provider::Twilio, e))?;

    tracing::info!(org_id = %auth.organization_id, sid = %sid, "SMS sent");
    Ok(Json(json!({ "success": true, "sid": sid })))
}

/// POST /api/v1/integrations/send-email
pub async fn send_email(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(payload): Json<SendEmailRequest>,
) -> Result<Json<Value>, AppError> {
    let to = required(&payload.to_email, "toEmail")?;
    if to.parse::<lettre::Address>().is_err() {
        return Err(invalid("toEmail", format!("'{}' is not a valid email address", to)));
    }
    let email = OutgoingEmail {
        to,
        subject: required(&payload.subject, "subject")?,
        body: required(&payload.body, "body")?,
        html_body: payload.html_body.filter(|h| !h.trim().is_empty()),
    };

    let loaded = state
        .registry
        .load_connected(auth.organization_id, Provider::Gmail)
        .await?;
    let CredentialBlob::Gmail(account) = &loaded.credentials else {
        return Err(AppError::not_connected(Provider::Gmail));
    };

    let result = state.mailer.send(account, &email).await;
    metrics::record_vendor_call(
        Provider::Gmail,
        result.as_ref().map(|_| "ok").unwrap_or_else(|e| e.kind()),
    );
    result.map_err(|e| AppError::provider(Provider::Gmail, e))?;

    Ok(Json(json!({ "success": true, "recipient": email.to })))
}

// ── Meetings ─────────────────────────────────────────────────

/// POST /api/v1/integrations/create-video-meeting
pub async fn create_video_meeting(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(payload): Json<CreateVideoMeetingRequest>,
) -> Result<Json<CreateVideoMeetingResponse>, AppError> {
    let topic = required(&payload.topic, "topic")?;
    let raw_start = required(&payload.start_time, "startTime")?;
    let (start, forced_tz) = parse_start_time(&raw_start).ok_or_else(|| {
        invalid(
            "startTime",
            format!("invalid start time '{}': use ISO 8601", raw_start),
        )
    })?;
    if payload.duration_minutes == 0 {
        return Err(invalid("durationMinutes", "duration must be at least 1 minute"));
    }
    let timezone = forced_tz.map(String::from).unwrap_or_else(|| {
        payload
            .timezone
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "UTC".to_string())
    });

    let loaded = state
        .registry
        .load_connected(auth.organization_id, Provider::Zoom)
        .await?;
    let CredentialBlob::Zoom(credentials) = loaded.credentials else {
        return Err(AppError::not_connected(Provider::Zoom));
    };

    let client = ZoomClient::new(credentials, state.http.clone(), state.endpoints.clone());
    let result = client
        .create_meeting(&ZoomMeetingRequest {
            topic,
            start,
            duration_minutes: payload.duration_minutes,
            timezone,
            agenda: payload.agenda.filter(|a| !a.trim().is_empty()),
        })
        .await;
    metrics::record_vendor_call(
        Provider::Zoom,
        result.as_ref().map(|_| "ok").unwrap_or_else(|e| e.kind()),
    );
    let meeting = result.map_err(|e| AppError::provider(Provider::Zoom, e))?;

    Ok(Json(CreateVideoMeetingResponse {
        success: true,
        meeting_id: meeting.id,
        join_url: meeting.join_url,
        password: meeting.password,
    }))
}

/// POST /api/v1/integrations/book-meeting
pub async fn book_meeting(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(request): Json<BookingRequest>,
) -> Result<Json<crate::models::booking::BookingResponse>, AppError> {
    let response = state.booking.book(auth.organization_id, &request).await?;
    Ok(Json(response))
}

/// POST /api/v1/integrations/zoho_bookings/create-booking
pub async fn create_zoho_booking(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
    Json(request): Json<BookingRequest>,
) -> Result<Json<Value>, AppError> {
    expect_provider(&raw_provider, Provider::ZohoBookings)?;
    let booking = state
        .booking
        .book_zoho_only(auth.organization_id, &request)
        .await?;
    Ok(Json(json!({
        "success": true,
        "bookingId": booking.booking_id,
        "bookingLink": booking.booking_link,
        "status": booking.status,
    })))
}

/// PUT /api/v1/integrations/zoho_bookings/config
///
/// Stores the service and staff a booking is made against.
pub async fn configure_zoho_bookings(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
    Json(payload): Json<ZohoBookingsConfigRequest>,
) -> Result<Json<Value>, AppError> {
    expect_provider(&raw_provider, Provider::ZohoBookings)?;
    let service_id = required(payload.service_id.as_deref().unwrap_or_default(), "serviceId")?;
    let staff_id = required(payload.staff_id.as_deref().unwrap_or_default(), "staffId")?;

    for _ in 0..CONFIG_WRITE_ATTEMPTS {
        let integration = state
            .registry
            .find(auth.organization_id, Provider::ZohoBookings)
            .await?
            .ok_or_else(|| AppError::not_connected(Provider::ZohoBookings))?;
        let mut blob = state.registry.open(&integration)?;
        let CredentialBlob::ZohoBookings(credentials) = &mut blob else {
            return Err(AppError::not_connected(Provider::ZohoBookings));
        };
        credentials.service_id = Some(service_id.clone());
        credentials.staff_id = Some(staff_id.clone());

        let saved = state
            .registry
            .save_credentials(integration.id, &blob, Some(integration.config_version), None)
            .await?;
        if saved.is_some() {
            tracing::info!(
                org_id = %auth.organization_id,
                integration_id = %integration.id,
                "Zoho Bookings target configured"
            );
            return Ok(Json(json!({
                "success": true,
                "integrationId": integration.id,
                "serviceId": service_id,
                "staffId": staff_id,
            })));
        }
    }

    Err(AppError::Internal(anyhow::anyhow!(
        "Zoho Bookings configuration kept changing concurrently"
    )))
}

/// GET /api/v1/integrations/calendly/event-types
pub async fn calendly_event_types(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
) -> Result<Json<Vec<EventType>>, AppError> {
    expect_provider(&raw_provider, Provider::Calendly)?;
    let mut loaded = state
        .registry
        .load_connected(auth.organization_id, Provider::Calendly)
        .await?;
    let known_user = match &loaded.credentials {
        CredentialBlob::Calendly(c) => c.user_uri.clone(),
        _ => return Err(AppError::not_connected(Provider::Calendly)),
    };

    let client = CalendlyClient::new(state.http.clone(), state.endpoints.clone());
    let (client, known_user) = (&client, &known_user);
    let types = state
        .oauth
        .with_access_token(&mut loaded, |token| async move {
            let user_uri = match known_user {
                Some(uri) => uri.clone(),
                None => client.current_user(&token).await?.uri,
            };
            client.event_types(&token, &user_uri).await
        })
        .await?;

    Ok(Json(types.into_iter().filter(|t| t.active).collect()))
}

// ── CRM ──────────────────────────────────────────────────────

/// POST /api/v1/integrations/zoho/import-leads
///
/// Each lead is fetched independently; one bad id does not fail the batch.
pub async fn import_zoho_leads(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(raw_provider): Path<String>,
    Json(payload): Json<ImportLeadsRequest>,
) -> Result<Json<Value>, AppError> {
    expect_provider(&raw_provider, Provider::Zoho)?;
    let lead_ids: Vec<String> = payload
        .lead_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    if lead_ids.is_empty() {
        return Err(invalid("leadIds", "leadIds is required"));
    }

    let mut loaded = state
        .registry
        .load_connected(auth.organization_id, Provider::Zoho)
        .await?;
    let base_url = match &loaded.credentials {
        CredentialBlob::Zoho(c) => state.endpoints.zoho_api(&c.region, c.api_domain.as_deref()),
        _ => return Err(AppError::not_connected(Provider::Zoho)),
    };
    let client = ZohoCrmClient::new(state.http.clone(), base_url);

    let mut results = Vec::with_capacity(lead_ids.len());
    for lead_id in &lead_ids {
        let (client, id) = (&client, lead_id.as_str());
        let fetched = state
            .oauth
            .with_access_token(&mut loaded, |token| async move {
                client.get_lead(&token, id).await
            })
            .await;

        let result = match fetched {
            Ok(lead) if lead.phone.is_none() => LeadImportResult {
                lead_id: lead_id.clone(),
                success: false,
                lead: Some(lead),
                error: Some("Lead has no phone number".into()),
            },
            Ok(lead) => LeadImportResult {
                lead_id: lead_id.clone(),
                success: true,
                lead: Some(lead),
                error: None,
            },
            Err(e) => {
                tracing::warn!(lead_id = %lead_id, "Zoho lead import failed: {}", e);
                LeadImportResult {
                    lead_id: lead_id.clone(),
                    success: false,
                    lead: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let successful = results.iter().filter(|r| r.success).count();
    Ok(Json(json!({
        "success": successful > 0,
        "total": results.len(),
        "successful": successful,
        "failed": results.len() - successful,
        "results": results,
    })))
}
