use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::confirmation;
use crate::errors::AppError;
use crate::metrics;
use crate::models::booking::{
    BookingRequest, BookingResponse, BookingSlot, CalendlyFragment, CalendlyLinkKind,
    GoogleCalendarFragment, MeetingDetails, ZohoBookingsFragment, ZoomMeetingFragment,
};
use crate::models::credentials::CredentialBlob;
use crate::models::integration::Provider;
use crate::oauth::OAuthService;
use crate::providers::calendly::{select_event_type, CalendlyClient};
use crate::providers::gmail::MailTransport;
use crate::providers::google_calendar::{CalendarEventRequest, GoogleCalendarClient};
use crate::providers::zoho_bookings::{AppointmentRequest, ZohoBookingsClient};
use crate::providers::zoom::{ZoomClient, ZoomMeetingRequest};
use crate::providers::{ProviderError, VendorEndpoints, VendorHttp};
use crate::registry::{IntegrationRegistry, LoadedIntegration};

pub const NO_PROVIDERS_MESSAGE: &str = "No meeting integrations are connected. Please connect at \
     least one integration (Zoom, Google Calendar, Calendly, or Zoho Bookings) in the admin panel.";

/// Outcome of one provider attempt. `Ok(None)` means the provider is not
/// connected and was skipped.
type Attempt<T> = Result<Option<T>, AppError>;

/// Books one meeting across every connected meeting provider.
#[derive(Clone)]
pub struct BookingOrchestrator {
    registry: IntegrationRegistry,
    oauth: OAuthService,
    http: VendorHttp,
    endpoints: VendorEndpoints,
    mailer: Arc<dyn MailTransport>,
    default_timezone: String,
}

impl BookingOrchestrator {
    pub fn new(
        registry: IntegrationRegistry,
        oauth: OAuthService,
        http: VendorHttp,
        endpoints: VendorEndpoints,
        mailer: Arc<dyn MailTransport>,
        default_timezone: String,
    ) -> Self {
        Self {
            registry,
            oauth,
            http,
            endpoints,
            mailer,
            default_timezone,
        }
    }

    /// Validate, fan out to all meeting providers concurrently, aggregate, and
    /// send a best-effort confirmation.
    ///
    /// Fails only on invalid input or when no provider produced anything.
    pub async fn book(
        &self,
        org_id: Uuid,
        request: &BookingRequest,
    ) -> Result<BookingResponse, AppError> {
        let slot = request.validate(&self.default_timezone)?;
        tracing::info!(
            org_id = %org_id,
            date = %slot.date_label(),
            time = %slot.time_label(),
            "Unified meeting booking started"
        );

        let (zoom, google, calendly, zoho) = futures::join!(
            self.zoom(org_id, &slot),
            self.google_calendar(org_id, &slot),
            self.calendly(org_id, &slot),
            self.zoho_bookings(org_id, &slot),
        );

        let mut used = Vec::new();
        let mut errors = BTreeMap::new();
        let zoom_meeting = settle(org_id, Provider::Zoom, zoom, &mut used, &mut errors);
        let google_calendar =
            settle(org_id, Provider::GoogleCalendar, google, &mut used, &mut errors);
        let calendly = settle(org_id, Provider::Calendly, calendly, &mut used, &mut errors);
        let zoho_bookings = settle(org_id, Provider::ZohoBookings, zoho, &mut used, &mut errors);

        if used.is_empty() {
            if errors.is_empty() {
                metrics::record_booking("no_providers");
                return Err(AppError::NotConnected(NO_PROVIDERS_MESSAGE.to_string()));
            }
            metrics::record_booking("all_failed");
            tracing::warn!(org_id = %org_id, failed = errors.len(), "Every connected meeting provider failed");
            return Err(AppError::ProvidersFailed(errors));
        }

        let mut response = BookingResponse {
            success: true,
            message: format!("Meeting booked successfully via {}!", used.join(", ")),
            meeting_details: MeetingDetails::from(&slot),
            integrations_used: used,
            zoom_meeting,
            google_calendar,
            calendly,
            zoho_bookings,
            email_sent: false,
            integration_errors: errors,
        };

        response.email_sent = self.send_confirmation(org_id, &slot, &response).await;
        if response.email_sent {
            response.message.push_str(&format!(
                " Confirmation email sent to {}.",
                slot.customer_email
            ));
        }

        metrics::record_booking(if response.integration_errors.is_empty() {
            "success"
        } else {
            "partial"
        });
        tracing::info!(
            org_id = %org_id,
            providers = %response.integrations_used.join(","),
            email_sent = response.email_sent,
            "Meeting booked"
        );
        Ok(response)
    }

    /// Single-provider Zoho Bookings appointment.
    pub async fn book_zoho_only(
        &self,
        org_id: Uuid,
        request: &BookingRequest,
    ) -> Result<ZohoBookingsFragment, AppError> {
        let slot = request.validate(&self.default_timezone)?;
        let result = self.zoho_bookings(org_id, &slot).await;
        record_attempt(Provider::ZohoBookings, &result);
        result?.ok_or_else(|| AppError::not_connected(Provider::ZohoBookings))
    }

    async fn load(&self, org_id: Uuid, provider: Provider) -> Attempt<LoadedIntegration> {
        let Some(integration) = self.registry.find_connected(org_id, provider).await? else {
            return Ok(None);
        };
        let credentials = self.registry.open(&integration).map_err(|e| match e {
            AppError::Decryption(inner) => {
                tracing::error!(
                    org_id = %org_id,
                    provider = %provider,
                    integration_id = %integration.id,
                    "Stored credentials could not be opened: {}",
                    inner
                );
                AppError::not_connected(provider)
            }
            other => other,
        })?;
        Ok(Some(LoadedIntegration {
            integration,
            credentials,
        }))
    }

    async fn zoom(&self, org_id: Uuid, slot: &BookingSlot) -> Attempt<ZoomMeetingFragment> {
        let Some(loaded) = self.load(org_id, Provider::Zoom).await? else {
            return Ok(None);
        };
        let CredentialBlob::Zoom(credentials) = loaded.credentials else {
            return Err(mismatched(Provider::Zoom));
        };

        let client = ZoomClient::new(credentials, self.http.clone(), self.endpoints.clone());
        let meeting = client
            .create_meeting(&ZoomMeetingRequest {
                topic: slot.summary(),
                start: slot.start,
                duration_minutes: slot.duration_minutes,
                timezone: slot.timezone.clone(),
                agenda: Some(slot.description()),
            })
            .await
            .map_err(|e| AppError::provider(Provider::Zoom, e))?;

        Ok(Some(ZoomMeetingFragment {
            meeting_id: meeting.id,
            join_url: meeting.join_url,
            password: meeting.password,
        }))
    }

    async fn google_calendar(
        &self,
        org_id: Uuid,
        slot: &BookingSlot,
    ) -> Attempt<GoogleCalendarFragment> {
        let Some(mut loaded) = self.load(org_id, Provider::GoogleCalendar).await? else {
            return Ok(None);
        };

        let client = GoogleCalendarClient::new(self.http.clone(), self.endpoints.clone());
        let request = CalendarEventRequest {
            summary: slot.summary(),
            description: slot.description(),
            start: slot.start,
            end: slot.end,
            attendee_email: Some(slot.customer_email.clone()),
            want_video_link: true,
            timezone: slot.timezone.clone(),
        };
        let (client, request) = (&client, &request);
        let event = self
            .oauth
            .with_access_token(&mut loaded, |token| async move {
                client.create_event(&token, request).await
            })
            .await?;

        Ok(Some(GoogleCalendarFragment {
            event_id: event.id,
            event_link: event.html_link,
            google_meet_link: event.video_link,
        }))
    }

    /// Prefer the permanent booking page captured at authorization; otherwise
    /// look up an event type matching the duration.
    async fn calendly(&self, org_id: Uuid, slot: &BookingSlot) -> Attempt<CalendlyFragment> {
        let Some(mut loaded) = self.load(org_id, Provider::Calendly).await? else {
            return Ok(None);
        };
        let CredentialBlob::Calendly(credentials) = &loaded.credentials else {
            return Err(mismatched(Provider::Calendly));
        };

        if let Some(url) = credentials.scheduling_url.clone().filter(|u| !u.is_empty()) {
            return Ok(Some(CalendlyFragment {
                scheduling_link: url,
                name: credentials.user_name.clone(),
                duration_minutes: Some(slot.duration_minutes),
                status: CalendlyLinkKind::PermanentLinkProvided,
            }));
        }

        let known_user = credentials.user_uri.clone();
        let client = CalendlyClient::new(self.http.clone(), self.endpoints.clone());
        let (client, known_user) = (&client, &known_user);
        let duration = slot.duration_minutes;
        let event_type = self
            .oauth
            .with_access_token(&mut loaded, |token| async move {
                let user_uri = match known_user {
                    Some(uri) => uri.clone(),
                    None => client.current_user(&token).await?.uri,
                };
                let types = client.event_types(&token, &user_uri).await?;
                select_event_type(&types, duration).cloned().ok_or_else(|| {
                    ProviderError::NotConfigured("no active Calendly event types found".into())
                })
            })
            .await?;

        let scheduling_link = event_type.scheduling_url.clone().ok_or_else(|| {
            AppError::provider(
                Provider::Calendly,
                ProviderError::InvalidResponse(format!(
                    "event type {} has no scheduling URL",
                    event_type.uri
                )),
            )
        })?;
        Ok(Some(CalendlyFragment {
            scheduling_link,
            name: Some(event_type.name),
            duration_minutes: Some(event_type.duration),
            status: CalendlyLinkKind::EventTypeLinkProvided,
        }))
    }

    async fn zoho_bookings(
        &self,
        org_id: Uuid,
        slot: &BookingSlot,
    ) -> Attempt<ZohoBookingsFragment> {
        let Some(mut loaded) = self.load(org_id, Provider::ZohoBookings).await? else {
            return Ok(None);
        };
        let CredentialBlob::ZohoBookings(credentials) = &loaded.credentials else {
            return Err(mismatched(Provider::ZohoBookings));
        };
        let (service_id, staff_id) = credentials.booking_target().ok_or_else(|| {
            AppError::provider(
                Provider::ZohoBookings,
                ProviderError::NotConfigured(
                    "Zoho Bookings service and staff are not configured. \
                     Set serviceId and staffId before booking."
                        .into(),
                ),
            )
        })?;

        let request = AppointmentRequest {
            service_id: service_id.to_string(),
            staff_id: staff_id.to_string(),
            customer_name: slot.customer_name.clone(),
            customer_email: slot.customer_email.clone(),
            customer_phone: slot.customer_phone.clone(),
            start: slot.start,
            end: slot.end,
            timezone: slot.timezone.clone(),
            notes: slot.notes.clone(),
        };
        let client = ZohoBookingsClient::new(self.http.clone(), &self.endpoints, &credentials.region);
        let (client, request) = (&client, &request);
        let appointment = self
            .oauth
            .with_access_token(&mut loaded, |token| async move {
                client.create_appointment(&token, request).await
            })
            .await?;

        Ok(Some(ZohoBookingsFragment {
            booking_id: appointment.booking_id,
            booking_link: appointment.booking_link,
            status: appointment.status,
        }))
    }

    /// Returns whether the confirmation went out. Never fails the booking.
    async fn send_confirmation(
        &self,
        org_id: Uuid,
        slot: &BookingSlot,
        booking: &BookingResponse,
    ) -> bool {
        let loaded = match self.load(org_id, Provider::Gmail).await {
            Ok(Some(loaded)) => loaded,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(org_id = %org_id, "Confirmation email skipped: {}", e);
                return false;
            }
        };
        let CredentialBlob::Gmail(account) = &loaded.credentials else {
            return false;
        };

        let email = confirmation::compose(slot, booking);
        match self.mailer.send(account, &email).await {
            Ok(()) => {
                metrics::record_vendor_call(Provider::Gmail, "ok");
                true
            }
            Err(e) => {
                metrics::record_vendor_call(Provider::Gmail, e.kind());
                tracing::warn!(org_id = %org_id, "Failed to send confirmation email: {}", e);
                false
            }
        }
    }
}

fn mismatched(provider: Provider) -> AppError {
    AppError::Internal(anyhow::anyhow!(
        "{} integration holds credentials for another provider",
        provider
    ))
}

/// Metrics label for an attempt.
fn outcome(err: &AppError) -> &'static str {
    match err {
        AppError::NotConnected(_) => "unauthorized",
        AppError::Validation { .. } => "not_configured",
        AppError::Vendor { .. } => "vendor_error",
        AppError::Transient { .. } => "transient",
        _ => "error",
    }
}

fn record_attempt<T>(provider: Provider, attempt: &Attempt<T>) {
    match attempt {
        Ok(Some(_)) => metrics::record_vendor_call(provider, "ok"),
        Ok(None) => {}
        Err(e) => metrics::record_vendor_call(provider, outcome(e)),
    }
}

/// Fold one provider's attempt into the aggregate.
fn settle<T>(
    org_id: Uuid,
    provider: Provider,
    attempt: Attempt<T>,
    used: &mut Vec<String>,
    errors: &mut BTreeMap<String, String>,
) -> Option<T> {
    record_attempt(provider, &attempt);
    match attempt {
        Ok(Some(fragment)) => {
            used.push(provider.label().to_string());
            Some(fragment)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(org_id = %org_id, provider = %provider, "Booking via provider failed: {}", e);
            errors.insert(provider.as_str().to_string(), e.to_string());
            None
        }
    }
}
