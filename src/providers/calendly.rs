use serde::{Deserialize, Serialize};

use super::http::json;
use super::{ProviderError, VendorEndpoints, VendorHttp};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalendlyUser {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub scheduling_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub uri: String,
    pub name: String,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub scheduling_url: Option<String>,
}

fn default_duration() -> u32 {
    30
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize)]
struct UserEnvelope {
    resource: CalendlyUser,
}

#[derive(Deserialize)]
struct RawEventType {
    uri: String,
    name: String,
    #[serde(default = "default_duration")]
    duration: u32,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    scheduling_url: Option<String>,
}

#[derive(Deserialize)]
struct EventTypeCollection {
    #[serde(default)]
    collection: Vec<RawEventType>,
}

/// Calendly v2 read API. Every call is a GET and goes through the retrying client.
pub struct CalendlyClient {
    http: VendorHttp,
    endpoints: VendorEndpoints,
}

impl CalendlyClient {
    pub fn new(http: VendorHttp, endpoints: VendorEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub async fn current_user(&self, access_token: &str) -> Result<CalendlyUser, ProviderError> {
        let resp = self
            .http
            .send_read(
                self.http
                    .reads()
                    .get(format!("{}/users/me", self.endpoints.calendly_api))
                    .bearer_auth(access_token),
            )
            .await?;
        let envelope: UserEnvelope = json(resp).await?;
        Ok(envelope.resource)
    }

    pub async fn event_types(
        &self,
        access_token: &str,
        user_uri: &str,
    ) -> Result<Vec<EventType>, ProviderError> {
        let resp = self
            .http
            .send_read(
                self.http
                    .reads()
                    .get(format!("{}/event_types", self.endpoints.calendly_api))
                    .query(&[("user", user_uri)])
                    .bearer_auth(access_token),
            )
            .await?;
        let page: EventTypeCollection = json(resp).await?;
        Ok(page
            .collection
            .into_iter()
            .map(|raw| EventType {
                uri: raw.uri,
                name: raw.name,
                duration: raw.duration,
                active: raw.active,
                scheduling_url: raw.scheduling_url,
            })
            .collect())
    }
}

/// Pick the active event type whose duration matches, else the first active one.
///
/// The fallback is a placeholder policy: it keeps booking useful when an
/// account has no exact-length event type.
pub fn select_event_type(types: &[EventType], duration_minutes: u32) -> Option<&EventType> {
    let mut active = types.iter().filter(|t| t.active);
    let first = active.clone().next();
    active
        .find(|t| t.duration == duration_minutes)
        .or(first)
}
