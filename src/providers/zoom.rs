use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use super::http::json;
use super::{ProviderError, VendorEndpoints, VendorHttp};
use crate::models::credentials::ZoomCredentials;
use crate::oauth::endpoints::MAX_EXPIRES_IN_SECS;

/// Refresh the cached token this long before Zoom says it expires.
const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct ZoomMeetingRequest {
    pub topic: String,
    /// Local wall-clock start, interpreted in `timezone`.
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub timezone: String,
    pub agenda: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoomMeeting {
    pub id: String,
    pub join_url: String,
    pub password: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Deserialize)]
struct MeetingResponse {
    id: serde_json::Value,
    join_url: String,
    #[serde(default)]
    password: Option<String>,
}

struct CachedToken {
    value: String,
    refresh_after: DateTime<Utc>,
}

/// Server-to-server OAuth client for one Zoom account.
///
/// The account-credentials grant has no refresh token; access tokens are
/// cached in this instance only and re-minted shortly before expiry.
pub struct ZoomClient {
    credentials: ZoomCredentials,
    http: VendorHttp,
    endpoints: VendorEndpoints,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomClient {
    pub fn new(credentials: ZoomCredentials, http: VendorHttp, endpoints: VendorEndpoints) -> Self {
        Self {
            credentials,
            http,
            endpoints,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Utc::now() < token.refresh_after {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/oauth/token", self.endpoints.zoom_oauth);
        let request = self
            .http
            .client()
            .post(url)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.credentials.account_id.as_str()),
            ])
            .basic_auth(
                &self.credentials.client_id,
                Some(self.credentials.client_secret.expose()),
            );
        let grant: TokenResponse = json(self.http.send(request).await?).await?;

        let lifetime = (grant.expires_in.min(MAX_EXPIRES_IN_SECS) - EXPIRY_MARGIN_SECS).max(0);
        *cached = Some(CachedToken {
            value: grant.access_token.clone(),
            refresh_after: Utc::now() + Duration::seconds(lifetime),
        });
        tracing::debug!(account_id = %self.credentials.account_id, "Minted Zoom access token");
        Ok(grant.access_token)
    }

    async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    /// Create a scheduled meeting. A 401 drops the cached token and retries once.
    pub async fn create_meeting(
        &self,
        request: &ZoomMeetingRequest,
    ) -> Result<ZoomMeeting, ProviderError> {
        match self.try_create(request).await {
            Err(ProviderError::Unauthorized) => {
                tracing::info!("Zoom token rejected, minting a new one");
                self.invalidate().await;
                self.try_create(request).await
            }
            other => other,
        }
    }

    async fn try_create(&self, request: &ZoomMeetingRequest) -> Result<ZoomMeeting, ProviderError> {
        let token = self.access_token().await?;
        let body = json!({
            "topic": request.topic,
            "type": 2,
            "start_time": request.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "duration": request.duration_minutes,
            "timezone": request.timezone,
            "agenda": request
                .agenda
                .clone()
                .unwrap_or_else(|| format!("Scheduled meeting: {}", request.topic)),
            "settings": {
                "host_video": true,
                "participant_video": true,
                "join_before_host": false,
                "mute_upon_entry": true,
                "waiting_room": true,
                "audio": "both",
                "auto_recording": "none"
            }
        });

        let resp = self
            .http
            .send(
                self.http
                    .client()
                    .post(format!("{}/users/me/meetings", self.endpoints.zoom_api))
                    .bearer_auth(token)
                    .json(&body),
            )
            .await?;
        let meeting: MeetingResponse = json(resp).await?;

        let id = match meeting.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(ZoomMeeting {
            id,
            join_url: meeting.join_url,
            password: meeting.password.filter(|p| !p.is_empty()),
        })
    }
}

/// Parse an ISO 8601 start time. Offsets are normalised to UTC; naive values
/// are taken as wall-clock time in the meeting's timezone.
pub fn parse_start_time(raw: &str) -> Option<(NaiveDateTime, Option<&'static str>)> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some((with_offset.with_timezone(&Utc).naive_utc(), Some("UTC")));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| (naive, None))
}
