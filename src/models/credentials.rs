//! Typed credential blobs.
//!
//! Every integration's `config` column holds exactly one [`CredentialBlob`]
//! sealed by the vault. The enum is tagged by provider so the fields a
//! capability call needs are known statically per variant.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::integration::Provider;

/// A secret string that never prints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Transient CSRF material held between `connect` and `oauth/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub oauth_state: String,
    pub oauth_initiated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_user_id: Option<String>,
}

/// Client registration plus the token pair for an authorization-code provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub client_id: String,
    pub client_secret: Secret,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuthorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_completed_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    pub fn new(client_id: String, client_secret: Secret, pending: PendingAuthorization) -> Self {
        Self {
            client_id,
            client_secret,
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            pending: Some(pending),
            oauth_completed_at: None,
        }
    }

    /// True when the access token is missing or expires within `margin`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match (&self.access_token, self.token_expires_at) {
            (None, _) => true,
            (Some(_), Some(expires_at)) => expires_at - margin <= now,
            (Some(_), None) => false,
        }
    }

    /// Merge a token grant. A missing refresh token keeps the previous one.
    pub fn apply_grant(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) {
        self.access_token = Some(Secret::new(access_token));
        if let Some(refresh) = refresh_token.filter(|r| !r.is_empty()) {
            self.refresh_token = Some(Secret::new(refresh));
        }
        self.token_expires_at = Some(expires_at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: Secret,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleCalendarCredentials {
    pub oauth: OAuthTokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendlyCredentials {
    pub oauth: OAuthTokens,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Permanent booking page captured at authorization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZohoBookingsCredentials {
    pub oauth: OAuthTokens,
    /// e.g. `bookings.zoho.in`
    pub api_domain: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
}

impl ZohoBookingsCredentials {
    /// Both ids are configured separately from OAuth and are required to book.
    pub fn booking_target(&self) -> Option<(&str, &str)> {
        match (self.service_id.as_deref(), self.staff_id.as_deref()) {
            (Some(service), Some(staff)) if !service.is_empty() && !staff.is_empty() => {
                Some((service, staff))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZohoCrmCredentials {
    pub oauth: OAuthTokens,
    pub zoho_organization_id: String,
    pub region: String,
    /// Bare API host returned by the token endpoint, e.g. `zohoapis.in`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: Secret,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmailCredentials {
    pub email: String,
    pub app_password: Secret,
}

/// The decrypted content of `integrations.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum CredentialBlob {
    Zoom(ZoomCredentials),
    GoogleCalendar(GoogleCalendarCredentials),
    Calendly(CalendlyCredentials),
    ZohoBookings(ZohoBookingsCredentials),
    Gmail(GmailCredentials),
    Twilio(TwilioCredentials),
    Zoho(ZohoCrmCredentials),
}

impl CredentialBlob {
    pub fn provider(&self) -> Provider {
        match self {
            CredentialBlob::Zoom(_) => Provider::Zoom,
            CredentialBlob::GoogleCalendar(_) => Provider::GoogleCalendar,
            CredentialBlob::Calendly(_) => Provider::Calendly,
            CredentialBlob::ZohoBookings(_) => Provider::ZohoBookings,
            CredentialBlob::Gmail(_) => Provider::Gmail,
            CredentialBlob::Twilio(_) => Provider::Twilio,
            CredentialBlob::Zoho(_) => Provider::Zoho,
        }
    }

    pub fn oauth(&self) -> Option<&OAuthTokens> {
        match self {
            CredentialBlob::GoogleCalendar(c) => Some(&c.oauth),
            CredentialBlob::Calendly(c) => Some(&c.oauth),
            CredentialBlob::ZohoBookings(c) => Some(&c.oauth),
            CredentialBlob::Zoho(c) => Some(&c.oauth),
            _ => None,
        }
    }

    pub fn oauth_mut(&mut self) -> Option<&mut OAuthTokens> {
        match self {
            CredentialBlob::GoogleCalendar(c) => Some(&mut c.oauth),
            CredentialBlob::Calendly(c) => Some(&mut c.oauth),
            CredentialBlob::ZohoBookings(c) => Some(&mut c.oauth),
            CredentialBlob::Zoho(c) => Some(&mut c.oauth),
            _ => None,
        }
    }
}

/// Body of `POST /integrations/{provider}/connect`.
///
/// One flat shape for every vendor; [`ConnectParams::into_blob`] picks and
/// checks the fields the provider needs.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub environment: Option<String>,
    pub api_domain: Option<String>,
    pub workspace_id: Option<String>,
    pub zoho_organization_id: Option<String>,
    pub zoho_region: Option<String>,
    pub account_id: Option<String>,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub app_password: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation {
            field: field.to_string(),
            message: format!("{} is required", field),
        }),
    }
}

impl ConnectParams {
    /// Build the provider's blob. OAuth providers need `pending`.
    pub fn into_blob(
        self,
        provider: Provider,
        pending: Option<PendingAuthorization>,
    ) -> Result<CredentialBlob, AppError> {
        let oauth = |client_id: Option<String>,
                     client_secret: Option<String>|
         -> Result<OAuthTokens, AppError> {
            let pending = pending.clone().ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "{} connect requires an authorization state",
                    provider
                ))
            })?;
            Ok(OAuthTokens::new(
                required(client_id, "clientId")?,
                Secret::new(required(client_secret, "clientSecret")?),
                pending,
            ))
        };

        let blob = match provider {
            Provider::Zoom => CredentialBlob::Zoom(ZoomCredentials {
                account_id: required(self.account_id, "accountId")?,
                client_id: required(self.client_id, "clientId")?,
                client_secret: Secret::new(required(self.client_secret, "clientSecret")?),
            }),
            Provider::Twilio => CredentialBlob::Twilio(TwilioCredentials {
                account_sid: required(self.account_sid, "accountSid")?,
                auth_token: Secret::new(required(self.auth_token, "authToken")?),
                phone_number: required(self.phone_number, "phoneNumber")?,
            }),
            Provider::Gmail => CredentialBlob::Gmail(GmailCredentials {
                email: required(self.email, "email")?,
                app_password: Secret::new(required(self.app_password, "appPassword")?),
            }),
            Provider::GoogleCalendar => CredentialBlob::GoogleCalendar(GoogleCalendarCredentials {
                oauth: oauth(self.client_id, self.client_secret)?,
            }),
            Provider::Calendly => CredentialBlob::Calendly(CalendlyCredentials {
                oauth: oauth(self.client_id, self.client_secret)?,
                environment: self
                    .environment
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "production".to_string()),
                user_uri: None,
                user_name: None,
                scheduling_url: None,
            }),
            Provider::ZohoBookings => {
                let api_domain = required(self.api_domain, "apiDomain")?;
                let region = zoho_region_of(&api_domain).ok_or_else(|| AppError::Validation {
                    field: "apiDomain".into(),
                    message: format!("cannot derive a Zoho region from '{}'", api_domain),
                })?;
                CredentialBlob::ZohoBookings(ZohoBookingsCredentials {
                    oauth: oauth(self.client_id, self.client_secret)?,
                    api_domain,
                    region,
                    workspace_id: self.workspace_id.filter(|w| !w.trim().is_empty()),
                    service_id: None,
                    staff_id: None,
                })
            }
            Provider::Zoho => CredentialBlob::Zoho(ZohoCrmCredentials {
                oauth: oauth(self.client_id, self.client_secret)?,
                zoho_organization_id: required(self.zoho_organization_id, "zohoOrganizationId")?,
                region: self
                    .zoho_region
                    .map(|r| r.trim().to_ascii_lowercase())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "in".to_string()),
                api_domain: None,
            }),
        };
        Ok(blob)
    }
}

/// `bookings.zoho.in` -> `in`, `bookings.zoho.com.au` -> `com.au`.
pub fn zoho_region_of(api_domain: &str) -> Option<String> {
    let host = api_domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let region = match host.split_once("zoho.") {
        Some((_, region)) => region,
        None => host.rsplit('.').next()?,
    };
    (!region.is_empty()).then(|| region.to_ascii_lowercase())
}
