//! Per-provider authorization-code endpoints.

use serde::Deserialize;
use serde_json::Value;

use crate::models::credentials::CredentialBlob;
use crate::providers::http::json;
use crate::providers::{ProviderError, VendorEndpoints, VendorHttp};

const GOOGLE_SCOPE: &str =
    "https://www.googleapis.com/auth/calendar.events https://www.googleapis.com/auth/calendar";
const ZOHO_BOOKINGS_SCOPE: &str = "zohobookings.data.CREATE";
const ZOHO_CRM_SCOPE: &str = "ZohoCRM.modules.leads.READ,ZohoCRM.modules.leads.ALL,\
     ZohoCRM.modules.contacts.READ,ZohoCRM.modules.contacts.ALL,ZohoCRM.users.READ";

/// Where and how one provider runs the authorization-code grant.
#[derive(Debug, Clone)]
pub struct OAuthEndpoint {
    pub authorize_url: String,
    pub token_url: String,
    pub scope: Option<&'static str>,
    /// Ask for a refresh token and a fresh consent screen.
    pub offline: bool,
    /// Used when the token response omits `expires_in`.
    pub default_expires_in: i64,
}

impl OAuthEndpoint {
    pub fn for_blob(blob: &CredentialBlob, endpoints: &VendorEndpoints) -> Option<Self> {
        let endpoint = match blob {
            CredentialBlob::GoogleCalendar(_) => Self {
                authorize_url: endpoints.google_authorize.clone(),
                token_url: endpoints.google_token.clone(),
                scope: Some(GOOGLE_SCOPE),
                offline: true,
                default_expires_in: 3600,
            },
            CredentialBlob::Calendly(_) => Self {
                authorize_url: format!("{}/oauth/authorize", endpoints.calendly_auth),
                token_url: format!("{}/oauth/token", endpoints.calendly_auth),
                scope: None,
                offline: false,
                default_expires_in: 7200,
            },
            CredentialBlob::ZohoBookings(c) => {
                let accounts = endpoints.zoho_accounts(&c.region);
                Self {
                    authorize_url: format!("{}/oauth/v2/auth", accounts),
                    token_url: format!("{}/oauth/v2/token", accounts),
                    scope: Some(ZOHO_BOOKINGS_SCOPE),
                    offline: true,
                    default_expires_in: 3600,
                }
            }
            CredentialBlob::Zoho(c) => {
                let accounts = endpoints.zoho_accounts(&c.region);
                Self {
                    authorize_url: format!("{}/oauth/v2/auth", accounts),
                    token_url: format!("{}/oauth/v2/token", accounts),
                    scope: Some(ZOHO_CRM_SCOPE),
                    offline: true,
                    default_expires_in: 3600,
                }
            }
            _ => return None,
        };
        Some(endpoint)
    }

    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, url::ParseError> {
        let mut params = vec![
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("state", state),
        ];
        if let Some(scope) = self.scope {
            params.push(("scope", scope));
        }
        if self.offline {
            params.push(("access_type", "offline"));
            params.push(("prompt", "consent"));
        }
        Ok(url::Url::parse_with_params(&self.authorize_url, &params)?.to_string())
    }
}

/// A successful response from a token endpoint.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    /// Zoho only: the API host for the account's data center.
    pub api_domain: Option<String>,
}

#[derive(Deserialize)]
struct RawGrant {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    api_domain: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Upper bound on a vendor-reported lifetime, keeps expiry arithmetic in range.
pub const MAX_EXPIRES_IN_SECS: i64 = u32::MAX as i64;

fn parse_grant(raw: RawGrant, default_expires_in: i64) -> Result<TokenGrant, ProviderError> {
    // Zoho reports some failures as 200 with an `error` field.
    if let Some(error) = raw.error {
        return Err(ProviderError::Vendor {
            status: 200,
            body: error,
        });
    }
    let access_token = raw
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("token response has no access_token".into()))?;
    let expires_in = match raw.expires_in {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .filter(|secs| *secs > 0)
    .unwrap_or(default_expires_in)
    .min(MAX_EXPIRES_IN_SECS);

    Ok(TokenGrant {
        access_token,
        refresh_token: raw.refresh_token.filter(|t| !t.is_empty()),
        expires_in,
        api_domain: raw.api_domain.map(|d| bare_api_domain(&d)),
    })
}

/// `https://www.zohoapis.in` -> `zohoapis.in`
pub fn bare_api_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .trim_end_matches('/')
        .to_string()
}

async fn token_request(
    http: &VendorHttp,
    endpoint: &OAuthEndpoint,
    form: &[(&str, &str)],
) -> Result<TokenGrant, ProviderError> {
    let resp = http
        .send(http.client().post(&endpoint.token_url).form(form))
        .await?;
    let raw: RawGrant = json(resp).await?;
    parse_grant(raw, endpoint.default_expires_in)
}

/// Trade an authorization code for tokens.
pub async fn exchange_code(
    http: &VendorHttp,
    endpoint: &OAuthEndpoint,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenGrant, ProviderError> {
    token_request(
        http,
        endpoint,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// Trade a refresh token for a new access token.
pub async fn refresh_grant(
    http: &VendorHttp,
    endpoint: &OAuthEndpoint,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenGrant, ProviderError> {
    token_request(
        http,
        endpoint,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ],
    )
    .await
}
