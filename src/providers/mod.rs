//! Vendor clients.
//!
//! Each client wraps one vendor's REST contract and speaks in
//! [`ProviderError`]. OAuth bookkeeping (refresh and persist) lives in
//! `crate::oauth`; clients only ever receive a bearer token.

pub mod calendly;
pub mod gmail;
pub mod google_calendar;
pub mod http;
pub mod twilio;
pub mod zoho_bookings;
pub mod zoho_crm;
pub mod zoom;

pub use http::VendorHttp;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// 4xx other than 401. The vendor's body is kept verbatim.
    #[error("vendor rejected the request ({status}): {body}")]
    Vendor { status: u16, body: String },

    /// 401 from the vendor, or a refresh that could not produce a token.
    #[error("vendor rejected the credentials")]
    Unauthorized,

    /// Timeout, connection failure or a vendor-side 5xx.
    #[error("vendor unreachable: {0}")]
    Transient(String),

    /// Local configuration needed for the call is missing.
    #[error("{0}")]
    NotConfigured(String),

    #[error("unexpected vendor response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Vendor { .. } => "vendor_error",
            ProviderError::Unauthorized => "unauthorized",
            ProviderError::Transient(_) => "transient",
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Base URLs for every vendor the service talks to.
///
/// Defaults point at production hosts. Each field can be overridden so a
/// deployment (or a test) can route a vendor elsewhere.
#[derive(Debug, Clone)]
pub struct VendorEndpoints {
    pub zoom_oauth: String,
    pub zoom_api: String,
    pub google_authorize: String,
    pub google_token: String,
    pub google_calendar_api: String,
    pub calendly_auth: String,
    pub calendly_api: String,
    pub twilio_api: String,
    /// Replaces `https://accounts.zoho.{region}` when set.
    pub zoho_accounts: Option<String>,
    /// Replaces `https://www.zohoapis.{region}` when set.
    pub zoho_api: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl Default for VendorEndpoints {
    fn default() -> Self {
        Self {
            zoom_oauth: "https://zoom.us".into(),
            zoom_api: "https://api.zoom.us/v2".into(),
            google_authorize: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            google_token: "https://oauth2.googleapis.com/token".into(),
            google_calendar_api: "https://www.googleapis.com/calendar/v3".into(),
            calendly_auth: "https://auth.calendly.com".into(),
            calendly_api: "https://api.calendly.com".into(),
            twilio_api: "https://api.twilio.com/2010-04-01".into(),
            zoho_accounts: None,
            zoho_api: None,
            smtp_host: "smtp.gmail.com".into(),
            smtp_port: 587,
        }
    }
}

impl VendorEndpoints {
    pub fn zoho_accounts(&self, region: &str) -> String {
        self.zoho_accounts
            .clone()
            .unwrap_or_else(|| format!("https://accounts.zoho.{}", region))
    }

    /// Zoho API root. `api_domain` is the bare host from a token response.
    pub fn zoho_api(&self, region: &str, api_domain: Option<&str>) -> String {
        if let Some(base) = &self.zoho_api {
            return base.clone();
        }
        match api_domain {
            Some(domain) if !domain.is_empty() => format!("https://www.{}", domain),
            _ => format!("https://www.zohoapis.{}", region),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoho_hosts_follow_region() {
        let endpoints = VendorEndpoints::default();
        assert_eq!(endpoints.zoho_accounts("in"), "https://accounts.zoho.in");
        assert_eq!(endpoints.zoho_api("eu", None), "https://www.zohoapis.eu");
        assert_eq!(
            endpoints.zoho_api("in", Some("zohoapis.com")),
            "https://www.zohoapis.com"
        );

        let overridden = VendorEndpoints {
            zoho_api: Some("http://127.0.0.1:9000".into()),
            ..VendorEndpoints::default()
        };
        assert_eq!(overridden.zoho_api("in", Some("zohoapis.in")), "http://127.0.0.1:9000");
    }
}
