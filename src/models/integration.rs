use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability an integration provides to the organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    Crm,
    Sms,
    Email,
    Meeting,
}

impl IntegrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationType::Crm => "crm",
            IntegrationType::Sms => "sms",
            IntegrationType::Email => "email",
            IntegrationType::Meeting => "meeting",
        }
    }
}

impl fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crm" => Ok(IntegrationType::Crm),
            "sms" => Ok(IntegrationType::Sms),
            "email" => Ok(IntegrationType::Email),
            "meeting" => Ok(IntegrationType::Meeting),
            other => Err(format!("unknown integration type '{}'", other)),
        }
    }
}

/// Vendor key stored on every integration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Zoom,
    GoogleCalendar,
    Calendly,
    ZohoBookings,
    Gmail,
    Twilio,
    /// Zoho CRM. The short key predates the bookings integration.
    Zoho,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::Zoom,
        Provider::GoogleCalendar,
        Provider::Calendly,
        Provider::ZohoBookings,
        Provider::Gmail,
        Provider::Twilio,
        Provider::Zoho,
    ];

    /// Providers the unified booking flow fans out to.
    pub const MEETING: [Provider; 4] = [
        Provider::Zoom,
        Provider::GoogleCalendar,
        Provider::Calendly,
        Provider::ZohoBookings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Zoom => "zoom",
            Provider::GoogleCalendar => "google_calendar",
            Provider::Calendly => "calendly",
            Provider::ZohoBookings => "zoho_bookings",
            Provider::Gmail => "gmail",
            Provider::Twilio => "twilio",
            Provider::Zoho => "zoho",
        }
    }

    pub fn integration_type(&self) -> IntegrationType {
        match self {
            Provider::Zoom
            | Provider::GoogleCalendar
            | Provider::Calendly
            | Provider::ZohoBookings => IntegrationType::Meeting,
            Provider::Gmail => IntegrationType::Email,
            Provider::Twilio => IntegrationType::Sms,
            Provider::Zoho => IntegrationType::Crm,
        }
    }

    /// Default row name when an integration is first connected.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Zoom => "Zoom Meetings",
            Provider::GoogleCalendar => "Google Calendar",
            Provider::Calendly => "Calendly",
            Provider::ZohoBookings => "Zoho Bookings",
            Provider::Gmail => "Gmail",
            Provider::Twilio => "Twilio SMS",
            Provider::Zoho => "Zoho CRM",
        }
    }

    /// Short label used in booking summaries ("Meeting booked via Zoom, Calendly").
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Zoom => "Zoom",
            Provider::GoogleCalendar => "Google Calendar",
            Provider::Calendly => "Calendly",
            Provider::ZohoBookings => "Zoho Bookings",
            Provider::Gmail => "Gmail",
            Provider::Twilio => "Twilio",
            Provider::Zoho => "Zoho CRM",
        }
    }

    /// Interactive authorization-code providers. The rest connect synchronously.
    pub fn uses_oauth(&self) -> bool {
        matches!(
            self,
            Provider::GoogleCalendar | Provider::Calendly | Provider::ZohoBookings | Provider::Zoho
        )
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    /// Accepts both `google_calendar` and the URL-friendly `google-calendar`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == key)
            .ok_or_else(|| format!("unknown provider '{}'", s))
    }
}

/// One organization-scoped integration row.
///
/// `config` is the sealed credential blob; it never leaves the service.
#[derive(Debug, Clone)]
pub struct Integration {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub integration_type: IntegrationType,
    pub provider: Provider,
    pub config: Option<String>,
    pub config_version: i64,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw row shape as stored in PostgreSQL.
#[derive(Debug, sqlx::FromRow)]
pub struct IntegrationRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub integration_type: String,
    pub provider: String,
    pub config: Option<String>,
    pub config_version: i64,
    pub is_active: bool,
    pub is_connected: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<IntegrationRow> for Integration {
    type Error = anyhow::Error;

    fn try_from(row: IntegrationRow) -> Result<Self, Self::Error> {
        Ok(Integration {
            id: row.id,
            organization_id: row.organization_id,
            name: row.name,
            integration_type: row
                .integration_type
                .parse()
                .map_err(anyhow::Error::msg)?,
            provider: row.provider.parse().map_err(anyhow::Error::msg)?,
            config: row.config,
            config_version: row.config_version,
            is_active: row.is_active,
            is_connected: row.is_connected,
            last_sync_at: row.last_sync_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input to the create-or-update ("connect") operation.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub organization_id: Uuid,
    pub provider: Provider,
    pub name: String,
    pub config: String,
    pub is_connected: bool,
}

/// Replacement of a row's sealed credentials.
#[derive(Debug, Clone)]
pub struct ConfigWrite {
    pub config: String,
    /// Compare-and-set guard; `None` writes unconditionally.
    pub expected_version: Option<i64>,
    pub is_connected: Option<bool>,
    pub touch_last_sync: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPatch {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub provider: Provider,
    pub is_active: bool,
    pub is_connected: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationSummary {
    fn from(i: &Integration) -> Self {
        Self {
            id: i.id,
            name: i.name.clone(),
            integration_type: i.integration_type,
            provider: i.provider,
            is_active: i.is_active,
            is_connected: i.is_connected,
            created_at: i.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationDetail {
    #[serde(flatten)]
    pub summary: IntegrationSummary,
    pub organization_id: Uuid,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Integration> for IntegrationDetail {
    fn from(i: &Integration) -> Self {
        Self {
            summary: IntegrationSummary::from(i),
            organization_id: i.organization_id,
            last_sync_at: i.last_sync_at,
            updated_at: i.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing_accepts_both_spellings() {
        assert_eq!("google_calendar".parse::<Provider>().unwrap(), Provider::GoogleCalendar);
        assert_eq!("Zoho-Bookings".parse::<Provider>().unwrap(), Provider::ZohoBookings);
        assert!("hubspot".parse::<Provider>().is_err());
    }

    #[test]
    fn test_provider_types() {
        for p in Provider::MEETING {
            assert_eq!(p.integration_type(), IntegrationType::Meeting);
        }
        assert_eq!(Provider::Twilio.integration_type(), IntegrationType::Sms);
        assert_eq!(Provider::Gmail.integration_type(), IntegrationType::Email);
        assert_eq!(Provider::Zoho.integration_type(), IntegrationType::Crm);
        assert!(!Provider::Zoom.uses_oauth());
        assert!(Provider::Calendly.uses_oauth());
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let now = Utc::now();
        let integration = Integration {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "Twilio SMS".into(),
            integration_type: IntegrationType::Sms,
            provider: Provider::Twilio,
            config: Some("sealed".into()),
            config_version: 1,
            is_active: true,
            is_connected: true,
            last_sync_at: None,
            created_at: now,
            updated_at: now,
        };
        let v = serde_json::to_value(IntegrationDetail::from(&integration)).unwrap();
        assert_eq!(v["type"], "sms");
        assert_eq!(v["provider"], "twilio");
        assert_eq!(v["isConnected"], true);
        assert!(v.get("config").is_none());
    }
}
