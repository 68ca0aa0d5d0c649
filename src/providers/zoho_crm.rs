use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::json;
use super::{ProviderError, VendorHttp};

/// A Zoho CRM lead, trimmed to the fields the dialer imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub lead_status: Option<String>,
    pub lead_source: Option<String>,
    pub description: Option<String>,
}

impl LeadRecord {
    fn from_zoho(id: &str, raw: &Value) -> Self {
        let field = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        Self {
            id: field("id").unwrap_or_else(|| id.to_string()),
            first_name: field("First_Name"),
            last_name: field("Last_Name"),
            full_name: field("Full_Name"),
            email: field("Email"),
            phone: field("Phone").or_else(|| field("Mobile")),
            company: field("Company"),
            title: field("Title"),
            lead_status: field("Lead_Status"),
            lead_source: field("Lead_Source"),
            description: field("Description"),
        }
    }

    /// Name to show when the lead has no explicit full name.
    pub fn display_name(&self) -> String {
        if let Some(full) = &self.full_name {
            return full.clone();
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            "Unknown".to_string()
        } else {
            joined
        }
    }
}

#[derive(Deserialize)]
struct LeadPage {
    #[serde(default)]
    data: Vec<Value>,
}

/// Zoho CRM v2 lead reads.
pub struct ZohoCrmClient {
    http: VendorHttp,
    base_url: String,
}

impl ZohoCrmClient {
    /// `base_url` is the regional API root, e.g. `https://www.zohoapis.in`.
    pub fn new(http: VendorHttp, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub async fn get_lead(&self, access_token: &str, lead_id: &str) -> Result<LeadRecord, ProviderError> {
        let resp = self
            .http
            .send_read(
                self.http
                    .reads()
                    .get(format!(
                        "{}/crm/v2/Leads/{}",
                        self.base_url,
                        urlencoding::encode(lead_id)
                    ))
                    .header("Authorization", format!("Zoho-oauthtoken {}", access_token)),
            )
            .await?;

        // Zoho answers 204 with an empty body for unknown ids.
        if resp.status() == reqwest::StatusCode::NO_CONTENT {
            return Err(ProviderError::Vendor {
                status: 404,
                body: format!("lead {} not found", lead_id),
            });
        }

        let page: LeadPage = json(resp).await?;
        page.data
            .first()
            .map(|raw| LeadRecord::from_zoho(lead_id, raw))
            .ok_or_else(|| ProviderError::Vendor {
                status: 404,
                body: format!("lead {} not found", lead_id),
            })
    }
}
