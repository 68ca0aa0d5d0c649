use chrono::NaiveDateTime;
use serde_json::{json, Value};

use super::http::json;
use super::{ProviderError, VendorEndpoints, VendorHttp};

/// Zoho rejects appointments without a phone number.
pub const PHONE_PLACEHOLDER: &str = "+000000000000";

#[derive(Debug, Clone)]
pub struct AppointmentRequest {
    pub service_id: String,
    pub staff_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timezone: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub booking_id: Option<String>,
    pub booking_link: Option<String>,
    pub status: String,
}

/// Zoho Bookings appointment API for one data-center region.
pub struct ZohoBookingsClient {
    http: VendorHttp,
    base_url: String,
}

impl ZohoBookingsClient {
    pub fn new(http: VendorHttp, endpoints: &VendorEndpoints, region: &str) -> Self {
        Self {
            http,
            base_url: endpoints.zoho_api(region, None),
        }
    }

    pub async fn create_appointment(
        &self,
        access_token: &str,
        request: &AppointmentRequest,
    ) -> Result<Appointment, ProviderError> {
        let customer_details = json!({
            "name": request.customer_name,
            "email": request.customer_email,
            "phone_number": request
                .customer_phone
                .as_deref()
                .unwrap_or(PHONE_PLACEHOLDER),
        })
        .to_string();

        let from_time = request.start.format("%d-%b-%Y %H:%M:%S").to_string();
        let to_time = request.end.format("%d-%b-%Y %H:%M:%S").to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("service_id", request.service_id.as_str()),
            ("staff_id", request.staff_id.as_str()),
            ("customer_details", customer_details.as_str()),
            ("from_time", from_time.as_str()),
            ("to_time", to_time.as_str()),
            ("timezone", request.timezone.as_str()),
        ];
        if let Some(notes) = request.notes.as_deref() {
            form.push(("notes", notes));
        }

        let resp = self
            .http
            .send(
                self.http
                    .client()
                    .post(format!("{}/bookings/v1/json/appointment", self.base_url))
                    .header("Authorization", format!("Zoho-oauthtoken {}", access_token))
                    .form(&form),
            )
            .await?;
        let body: Value = json(resp).await?;
        parse_appointment(&body)
    }
}

/// Zoho answers 200 even for rejected bookings; the verdict is in the body.
fn parse_appointment(body: &Value) -> Result<Appointment, ProviderError> {
    let response = body.get("response").unwrap_or(body);
    let outcome = response.get("status").and_then(Value::as_str).unwrap_or("success");
    let data = response.get("returnvalue").unwrap_or(response);

    let inner_status = data.get("status").and_then(Value::as_str);
    if outcome == "failure" || inner_status == Some("failure") {
        return Err(ProviderError::Vendor {
            status: 200,
            body: body.to_string(),
        });
    }

    let text = |key: &str| {
        data.get(key).and_then(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    Ok(Appointment {
        booking_id: text("booking_id"),
        booking_link: text("summary_url").or_else(|| text("booking_link")),
        status: "booking_created".to_string(),
    })
}
