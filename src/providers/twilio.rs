use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::http::json;
use super::{ProviderError, VendorEndpoints, VendorHttp};
use crate::models::credentials::TwilioCredentials;

static E164: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[1-9]\d{6,14}$").unwrap());

pub fn is_e164(number: &str) -> bool {
    E164.is_match(number)
}

#[derive(Deserialize)]
struct MessageResponse {
    sid: String,
}

/// Twilio Programmable Messaging. Basic auth with the account SID and token.
pub struct TwilioClient {
    credentials: TwilioCredentials,
    http: VendorHttp,
    endpoints: VendorEndpoints,
}

impl TwilioClient {
    pub fn new(credentials: TwilioCredentials, http: VendorHttp, endpoints: VendorEndpoints) -> Self {
        Self {
            credentials,
            http,
            endpoints,
        }
    }

    /// Send one SMS from the account's configured number. Returns the message SID.
    pub async fn send_sms(&self, to: &str, body: &str) -> Result<String, ProviderError> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.endpoints.twilio_api, self.credentials.account_sid
        );
        let resp = self
            .http
            .send(
                self.http
                    .client()
                    .post(url)
                    .basic_auth(
                        &self.credentials.account_sid,
                        Some(self.credentials.auth_token.expose()),
                    )
                    .form(&[
                        ("To", to),
                        ("From", self.credentials.phone_number.as_str()),
                        ("Body", body),
                    ]),
            )
            .await?;
        let message: MessageResponse = json(resp).await?;
        if message.sid.is_empty() {
            return Err(ProviderError::InvalidResponse("empty message sid".into()));
        }
        tracing::info!(sid = %message.sid, "SMS queued");
        Ok(message.sid)
    }
}
