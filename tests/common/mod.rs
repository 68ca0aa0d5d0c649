//! Shared harness: the full router over an in-memory store, with every
//! vendor routed to one wiremock server and outgoing mail recorded.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callhub::config::Config;
use callhub::models::credentials::{CredentialBlob, GmailCredentials};
use callhub::models::integration::Provider;
use callhub::providers::gmail::{MailTransport, OutgoingEmail};
use callhub::providers::{ProviderError, VendorEndpoints};
use callhub::store::memory::MemoryStore;
use callhub::AppState;

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, OutgoingEmail)>>,
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(
        &self,
        account: &GmailCredentials,
        email: &OutgoingEmail,
    ) -> Result<(), ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((account.email.clone(), email.clone()));
        Ok(())
    }
}

pub fn endpoints(server: &MockServer) -> VendorEndpoints {
    let uri = server.uri();
    VendorEndpoints {
        zoom_oauth: format!("{}/zoom", uri),
        zoom_api: format!("{}/zoom/v2", uri),
        google_authorize: format!("{}/google/auth", uri),
        google_token: format!("{}/google/token", uri),
        google_calendar_api: format!("{}/calendar/v3", uri),
        calendly_auth: format!("{}/calendly-auth", uri),
        calendly_api: format!("{}/calendly", uri),
        twilio_api: format!("{}/twilio", uri),
        zoho_accounts: Some(format!("{}/zoho-accounts", uri)),
        zoho_api: Some(format!("{}/zoho-api", uri)),
        smtp_host: "127.0.0.1".into(),
        smtp_port: 1,
    }
}

pub struct Harness {
    pub server: MockServer,
    pub state: Arc<AppState>,
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub org: Uuid,
}

impl Harness {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self::with_config(server, Config::local()).await
    }

    pub async fn with_config(server: MockServer, config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let state = Arc::new(
            AppState::build(config, store.clone(), endpoints(&server), mailer.clone()).unwrap(),
        );
        let app = callhub::app(state.clone());
        Self {
            server,
            state,
            app,
            store,
            mailer,
            org: Uuid::new_v4(),
        }
    }

    /// Call the API as a trusted service for this harness's organization.
    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_as(self.org, method, uri, body).await
    }

    pub async fn call_as(
        &self,
        org: Uuid,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-organization-id", org.to_string());
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = self.app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Decrypted credentials currently stored for a provider.
    pub async fn stored(&self, provider: Provider) -> CredentialBlob {
        let row = self
            .state
            .registry
            .find(self.org, provider)
            .await
            .unwrap()
            .expect("integration row");
        self.state.registry.open(&row).unwrap()
    }

    pub async fn connect_zoom(&self) {
        Mock::given(method("POST"))
            .and(path("/zoom/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "zoom-at",
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path("/zoom/v2/users/me/meetings"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 81234567890u64,
                "join_url": "https://zoom.us/j/81234567890",
                "password": "x7Qp2"
            })))
            .mount(&self.server)
            .await;

        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/integrations/zoom/connect",
                Some(json!({"accountId": "acct", "clientId": "zid", "clientSecret": "zsecret"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    pub async fn connect_gmail(&self) {
        let (status, _) = self
            .call(
                Method::POST,
                "/api/v1/integrations/gmail/connect",
                Some(json!({"email": "desk@acme.test", "appPassword": "app-pass"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Start the OAuth flow for `provider` and return the issued state.
    pub async fn start_oauth(&self, provider: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/v1/integrations/{}/connect", provider),
                Some(json!({"clientId": "cid", "clientSecret": "csecret"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "connect {}: {}", provider, body);
        body["state"].as_str().unwrap().to_string()
    }

    pub async fn complete_oauth(&self, provider: &str, state: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            &format!("/api/v1/integrations/{}/oauth/complete", provider),
            Some(json!({"code": "auth-code", "state": state})),
        )
        .await
    }

    /// Google Calendar authorized with `access_token` / `rt-1`.
    pub async fn connect_google(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": "rt-1",
                "expires_in": 3600
            })))
            .mount(&self.server)
            .await;
        let state = self.start_oauth("google_calendar").await;
        let (status, body) = self.complete_oauth("google_calendar", &state).await;
        assert_eq!(status, StatusCode::OK, "complete google: {}", body);
    }

    /// Calendly authorized, with a permanent scheduling page on the profile.
    pub async fn connect_calendly(&self) {
        Mock::given(method("POST"))
            .and(path("/calendly-auth/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "cal-at",
                "refresh_token": "cal-rt",
                "expires_in": 7200
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendly/users/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resource": {
                    "uri": "https://api.calendly.com/users/U1",
                    "name": "Acme Sales",
                    "scheduling_url": "https://calendly.com/acme"
                }
            })))
            .mount(&self.server)
            .await;
        let state = self.start_oauth("calendly").await;
        let (status, body) = self.complete_oauth("calendly", &state).await;
        assert_eq!(status, StatusCode::OK, "complete calendly: {}", body);
    }
}

pub fn booking_body() -> Value {
    json!({
        "customerName": "Asha Rao",
        "customerEmail": "asha@example.com",
        "bookingDate": "2026-03-14",
        "bookingTime": "15:30",
        "durationMinutes": 30,
        "timezone": "Asia/Kolkata"
    })
}
