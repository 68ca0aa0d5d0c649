//! Connect, authorize and refresh through the HTTP API.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use callhub::models::credentials::CredentialBlob;
use callhub::models::integration::Provider;
use common::{booking_body, Harness};

/// A callback with the wrong state is rejected before any code exchange, and
/// a successful callback consumes the state so a replay fails.
#[tokio::test]
async fn test_oauth_state_enforced_and_consumed() {
    let h = Harness::start().await;
    Mock::given(method("POST"))
        .and(path("/google/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "g-at",
            "refresh_token": "g-rt",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/google_calendar/connect",
            Some(json!({"clientId": "cid", "clientSecret": "csecret"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let state = body["state"].as_str().unwrap().to_string();
    let url = body["authorizationUrl"].as_str().unwrap();
    assert!(url.contains(&format!("state={}", state)));
    assert!(url.contains("access_type=offline"));

    let (list_status, rows) = h.call(Method::GET, "/api/v1/integrations/list", None).await;
    assert_eq!(list_status, StatusCode::OK);
    assert_eq!(rows[0]["isConnected"], false);

    let (status, body) = h.complete_oauth("google_calendar", "forged-state").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", body);

    let (status, body) = h.complete_oauth("google_calendar", &state).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["expiresAt"].is_string());

    let (status, _) = h.complete_oauth("google_calendar", &state).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, rows) = h.call(Method::GET, "/api/v1/integrations/list", None).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["isConnected"], true);

    match h.stored(Provider::GoogleCalendar).await {
        CredentialBlob::GoogleCalendar(c) => {
            assert!(c.oauth.pending.is_none());
            assert_eq!(c.oauth.access_token.unwrap().expose(), "g-at");
        }
        other => panic!("unexpected blob {:?}", other.provider()),
    }
}

/// Completing for a provider that was never connected names the provider.
#[tokio::test]
async fn test_complete_without_connect() {
    let h = Harness::start().await;
    let (status, body) = h.complete_oauth("calendly", "anything").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error"]["message"],
        "Calendly integration not found. Please connect it first."
    );
}

/// Connecting twice overwrites one row instead of creating a second.
#[tokio::test]
async fn test_connect_is_idempotent() {
    let h = Harness::start().await;
    let connect = |token: &'static str| {
        json!({"accountSid": "AC123", "authToken": token, "phoneNumber": "+15550001111"})
    };

    let (_, first) = h
        .call(Method::POST, "/api/v1/integrations/twilio/connect", Some(connect("tok-1")))
        .await;
    let (_, second) = h
        .call(Method::POST, "/api/v1/integrations/twilio/connect", Some(connect("tok-2")))
        .await;
    assert_eq!(first["integrationId"], second["integrationId"]);
    assert_eq!(second["isConnected"], true);
    assert_eq!(h.store.len().await, 1);

    match h.stored(Provider::Twilio).await {
        CredentialBlob::Twilio(c) => assert_eq!(c.auth_token.expose(), "tok-2"),
        other => panic!("unexpected blob {:?}", other.provider()),
    }
}

/// Missing credential fields are reported by name.
#[tokio::test]
async fn test_connect_validates_fields() {
    let h = Harness::start().await;
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/zoom/connect",
            Some(json!({"clientId": "zid", "clientSecret": "zs"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("accountId"));
    assert!(h.store.is_empty().await);
}

/// A 401 from the vendor triggers one refresh; the caller sees success and
/// the refreshed token is what gets stored.
#[tokio::test]
async fn test_expired_token_refreshed_transparently() {
    let h = Harness::start().await;
    h.connect_google("at-1").await;

    Mock::given(method("POST"))
        .and(path("/google/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_token"})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(header("authorization", "Bearer at-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "evt-1",
            "htmlLink": "https://calendar.google.com/event?eid=evt-1",
            "hangoutLink": "https://meet.google.com/abc-defg-hij"
        })))
        .expect(2)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .call(Method::POST, "/api/v1/integrations/book-meeting", Some(booking_body()))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["integrationsUsed"], json!(["Google Calendar"]));
    assert_eq!(
        body["googleCalendar"]["googleMeetLink"],
        "https://meet.google.com/abc-defg-hij"
    );

    match h.stored(Provider::GoogleCalendar).await {
        CredentialBlob::GoogleCalendar(c) => {
            assert_eq!(c.oauth.access_token.unwrap().expose(), "at-2");
            // Google omits the refresh token on refresh; the old one is kept.
            assert_eq!(c.oauth.refresh_token.unwrap().expose(), "rt-1");
        }
        other => panic!("unexpected blob {:?}", other.provider()),
    }

    // The stored token is used directly next time; no second refresh.
    let (status, _) = h
        .call(Method::POST, "/api/v1/integrations/book-meeting", Some(booking_body()))
        .await;
    assert_eq!(status, StatusCode::OK);
}

/// A refresh the vendor rejects surfaces as "not connected", not a 500.
#[tokio::test]
async fn test_rejected_refresh_reports_not_connected() {
    let h = Harness::start().await;
    h.connect_google("at-1").await;

    Mock::given(method("POST"))
        .and(path("/google/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;

    let (status, body) = h
        .call(Method::POST, "/api/v1/integrations/book-meeting", Some(booking_body()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_connected_error");
}
