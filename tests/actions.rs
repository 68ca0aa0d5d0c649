//! Single-vendor actions and integration management over HTTP.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::Harness;

async fn connect_twilio(h: &Harness) -> String {
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/twilio/connect",
            Some(json!({
                "accountSid": "AC123",
                "authToken": "tok",
                "phoneNumber": "+15550001111"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["integrationId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_send_sms() {
    let h = Harness::start().await;
    connect_twilio(&h).await;
    Mock::given(method("POST"))
        .and(path("/twilio/Accounts/AC123/Messages.json"))
        .and(body_string_contains("To=%2B15551234567"))
        .and(body_string_contains("From=%2B15550001111"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"sid": "SM1"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-sms",
            Some(json!({"phoneNumber": "+15551234567", "message": "Your table is ready"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body, json!({"success": true, "sid": "SM1"}));
}

#[tokio::test]
async fn test_send_sms_requires_twilio() {
    let h = Harness::start().await;
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-sms",
            Some(json!({"phoneNumber": "+15551234567", "message": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "not_connected_error");
}

#[tokio::test]
async fn test_send_sms_rejects_local_numbers() {
    let h = Harness::start().await;
    connect_twilio(&h).await;
    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-sms",
            Some(json!({"phoneNumber": "555-1234", "message": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("phoneNumber"));
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vendor_rejection_is_bad_gateway() {
    let h = Harness::start().await;
    connect_twilio(&h).await;
    Mock::given(method("POST"))
        .and(path("/twilio/Accounts/AC123/Messages.json"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"code": 21408, "message": "Permission to send an SMS has not been enabled"})),
        )
        .mount(&h.server)
        .await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-sms",
            Some(json!({"phoneNumber": "+15551234567", "message": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"]["message"].as_str().unwrap().contains("21408"));
}

#[tokio::test]
async fn test_send_email_through_connected_mailbox() {
    let h = Harness::start().await;
    h.connect_gmail().await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-email",
            Some(json!({
                "toEmail": "asha@example.com",
                "subject": "Your quote",
                "body": "Attached below."
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["recipient"], "asha@example.com");

    let sent = h.mailer.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "desk@acme.test");
    assert_eq!(sent[0].1.subject, "Your quote");
}

#[tokio::test]
async fn test_send_email_names_bad_recipient_field() {
    let h = Harness::start().await;
    h.connect_gmail().await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-email",
            Some(json!({"toEmail": "not-an-address", "subject": "s", "body": "b"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("toEmail"));
    assert!(h.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_video_meeting() {
    let h = Harness::start().await;
    h.connect_zoom().await;

    let (status, body) = h
        .call(
            Method::POST,
            "/api/v1/integrations/create-video-meeting",
            Some(json!({
                "topic": "Onboarding",
                "startTime": "2026-03-14T10:00:00",
                "durationMinutes": 30,
                "timezone": "UTC"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["joinUrl"], "https://zoom.us/j/81234567890");

    let requests = h.server.received_requests().await.unwrap();
    let created = requests
        .iter()
        .find(|r| r.url.path() == "/zoom/v2/users/me/meetings")
        .expect("meeting created");
    let sent: serde_json::Value = serde_json::from_slice(&created.body).unwrap();
    assert_eq!(sent["duration"], 30);
    assert_eq!(sent["topic"], "Onboarding");
}

/// Rows are scoped to the organization that owns them.
#[tokio::test]
async fn test_integrations_isolated_per_organization() {
    let h = Harness::start().await;
    let id = connect_twilio(&h).await;
    let uri = format!("/api/v1/integrations/{}", id);

    let (status, body) = h.call(Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["provider"], "twilio");
    assert!(body.get("configuration").is_none());
    assert!(!body.to_string().contains("authToken"));

    let stranger = Uuid::new_v4();
    let (status, _) = h.call_as(stranger, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, rows) = h
        .call_as(stranger, Method::GET, "/api/v1/integrations/list", None)
        .await;
    assert_eq!(rows, json!([]));
}

#[tokio::test]
async fn test_list_filters_by_type() {
    let h = Harness::start().await;
    connect_twilio(&h).await;
    h.connect_gmail().await;

    let (status, rows) = h
        .call(Method::GET, "/api/v1/integrations/list?type=sms", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["provider"], "twilio");
    assert_eq!(rows[0]["type"], "sms");

    let (status, _) = h
        .call(Method::GET, "/api/v1/integrations/list?type=fax", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_integration() {
    let h = Harness::start().await;
    let id = connect_twilio(&h).await;
    let uri = format!("/api/v1/integrations/{}", id);

    let (status, body) = h.call(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["message"], "Twilio sms integration deleted successfully");
    assert!(h.store.is_empty().await);

    let (status, _) = h.call(Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h
        .call(
            Method::POST,
            "/api/v1/integrations/send-sms",
            Some(json!({"phoneNumber": "+15551234567", "message": "hi"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_without_identity_rejected() {
    let h = Harness::start().await;
    let request = axum::http::Request::builder()
        .uri("/api/v1/integrations/list")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = tower::ServiceExt::oneshot(h.app.clone(), request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
