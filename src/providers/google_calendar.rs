use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::json;

use super::http::json;
use super::{ProviderError, VendorEndpoints, VendorHttp};

#[derive(Debug, Clone)]
pub struct CalendarEventRequest {
    pub summary: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub attendee_email: Option<String>,
    pub want_video_link: bool,
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(rename = "htmlLink", default)]
    pub html_link: Option<String>,
    #[serde(rename = "hangoutLink", default)]
    pub video_link: Option<String>,
}

/// Google Calendar v3, primary calendar of the authorizing user.
pub struct GoogleCalendarClient {
    http: VendorHttp,
    endpoints: VendorEndpoints,
}

impl GoogleCalendarClient {
    pub fn new(http: VendorHttp, endpoints: VendorEndpoints) -> Self {
        Self { http, endpoints }
    }

    pub async fn create_event(
        &self,
        access_token: &str,
        request: &CalendarEventRequest,
    ) -> Result<CalendarEvent, ProviderError> {
        let mut body = json!({
            "summary": request.summary,
            "description": request.description,
            "start": {
                "dateTime": request.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": request.timezone,
            },
            "end": {
                "dateTime": request.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "timeZone": request.timezone,
            },
        });
        if let Some(email) = &request.attendee_email {
            body["attendees"] = json!([{ "email": email }]);
        }
        if request.want_video_link {
            body["conferenceData"] = json!({
                "createRequest": {
                    "requestId": uuid::Uuid::new_v4().to_string(),
                    "conferenceSolutionKey": { "type": "hangoutsMeet" }
                }
            });
        }

        let mut call = self
            .http
            .client()
            .post(format!(
                "{}/calendars/primary/events",
                self.endpoints.google_calendar_api
            ))
            .bearer_auth(access_token)
            .json(&body);
        if request.want_video_link {
            call = call.query(&[("conferenceDataVersion", "1")]);
        }

        json(self.http.send(call).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_event_requests_meet_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendar/v3/calendars/primary/events"))
            .and(query_param("conferenceDataVersion", "1"))
            .and(header("authorization", "Bearer g-at"))
            .and(body_partial_json(json!({
                "summary": "Meeting with Asha",
                "start": {"dateTime": "2026-03-14T15:30:00", "timeZone": "Asia/Kolkata"},
                "end": {"dateTime": "2026-03-14T16:00:00", "timeZone": "Asia/Kolkata"},
                "attendees": [{"email": "asha@example.com"}],
                "conferenceData": {"createRequest": {"conferenceSolutionKey": {"type": "hangoutsMeet"}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "evt-1",
                "htmlLink": "https://calendar.google.com/event?eid=evt-1",
                "hangoutLink": "https://meet.google.com/abc-defg-hij"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GoogleCalendarClient::new(
            VendorHttp::new(Duration::from_secs(5)).unwrap(),
            VendorEndpoints {
                google_calendar_api: format!("{}/calendar/v3", server.uri()),
                ..VendorEndpoints::default()
            },
        );
        let start = NaiveDateTime::parse_from_str("2026-03-14 15:30", "%Y-%m-%d %H:%M").unwrap();
        let event = client
            .create_event(
                "g-at",
                &CalendarEventRequest {
                    summary: "Meeting with Asha".into(),
                    description: "Intro call".into(),
                    start,
                    end: start + chrono::Duration::minutes(30),
                    attendee_email: Some("asha@example.com".into()),
                    want_video_link: true,
                    timezone: "Asia/Kolkata".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(event.id, "evt-1");
        assert_eq!(event.video_link.as_deref(), Some("https://meet.google.com/abc-defg-hij"));
    }
}
