//! Turns integrations API responses into sentences a voice agent can read
//! aloud. Every function here returns text; none of them fail.

use serde_json::Value;

use super::client::{Downstream, DownstreamError};

pub const AUTH_UNAVAILABLE: &str = "Error: Authentication not available";

const NO_INTEGRATIONS: &str = "No integrations are currently connected. Please ask the admin to connect integrations in the settings panel.";
const NO_MEETING_INTEGRATIONS: &str = "No meeting integrations are currently connected. Please ask the admin to connect at least one integration (Zoom, Google Calendar, Calendly, or Zoho Bookings) in the settings panel.";
const MEETING_INTEGRATIONS_FAILED: &str = "The connected meeting integrations could not book the meeting right now. Please try again later or ask the admin to check the integrations in the settings panel.";
const BOOKING_INTERNAL: &str =
    "The booking system encountered an internal error. Please try again in a moment.";
const BOOKING_TIMEOUT: &str = "The booking system is taking too long to respond. Please try again.";
const BOOKING_UNREACHABLE: &str =
    "Unable to connect to the booking system. Please check if the service is running.";

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `meetingId` comes back as a number from some paths and a string from others.
fn id_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Generic failure sentence for a non-2xx response.
pub fn failure(action: &str, resp: &Downstream) -> String {
    match resp.error_message() {
        Some(message) => format!("Failed to {}: {}", action, message),
        None => format!("Failed to {} (status {})", action, resp.status),
    }
}

pub fn transport_failure(action: &str, err: &DownstreamError) -> String {
    format!("Failed to {}: {}", action, err)
}

pub fn integrations(body: &Value) -> String {
    let lines: Vec<String> = body
        .as_array()
        .map(|rows| {
            rows.iter()
                .map(|row| {
                    format!(
                        "- {} ({} {})",
                        str_field(row, "name").unwrap_or("Unnamed"),
                        str_field(row, "provider").unwrap_or("unknown").to_uppercase(),
                        str_field(row, "type").unwrap_or("unknown").to_uppercase(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    if lines.is_empty() {
        NO_INTEGRATIONS.to_string()
    } else {
        format!("Available integrations:\n{}", lines.join("\n"))
    }
}

pub fn sms_sent(body: &Value) -> String {
    format!(
        "SMS sent successfully. Message ID: {}",
        str_field(body, "sid").unwrap_or("unknown")
    )
}

pub fn email_sent(body: &Value, fallback_recipient: &str) -> String {
    format!(
        "Email sent successfully to {}",
        str_field(body, "recipient").unwrap_or(fallback_recipient)
    )
}

pub fn meeting_created(body: &Value) -> String {
    let id = id_field(body, "meetingId").unwrap_or_else(|| "unknown".into());
    let link = str_field(body, "joinUrl").unwrap_or("unavailable");
    match str_field(body, "password") {
        Some(password) => format!(
            "Meeting created successfully. The meeting ID is {}, the join link is {}, and the password is {}.",
            id, link, password
        ),
        None => format!(
            "Meeting created successfully. The meeting ID is {} and the join link is {}.",
            id, link
        ),
    }
}

pub fn booking_confirmed(body: &Value) -> String {
    let details = body.get("meetingDetails").cloned().unwrap_or(Value::Null);
    let name = str_field(&details, "customerName").unwrap_or("the customer");
    let date = str_field(&details, "date").unwrap_or("the requested date");
    let time = str_field(&details, "time").unwrap_or("the requested time");
    let used: Vec<&str> = body
        .get("integrationsUsed")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut text = format!(
        "Meeting booked successfully for {} on {} at {} via {}!",
        name,
        date,
        time,
        used.join(", ")
    );

    if let Some(zoom) = body.get("zoomMeeting") {
        if let Some(url) = str_field(zoom, "joinUrl") {
            text.push_str(&format!(" Zoom link: {}.", url));
        }
        if let Some(password) = str_field(zoom, "password") {
            text.push_str(&format!(" Zoom password: {}.", password));
        }
    }
    if let Some(meet) = body
        .get("googleCalendar")
        .and_then(|g| str_field(g, "googleMeetLink"))
    {
        text.push_str(&format!(" Google Meet link: {}.", meet));
    }
    if let Some(link) = body
        .get("calendly")
        .and_then(|c| str_field(c, "schedulingLink"))
    {
        text.push_str(&format!(" Calendly scheduling link: {}.", link));
    }
    if let Some(id) = body
        .get("zohoBookings")
        .and_then(|z| str_field(z, "bookingId"))
    {
        text.push_str(&format!(" Booking ID: {}.", id));
    }

    text.push_str(" Confirmation details have been sent to the customer.");
    text
}

pub fn booking_rejected(resp: &Downstream) -> String {
    match resp.status {
        404 if resp.body["error"].get("integrationErrors").is_some() => {
            MEETING_INTEGRATIONS_FAILED.to_string()
        }
        404 => NO_MEETING_INTEGRATIONS.to_string(),
        400 | 422 => format!(
            "Booking validation error: {}",
            resp.error_message().unwrap_or("invalid booking details")
        ),
        s if s >= 500 => BOOKING_INTERNAL.to_string(),
        _ => failure("book meeting", resp),
    }
}

pub fn booking_unreachable(err: &DownstreamError) -> String {
    match err {
        DownstreamError::Timeout(_) => BOOKING_TIMEOUT.to_string(),
        DownstreamError::Connect(_) => BOOKING_UNREACHABLE.to_string(),
        DownstreamError::Other(_) => transport_failure("book meeting", err),
    }
}

pub fn zoho_booked(body: &Value) -> String {
    let id = str_field(body, "bookingId").unwrap_or("pending");
    match str_field(body, "bookingLink") {
        Some(link) => format!(
            "Appointment booked successfully in Zoho Bookings. Booking ID: {}. Booking link: {}.",
            id, link
        ),
        None => format!(
            "Appointment booked successfully in Zoho Bookings. Booking ID: {}.",
            id
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integrations_listing() {
        let body = json!([
            {"name": "Twilio SMS", "provider": "twilio", "type": "sms"},
            {"name": "Zoom Meetings", "provider": "zoom", "type": "meeting"}
        ]);
        assert_eq!(
            integrations(&body),
            "Available integrations:\n- Twilio SMS (TWILIO SMS)\n- Zoom Meetings (ZOOM MEETING)"
        );
        assert_eq!(integrations(&json!([])), NO_INTEGRATIONS);
    }

    #[test]
    fn test_meeting_sentence_with_and_without_password() {
        let with = meeting_created(&json!({"meetingId": 812345, "joinUrl": "https://zoom.us/j/812345", "password": "abc"}));
        assert_eq!(
            with,
            "Meeting created successfully. The meeting ID is 812345, the join link is https://zoom.us/j/812345, and the password is abc."
        );
        let without = meeting_created(&json!({"meetingId": "9", "joinUrl": "https://zoom.us/j/9"}));
        assert!(without.ends_with("The meeting ID is 9 and the join link is https://zoom.us/j/9."));
    }

    #[test]
    fn test_booking_sentence_lists_links() {
        let body = json!({
            "meetingDetails": {"customerName": "Asha", "date": "2026-03-14", "time": "15:30"},
            "integrationsUsed": ["Zoom", "Calendly"],
            "zoomMeeting": {"joinUrl": "https://zoom.us/j/1", "password": "pw"},
            "calendly": {"schedulingLink": "https://calendly.com/acme"}
        });
        let text = booking_confirmed(&body);
        assert!(text.starts_with("Meeting booked successfully for Asha on 2026-03-14 at 15:30 via Zoom, Calendly!"));
        assert!(text.contains("Zoom link: https://zoom.us/j/1."));
        assert!(text.contains("Calendly scheduling link: https://calendly.com/acme."));
        assert!(text.ends_with("Confirmation details have been sent to the customer."));
    }

    #[test]
    fn test_booking_errors_by_status() {
        let not_found = Downstream { status: 404, body: json!({}) };
        assert_eq!(booking_rejected(&not_found), NO_MEETING_INTEGRATIONS);

        let all_failed = Downstream {
            status: 404,
            body: json!({"error": {
                "message": "All connected meeting integrations failed to book the meeting.",
                "integrationErrors": {"zoom": "zoom unavailable: timed out"}
            }}),
        };
        assert_eq!(booking_rejected(&all_failed), MEETING_INTEGRATIONS_FAILED);

        let invalid = Downstream {
            status: 400,
            body: json!({"error": {"message": "bookingDate is required"}}),
        };
        assert_eq!(
            booking_rejected(&invalid),
            "Booking validation error: bookingDate is required"
        );

        let broken = Downstream { status: 502, body: Value::Null };
        assert_eq!(booking_rejected(&broken), BOOKING_INTERNAL);

        assert_eq!(
            booking_unreachable(&DownstreamError::Timeout("30s".into())),
            BOOKING_TIMEOUT
        );
    }
}
