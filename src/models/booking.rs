use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const DEFAULT_DURATION_MINUTES: u32 = 30;
const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Body of `POST /integrations/book-meeting`.
///
/// Required strings default to empty so a missing field is reported by
/// [`BookingRequest::validate`] with its name instead of a generic body error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub booking_date: String,
    /// `HH:MM`, 24h
    #[serde(default)]
    pub booking_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// A validated booking: one start instant, one end instant.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingSlot {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_minutes: u32,
    pub timezone: String,
    pub notes: Option<String>,
}

fn invalid(field: &str, message: impl Into<String>) -> AppError {
    AppError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl BookingRequest {
    pub fn validate(&self, default_timezone: &str) -> Result<BookingSlot, AppError> {
        let customer_name = self.customer_name.trim();
        if customer_name.is_empty() {
            return Err(invalid("customerName", "customerName is required"));
        }

        let customer_email = self.customer_email.trim();
        if customer_email.is_empty() {
            return Err(invalid("customerEmail", "customerEmail is required"));
        }
        if customer_email.parse::<lettre::Address>().is_err() {
            return Err(invalid(
                "customerEmail",
                format!("'{}' is not a valid email address", customer_email),
            ));
        }

        let date_raw = self.booking_date.trim();
        if date_raw.is_empty() {
            return Err(invalid("bookingDate", "bookingDate is required"));
        }
        let date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").map_err(|_| {
            invalid(
                "bookingDate",
                format!("invalid date '{}': use YYYY-MM-DD", date_raw),
            )
        })?;

        let time_raw = self.booking_time.trim();
        if time_raw.is_empty() {
            return Err(invalid("bookingTime", "bookingTime is required"));
        }
        let time = NaiveTime::parse_from_str(time_raw, "%H:%M").map_err(|_| {
            invalid(
                "bookingTime",
                format!("invalid time '{}': use HH:MM (24-hour)", time_raw),
            )
        })?;

        let duration_minutes = self.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(invalid(
                "durationMinutes",
                format!("durationMinutes must be between 1 and {}", MAX_DURATION_MINUTES),
            ));
        }

        let start = date.and_time(time);
        let end = start + Duration::minutes(i64::from(duration_minutes));

        Ok(BookingSlot {
            customer_name: customer_name.to_string(),
            customer_email: customer_email.to_string(),
            customer_phone: non_empty(&self.customer_phone),
            start,
            end,
            duration_minutes,
            timezone: non_empty(&self.timezone).unwrap_or_else(|| default_timezone.to_string()),
            notes: non_empty(&self.notes),
        })
    }
}

impl BookingSlot {
    pub fn date_label(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn time_label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn summary(&self) -> String {
        format!("Meeting with {}", self.customer_name)
    }

    pub fn description(&self) -> String {
        self.notes
            .clone()
            .unwrap_or_else(|| format!("Scheduled meeting with {}", self.customer_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingDetails {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    pub date: String,
    pub time: String,
    pub duration_minutes: u32,
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&BookingSlot> for MeetingDetails {
    fn from(slot: &BookingSlot) -> Self {
        Self {
            customer_name: slot.customer_name.clone(),
            customer_email: slot.customer_email.clone(),
            customer_phone: slot.customer_phone.clone(),
            date: slot.date_label(),
            time: slot.time_label(),
            duration_minutes: slot.duration_minutes,
            timezone: slot.timezone.clone(),
            notes: slot.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomMeetingFragment {
    pub meeting_id: String,
    pub join_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCalendarFragment {
    pub event_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_meet_link: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendlyLinkKind {
    PermanentLinkProvided,
    EventTypeLinkProvided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendlyFragment {
    pub scheduling_link: String,
    /// Account owner for permanent links, event type name otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub status: CalendlyLinkKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZohoBookingsFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_link: Option<String>,
    pub status: String,
}

/// Aggregate outcome of a unified booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub success: bool,
    pub message: String,
    pub meeting_details: MeetingDetails,
    pub integrations_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_meeting: Option<ZoomMeetingFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_calendar: Option<GoogleCalendarFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendly: Option<CalendlyFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoho_bookings: Option<ZohoBookingsFragment>,
    pub email_sent: bool,
    /// Provider key to error text, for diagnostics only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub integration_errors: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BookingRequest {
        BookingRequest {
            customer_name: "Asha Rao".into(),
            customer_email: "asha@example.com".into(),
            booking_date: "2026-03-14".into(),
            booking_time: "15:30".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_computes_end_and_defaults() {
        let slot = request().validate("Asia/Kolkata").unwrap();
        assert_eq!(slot.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert_eq!(slot.timezone, "Asia/Kolkata");
        assert_eq!(slot.start.format("%Y-%m-%d %H:%M").to_string(), "2026-03-14 15:30");
        assert_eq!(slot.end.format("%H:%M").to_string(), "16:00");
        assert_eq!(slot.summary(), "Meeting with Asha Rao");
        assert_eq!(slot.description(), "Scheduled meeting with Asha Rao");
    }

    #[test]
    fn test_end_crosses_midnight() {
        let mut req = request();
        req.booking_time = "23:45".into();
        req.duration_minutes = Some(45);
        req.timezone = Some("UTC".into());
        let slot = req.validate("Asia/Kolkata").unwrap();
        assert_eq!(slot.end.format("%Y-%m-%d %H:%M").to_string(), "2026-03-15 00:30");
        assert_eq!(slot.timezone, "UTC");
    }

    #[test]
    fn test_validation_names_offending_field() {
        let cases: Vec<(fn(&mut BookingRequest), &str)> = vec![
            (|r| r.customer_name = " ".into(), "customerName"),
            (|r| r.customer_email = String::new(), "customerEmail"),
            (|r| r.customer_email = "not-an-email".into(), "customerEmail"),
            (|r| r.booking_date = "14/03/2026".into(), "bookingDate"),
            (|r| r.booking_time = "3pm".into(), "bookingTime"),
            (|r| r.booking_time = "25:00".into(), "bookingTime"),
            (|r| r.duration_minutes = Some(0), "durationMinutes"),
        ];
        for (mutate, expected) in cases {
            let mut req = request();
            mutate(&mut req);
            match req.validate("UTC") {
                Err(AppError::Validation { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {} error, got {:?}", expected, other),
            }
        }
    }

    #[test]
    fn test_response_omits_empty_sections() {
        let slot = request().validate("UTC").unwrap();
        let response = BookingResponse {
            success: true,
            message: "ok".into(),
            meeting_details: MeetingDetails::from(&slot),
            integrations_used: vec!["Zoom".into()],
            zoom_meeting: Some(ZoomMeetingFragment {
                meeting_id: "123".into(),
                join_url: "https://zoom.us/j/123".into(),
                password: None,
            }),
            google_calendar: None,
            calendly: None,
            zoho_bookings: None,
            email_sent: false,
            integration_errors: BTreeMap::new(),
        };
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["zoomMeeting"]["joinUrl"], "https://zoom.us/j/123");
        assert!(v.get("googleCalendar").is_none());
        assert!(v.get("integrationErrors").is_none());
        assert_eq!(v["meetingDetails"]["durationMinutes"], 30);
    }
}
