//! The fixed set of tools exposed to the voice agent.

use std::collections::HashMap;

use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::types::McpToolDef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ListAvailableIntegrations,
    SendSms,
    SendEmail,
    CreateZoomMeeting,
    BookMeeting,
    /// Single-provider Zoho Bookings appointment. Superseded by `BookMeeting`.
    BookZohoMeeting,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::ListAvailableIntegrations,
        Tool::SendSms,
        Tool::SendEmail,
        Tool::CreateZoomMeeting,
        Tool::BookMeeting,
        Tool::BookZohoMeeting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::ListAvailableIntegrations => "list_available_integrations",
            Tool::SendSms => "send_sms",
            Tool::SendEmail => "send_email",
            Tool::CreateZoomMeeting => "create_zoom_meeting",
            Tool::BookMeeting => "book_meeting",
            Tool::BookZohoMeeting => "book_zoho_meeting",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Tool::ListAvailableIntegrations => {
                "List the integrations that are connected and active for this organization."
            }
            Tool::SendSms => "Send an SMS text message to a phone number in E.164 format.",
            Tool::SendEmail => "Send an email from the organization's connected mailbox.",
            Tool::CreateZoomMeeting => "Create a scheduled Zoom meeting and return its join link.",
            Tool::BookMeeting => {
                "Book a meeting with the customer using every connected meeting integration \
                 (Zoom, Google Calendar, Calendly, Zoho Bookings) and email them the details."
            }
            Tool::BookZohoMeeting => {
                "Deprecated: book an appointment through Zoho Bookings only. Prefer book_meeting."
            }
        }
    }

    fn input_schema(&self) -> Value {
        match self {
            Tool::ListAvailableIntegrations => json!({
                "type": "object",
                "properties": {},
            }),
            Tool::SendSms => json!({
                "type": "object",
                "properties": {
                    "phone_number": {
                        "type": "string",
                        "description": "Recipient in E.164 format, e.g. +15551234567"
                    },
                    "message": { "type": "string", "minLength": 1 }
                },
                "required": ["phone_number", "message"]
            }),
            Tool::SendEmail => json!({
                "type": "object",
                "properties": {
                    "to_email": { "type": "string", "minLength": 3 },
                    "subject": { "type": "string", "minLength": 1 },
                    "body": { "type": "string", "minLength": 1 },
                    "html_body": { "type": "string" }
                },
                "required": ["to_email", "subject", "body"]
            }),
            Tool::CreateZoomMeeting => json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "minLength": 1 },
                    "start_time": {
                        "type": "string",
                        "description": "ISO 8601 start, e.g. 2026-03-14T15:30:00"
                    },
                    "duration": { "type": "integer", "minimum": 1, "default": 60 },
                    "timezone": { "type": "string", "default": "UTC" },
                    "agenda": { "type": "string" }
                },
                "required": ["topic", "start_time"]
            }),
            Tool::BookMeeting | Tool::BookZohoMeeting => json!({
                "type": "object",
                "properties": {
                    "customer_name": { "type": "string", "minLength": 1 },
                    "customer_email": { "type": "string", "minLength": 3 },
                    "customer_phone": { "type": "string" },
                    "booking_date": {
                        "type": "string",
                        "description": "YYYY-MM-DD"
                    },
                    "booking_time": {
                        "type": "string",
                        "description": "HH:MM, 24-hour"
                    },
                    "duration_minutes": { "type": "integer", "minimum": 1, "default": 30 },
                    "notes": { "type": "string" },
                    "timezone": { "type": "string" }
                },
                "required": ["customer_name", "customer_email", "booking_date", "booking_time"]
            }),
        }
    }

    pub fn definition(&self) -> McpToolDef {
        McpToolDef {
            name: self.name().to_string(),
            description: Some(self.description().to_string()),
            input_schema: self.input_schema(),
        }
    }
}

pub fn definitions() -> Vec<McpToolDef> {
    Tool::ALL.iter().map(Tool::definition).collect()
}

static SCHEMAS: Lazy<HashMap<Tool, JSONSchema>> = Lazy::new(|| {
    Tool::ALL
        .into_iter()
        .map(|tool| {
            let schema = JSONSchema::compile(&tool.input_schema()).expect("tool schemas are valid");
            (tool, schema)
        })
        .collect()
});

/// Check arguments against the tool's input schema. The error lists every
/// violation in one line.
pub fn validate(tool: Tool, arguments: &Value) -> Result<(), String> {
    let Some(schema) = SCHEMAS.get(&tool) else {
        return Ok(());
    };
    schema.validate(arguments).map_err(|errors| {
        errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path.trim_start_matches('/'), e)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name("delete_everything"), None);
        assert_eq!(definitions().len(), 6);
    }

    #[test]
    fn test_validate_reports_missing_field() {
        let err = validate(Tool::SendSms, &json!({"phone_number": "+15551234567"})).unwrap_err();
        assert!(err.contains("message"));

        assert!(validate(Tool::SendSms, &json!({"phone_number": "+15551234567", "message": "hi"})).is_ok());
        assert!(validate(Tool::ListAvailableIntegrations, &json!({})).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        let err = validate(
            Tool::BookMeeting,
            &json!({
                "customer_name": "Asha",
                "customer_email": "asha@example.com",
                "booking_date": "2026-03-14",
                "booking_time": "15:30",
                "duration_minutes": "thirty"
            }),
        )
        .unwrap_err();
        assert!(err.contains("duration_minutes"));
    }
}
