use std::fmt::Write as _;

use crate::models::booking::{BookingResponse, BookingSlot};
use crate::providers::gmail::OutgoingEmail;

const RULE: &str = "================================";

fn section(body: &mut String, title: &str) {
    let _ = write!(body, "\n{}\n{}\n", title, RULE);
}

/// Plain-text confirmation listing every link the booking produced.
pub fn compose(slot: &BookingSlot, booking: &BookingResponse) -> OutgoingEmail {
    let mut body = String::new();
    let _ = write!(
        body,
        "Dear {},\n\nYour meeting has been successfully scheduled!\n",
        slot.customer_name
    );

    section(&mut body, "Meeting Details:");
    let _ = writeln!(body, "Date: {}", slot.date_label());
    let _ = writeln!(body, "Time: {} ({})", slot.time_label(), slot.timezone);
    let _ = writeln!(body, "Duration: {} minutes", slot.duration_minutes);

    if let Some(zoom) = &booking.zoom_meeting {
        section(&mut body, "Zoom Meeting Details:");
        let _ = writeln!(body, "Join URL: {}", zoom.join_url);
        let _ = writeln!(body, "Meeting ID: {}", zoom.meeting_id);
        if let Some(password) = &zoom.password {
            let _ = writeln!(body, "Password: {}", password);
        }
    }

    if let Some(google) = &booking.google_calendar {
        section(&mut body, "Google Calendar Event:");
        if let Some(link) = &google.event_link {
            let _ = writeln!(body, "Calendar Event: {}", link);
        }
        if let Some(meet) = &google.google_meet_link {
            let _ = writeln!(body, "Google Meet: {}", meet);
        }
    }

    if let Some(calendly) = &booking.calendly {
        section(&mut body, "Calendly Scheduling Link:");
        let _ = writeln!(body, "Scheduling URL: {}", calendly.scheduling_link);
    }

    if let Some(zoho) = &booking.zoho_bookings {
        if zoho.booking_id.is_some() || zoho.booking_link.is_some() {
            section(&mut body, "Zoho Bookings:");
        }
        if let Some(id) = &zoho.booking_id {
            let _ = writeln!(body, "Booking ID: {}", id);
        }
        if let Some(link) = &zoho.booking_link {
            let _ = writeln!(body, "Booking Link: {}", link);
        }
    }

    if let Some(notes) = &slot.notes {
        section(&mut body, "Additional Notes:");
        let _ = writeln!(body, "{}", notes);
    }

    body.push_str(
        "\n\nIf you have any questions or need to reschedule, please contact us.\n\n\
         Best regards,\nYour Team\n",
    );

    OutgoingEmail {
        to: slot.customer_email.clone(),
        subject: format!(
            "Meeting Confirmation - {} at {}",
            slot.date_label(),
            slot.time_label()
        ),
        body,
        html_body: None,
    }
}
