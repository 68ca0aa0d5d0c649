use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::{MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{ProviderError, VendorEndpoints};
use crate::models::credentials::GmailCredentials;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub html_body: Option<String>,
}

/// Submits one email on behalf of a connected mailbox.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        account: &GmailCredentials,
        email: &OutgoingEmail,
    ) -> Result<(), ProviderError>;
}

/// STARTTLS submission with the mailbox's app password.
pub struct SmtpMailer {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(endpoints: &VendorEndpoints, timeout: Duration) -> Self {
        Self {
            host: endpoints.smtp_host.clone(),
            port: endpoints.smtp_port,
            timeout,
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        account: &GmailCredentials,
        email: &OutgoingEmail,
    ) -> Result<(), ProviderError> {
        let message = build_message(&account.email, email)?;

        let creds = Credentials::new(
            account.email.clone(),
            account.app_password.expose().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| ProviderError::Transient(e.to_string()))?
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(creds)
            .build();

        transport.send(message).await.map_err(|e| {
            let code = e.status().map(|c| c.to_string());
            if code.as_deref() == Some("535") {
                ProviderError::Unauthorized
            } else if e.is_permanent() {
                ProviderError::Vendor {
                    status: code.and_then(|c| c.parse().ok()).unwrap_or(550),
                    body: e.to_string(),
                }
            } else {
                ProviderError::Transient(e.to_string())
            }
        })?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");
        Ok(())
    }
}

/// Plain text, or text plus HTML as `multipart/alternative`.
pub fn build_message(from: &str, email: &OutgoingEmail) -> Result<Message, ProviderError> {
    let from = from
        .parse()
        .map_err(|e| ProviderError::NotConfigured(format!("invalid sender '{}': {}", from, e)))?;
    let to = email.to.parse().map_err(|e| {
        ProviderError::NotConfigured(format!("invalid recipient '{}': {}", email.to, e))
    })?;

    let builder = Message::builder().from(from).to(to).subject(&email.subject);
    let message = match &email.html_body {
        Some(html) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(email.body.clone()))
                .singlepart(SinglePart::html(html.clone())),
        ),
        None => builder.body(email.body.clone()),
    };
    message.map_err(|e| ProviderError::InvalidResponse(format!("cannot build email: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(html: Option<&str>) -> OutgoingEmail {
        OutgoingEmail {
            to: "asha@example.com".into(),
            subject: "Meeting Confirmation".into(),
            body: "See you soon".into(),
            html_body: html.map(String::from),
        }
    }

    #[test]
    fn test_plain_message() {
        let message = build_message("ops@example.com", &email(None)).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: asha@example.com"));
        assert!(raw.contains("Subject: Meeting Confirmation"));
        assert!(raw.contains("See you soon"));
    }

    #[test]
    fn test_html_is_alternative() {
        let message = build_message("ops@example.com", &email(Some("<b>See you</b>"))).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("<b>See you</b>"));
    }

    #[test]
    fn test_bad_recipient() {
        let mut bad = email(None);
        bad.to = "not an address".into();
        assert!(matches!(
            build_message("ops@example.com", &bad),
            Err(ProviderError::NotConfigured(_))
        ));
    }
}
