//! Email transport boundary.
//!
//! The campaign engine hands each personalized message to an
//! [`EmailTransport`] and treats any error as scoped to that recipient.
//! SendGrid delivers for real; the dry-run transport only logs.

use std::time::Instant;

use async_trait::async_trait;
use multimail_core::config::SendGridConfig;
use multimail_core::error::TransportError;
use tracing::{debug, info, warn};

/// One rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    /// Sender address override; `None` uses the transport's default sender.
    pub sender: Option<String>,
}

impl OutgoingEmail {
    /// Reject messages no provider would accept.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.to.is_empty() || self.subject.is_empty() {
            return Err(TransportError::InvalidMessage(
                "recipient and subject are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sends one email. Implementations may take arbitrary (bounded) time.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError>;
}

/// SendGrid v3 mail-send transport.
pub struct SendGridTransport {
    config: SendGridConfig,
    client: reqwest::Client,
}

impl SendGridTransport {
    pub fn new(config: SendGridConfig) -> Self {
        info!(
            from = %config.from_email,
            endpoint = %config.endpoint,
            "SendGrid transport initialized"
        );
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the SendGrid API payload for one message.
    pub fn payload(&self, email: &OutgoingEmail) -> serde_json::Value {
        let from_email = email.sender.as_deref().unwrap_or(&self.config.from_email);

        serde_json::json!({
            "personalizations": [{
                "to": [{"email": email.to}]
            }],
            "from": {
                "email": from_email,
                "name": self.config.from_name
            },
            "subject": email.subject,
            "content": [{
                "type": "text/html",
                "value": email.html_body
            }]
        })
    }
}

#[async_trait]
impl EmailTransport for SendGridTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        email.validate()?;
        let start = Instant::now();

        debug!(to = %email.to, subject = %email.subject, "Sending email via SendGrid");

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(email))
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        metrics::counter!("sendgrid.requests", "status" => status.as_u16().to_string())
            .increment(1);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(to = %email.to, %status, "SendGrid rejected message");
            return Err(TransportError::Rejected(format!("{status}: {}", body.trim())));
        }

        debug!(
            to = %email.to,
            latency_ms = start.elapsed().as_millis() as u64,
            "SendGrid accepted message"
        );
        Ok(())
    }
}

/// Logs each message instead of delivering it.
#[derive(Debug, Default)]
pub struct DryRunTransport;

#[async_trait]
impl EmailTransport for DryRunTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        email.validate()?;
        info!(
            to = %email.to,
            subject = %email.subject,
            sender = email.sender.as_deref().unwrap_or("<default>"),
            body_bytes = email.html_body.len(),
            "Dry run: message not delivered"
        );
        Ok(())
    }
}
