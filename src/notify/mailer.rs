//! The single delivery primitive every notification goes through.
//!
//! Providers:
//! - `console`: logs the message (development)
//! - `http`: posts a SendGrid-shaped JSON body to the configured endpoint
use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Mail, MailProvider};
use crate::model::truncate_chars;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error {status}: {body}")]
    Provider { status: u16, body: String },
}

/// A fully rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Sends one message with a fixed sender identity and reply-to address.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError>;
}

pub fn from_config(cfg: &Mail) -> Box<dyn Mailer> {
    match cfg.provider {
        MailProvider::Console => Box::new(ConsoleMailer::new(cfg.clone())),
        MailProvider::Http => Box::new(HttpMailer::new(cfg.clone())),
    }
}

pub struct ConsoleMailer {
    cfg: Mail,
}

impl ConsoleMailer {
    pub fn new(cfg: Mail) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            from = %self.cfg.sender_email,
            from_name = %self.cfg.sender_name,
            reply_to = %self.cfg.reply_to,
            "email (console provider)"
        );
        info!(body_text = %email.text, "email body (plain text)");
        debug!(body_html_length = email.html.len(), "email body (HTML)");
        Ok(())
    }
}

pub struct HttpMailer {
    cfg: Mail,
    http: reqwest::Client,
}

impl HttpMailer {
    pub fn new(cfg: Mail) -> Self {
        Self {
            cfg,
            http: reqwest::Client::new(),
        }
    }

    pub fn build_body(&self, email: &OutgoingEmail) -> serde_json::Value {
        json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": self.cfg.sender_email, "name": self.cfg.sender_name },
            "reply_to": { "email": self.cfg.reply_to },
            "subject": email.subject,
            "content": [
                { "type": "text/plain", "value": email.text },
                { "type": "text/html", "value": email.html }
            ]
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        if self.cfg.endpoint.is_empty() || self.cfg.api_key.is_empty() {
            return Err(DeliveryError::NotConfigured);
        }

        let response = self
            .http
            .post(&self.cfg.endpoint)
            .bearer_auth(&self.cfg.api_key)
            .json(&self.build_body(email))
            .send()
            .await
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(to = %email.to, subject = %email.subject, "email sent");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Provider {
                status: status.as_u16(),
                body: truncate_chars(&body, 400),
            })
        }
    }
}
