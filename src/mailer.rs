//! Outbound email via the Resend HTTP API.
//!
//! The trigger talks to a [`Mailer`] trait object so tests can substitute a
//! recording mock; `ResendMailer` is the production implementation. A missing
//! API key disables sending without failing startup.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use tracing::info;

const RESEND_BASE_URL: &str = "https://api.resend.com";

/// One email with a single CSV attachment.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment_name: String,
    pub attachment_csv: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<()>;
    fn is_enabled(&self) -> bool;
}

pub struct ResendMailer {
    api_key: Option<String>,
    from_address: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ResendPayload {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    attachments: Vec<ResendAttachment>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment {
    filename: String,
    content: String,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>, from_address: String) -> Self {
        Self {
            api_key,
            from_address,
            base_url: RESEND_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Point at a different endpoint (integration tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<()> {
        let Some(ref api_key) = self.api_key else {
            return Err(anyhow!("RESEND_API_KEY not configured"));
        };

        let payload = ResendPayload {
            from: self.from_address.clone(),
            to: email.to.clone(),
            subject: email.subject.clone(),
            html: email.html_body.clone(),
            attachments: vec![ResendAttachment {
                filename: email.attachment_name.clone(),
                content: base64::engine::general_purpose::STANDARD
                    .encode(email.attachment_csv.as_bytes()),
            }],
        };

        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Resend request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Resend returned {status}: {body}"));
        }

        info!(
            recipients = email.to.len(),
            attachment = %email.attachment_name,
            "Email sent"
        );
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
