//! Notification mailer abstraction
//!
//! Outbound mail is an opaque side effect: the email-link admission
//! variant hands a claim URL to whatever delivery pipeline is configured.
//! Composition, templating and delivery all live behind the webhook.

use crate::config::MailerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Trait for claim-link delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a session claim link to the given address
    async fn send_claim_link(&self, email: &str, claim_url: &str) -> Result<()>;
}

/// Webhook-backed mailer
pub struct WebhookMailer {
    client: reqwest::Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct ClaimLinkMessage<'a> {
    email: &'a str,
    claim_url: &'a str,
}

impl WebhookMailer {
    /// Create a new webhook mailer
    pub fn new(webhook_url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            webhook_url,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send_claim_link(&self, email: &str, claim_url: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&ClaimLinkMessage { email, claim_url })
            .send()
            .await
            .map_err(|e| AppError::MailerError {
                message: format!("Delivery request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::MailerError {
                message: format!("Delivery webhook returned {}", status),
            });
        }

        tracing::debug!(email = %email, "Claim link dispatched");
        Ok(())
    }
}

/// No-op mailer for deployments without a delivery webhook
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_claim_link(&self, email: &str, claim_url: &str) -> Result<()> {
        tracing::info!(
            email = %email,
            claim_url = %claim_url,
            "Mailer disabled, claim link not delivered"
        );
        Ok(())
    }
}

/// Create a mailer from configuration
pub fn create_mailer(config: &MailerConfig) -> Arc<dyn Mailer> {
    match config.webhook_url {
        Some(ref url) => Arc::new(WebhookMailer::new(url.clone(), config.timeout_secs)),
        None => Arc::new(NoopMailer),
    }
}
