//! Generative responder abstraction
//!
//! The conversation backend is an opaque collaborator: it takes the user
//! message and returns reply text plus token/cost metadata. Nothing in the
//! scheduler core depends on it; the gateway's conversation glue is its
//! only caller.

use crate::config::ResponderConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Reply from the generative backend with usage metadata
#[derive(Debug, Clone)]
pub struct ResponderReply {
    pub text: String,
    pub tokens_used: i64,
    pub cost: f64,
}

/// Trait for generative response backends
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply for one user message within a session
    async fn reply(&self, session_id: Uuid, message: &str) -> Result<ResponderReply>;

    /// Get the model identifier
    fn model_name(&self) -> &str;
}

/// HTTP responder client
pub struct HttpResponder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_retry: Duration,
}

#[derive(Serialize)]
struct BackendRequest<'a> {
    session_id: Uuid,
    message: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct BackendResponse {
    reply: String,
    tokens_used: i64,
    cost: f64,
}

impl HttpResponder {
    /// Create a new HTTP responder from configuration
    pub fn new(config: &ResponderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retry: Duration::from_secs(config.max_retry_secs),
        }
    }

    async fn make_request(&self, session_id: Uuid, message: &str) -> Result<BackendResponse> {
        let url = format!("{}/v1/responses", self.base_url);

        let request = BackendRequest {
            session_id,
            message,
            model: &self.model,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::ResponderTimeout {
                    timeout_ms: self.max_retry.as_millis() as u64,
                }
            } else {
                AppError::ResponderError {
                    message: format!("Request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ResponderError {
                message: format!("API error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::ResponderError {
            message: format!("Failed to parse response: {}", e),
        })
    }

    fn retryable(error: &AppError) -> bool {
        match error {
            AppError::ResponderTimeout { .. } => true,
            AppError::ResponderError { message } => {
                // 5xx and transport failures retry; client errors do not
                !message.starts_with("API error 4")
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn reply(&self, session_id: Uuid, message: &str) -> Result<ResponderReply> {
        let start = Instant::now();

        let policy = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry),
            ..Default::default()
        };

        let result = backoff::future::retry(policy, || async {
            self.make_request(session_id, message).await.map_err(|e| {
                if Self::retryable(&e) {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Responder request failed, retrying"
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await;

        metrics::record_responder(
            start.elapsed().as_secs_f64(),
            &self.model,
            result.is_ok(),
        );

        result.map(|r| ResponderReply {
            text: r.reply,
            tokens_used: r.tokens_used,
            cost: r.cost,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Create a responder from configuration
pub fn create_responder(config: &ResponderConfig) -> Arc<dyn Responder> {
    Arc::new(HttpResponder::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_permanent() {
        let err = AppError::ResponderError {
            message: "API error 422 Unprocessable Entity: bad input".to_string(),
        };
        assert!(!HttpResponder::retryable(&err));
    }

    #[test]
    fn test_server_errors_and_timeouts_retry() {
        let err = AppError::ResponderError {
            message: "API error 503 Service Unavailable: overloaded".to_string(),
        };
        assert!(HttpResponder::retryable(&err));

        let err = AppError::ResponderTimeout { timeout_ms: 20000 };
        assert!(HttpResponder::retryable(&err));
    }
}
