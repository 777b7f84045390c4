//! Configuration management for Parley services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Admission and queue scheduling configuration
    pub scheduler: SchedulerConfig,

    /// Generative responder backend configuration
    pub responder: ResponderConfig,

    /// Notification mailer configuration
    pub mailer: MailerConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

/// Knobs for the session admission controller, queue reconciler,
/// expiry reaper and wait-time estimator.
///
/// All historical call sites disagreed on limits; these are the single
/// authoritative values for a deployment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently active sessions
    #[serde(default = "default_max_concurrent_sessions")]
    pub max_concurrent_sessions: u32,

    /// Maximum number of sessions allowed to wait in the queue
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: u32,

    /// Hard session TTL in minutes, fixed at creation
    #[serde(default = "default_session_duration")]
    pub session_duration_minutes: i64,

    /// Active sessions quiet for longer than this are reclaimed
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_minutes: i64,

    /// Estimator constant: assumed minutes per active session
    #[serde(default = "default_average_session")]
    pub average_session_minutes: i64,

    /// Estimator clamp: never present a larger wait than this
    #[serde(default = "default_max_estimated_wait")]
    pub max_estimated_wait_minutes: i64,

    /// Estimator fallback: minutes per queue slot when nothing is active yet
    #[serde(default = "default_bootstrap_wait")]
    pub bootstrap_wait_minutes: i64,

    /// Interval between periodic garbage collection passes
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponderConfig {
    /// Base URL of the generative-response backend
    #[serde(default = "default_responder_base_url")]
    pub base_url: String,

    /// API key for the responder backend
    pub api_key: Option<String>,

    /// Model identifier passed through to the backend
    #[serde(default = "default_responder_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_responder_timeout")]
    pub timeout_secs: u64,

    /// Give up retrying after this many seconds
    #[serde(default = "default_responder_retry_window")]
    pub max_retry_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailerConfig {
    /// Webhook URL for outbound notification delivery (None disables mail)
    pub webhook_url: Option<String>,

    /// Base URL used to build session claim links
    #[serde(default = "default_claim_base_url")]
    pub claim_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_mailer_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// SHA-256 hex hash of the admin API key (None disables admin routes)
    pub admin_key_hash: Option<String>,

    /// Admin key header name
    #[serde(default = "default_admin_header")]
    pub admin_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_max_concurrent_sessions() -> u32 { 10 }
fn default_max_queue_size() -> u32 { 50 }
fn default_session_duration() -> i64 { 30 }
fn default_inactivity_threshold() -> i64 { 5 }
fn default_average_session() -> i64 { 10 }
fn default_max_estimated_wait() -> i64 { 120 }
fn default_bootstrap_wait() -> i64 { 2 }
fn default_gc_interval() -> u64 { 60 }
fn default_responder_base_url() -> String { "http://localhost:8091".to_string() }
fn default_responder_model() -> String { "parley-assistant-1".to_string() }
fn default_responder_timeout() -> u64 { 30 }
fn default_responder_retry_window() -> u64 { 20 }
fn default_claim_base_url() -> String { "http://localhost:8080/v1/sessions".to_string() }
fn default_mailer_timeout() -> u64 { 10 }
fn default_admin_header() -> String { "X-Admin-Key".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "parley".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SCHEDULER__MAX_CONCURRENT_SESSIONS=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl SchedulerConfig {
    /// Interval between periodic reaper passes
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    /// Hard session TTL
    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_duration_minutes)
    }

    /// Inactivity reclaim threshold
    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.inactivity_threshold_minutes)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/parley".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            scheduler: SchedulerConfig::default(),
            responder: ResponderConfig {
                base_url: default_responder_base_url(),
                api_key: None,
                model: default_responder_model(),
                timeout_secs: default_responder_timeout(),
                max_retry_secs: default_responder_retry_window(),
            },
            mailer: MailerConfig {
                webhook_url: None,
                claim_base_url: default_claim_base_url(),
                timeout_secs: default_mailer_timeout(),
            },
            auth: AuthConfig {
                admin_key_hash: None,
                admin_header: default_admin_header(),
                request_id_header: default_request_id_header(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: default_max_concurrent_sessions(),
            max_queue_size: default_max_queue_size(),
            session_duration_minutes: default_session_duration(),
            inactivity_threshold_minutes: default_inactivity_threshold(),
            average_session_minutes: default_average_session(),
            max_estimated_wait_minutes: default_max_estimated_wait(),
            bootstrap_wait_minutes: default_bootstrap_wait(),
            gc_interval_secs: default_gc_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scheduler.max_concurrent_sessions, 10);
        assert_eq!(config.scheduler.max_queue_size, 50);
        assert_eq!(config.scheduler.inactivity_threshold_minutes, 5);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/parley");
    }

    #[test]
    fn test_scheduler_durations() {
        let config = SchedulerConfig::default();
        assert_eq!(config.session_duration(), chrono::Duration::minutes(30));
        assert_eq!(config.inactivity_threshold(), chrono::Duration::minutes(5));
        assert_eq!(config.gc_interval(), Duration::from_secs(60));
    }
}
