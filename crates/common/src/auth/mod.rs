//! Authentication utilities
//!
//! Provides:
//! - Session token generation
//! - Admin key hashing and validation
//! - Admin key extraction for privileged routes

use crate::config::AuthConfig;
use crate::errors::{AppError, Result};
use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate an unguessable session token (256 bits of entropy)
pub fn generate_session_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("st_{}", hex::encode(random_bytes))
}

/// Hash an admin key for storage/comparison
pub fn hash_admin_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Validate an admin key against a stored hash
pub fn validate_admin_key(key: &str, stored_hash: &str) -> bool {
    hash_admin_key(key) == stored_hash
}

/// Generate a new admin key (for operator bootstrap tooling)
pub fn generate_admin_key() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("ak_{}", hex::encode(random_bytes))
}

/// Extracted admin credentials for privileged handlers
#[derive(Debug, Clone)]
pub struct AdminKey {
    /// Raw key as presented by the caller
    pub key: String,

    /// Request ID for tracing
    pub request_id: String,
}

impl AdminKey {
    /// Check the presented key against the configured hash
    pub fn verify(&self, config: &AuthConfig) -> Result<()> {
        let stored_hash = config.admin_key_hash.as_deref().ok_or_else(|| {
            AppError::Forbidden {
                message: "Admin routes are not configured".to_string(),
            }
        })?;

        if validate_admin_key(&self.key, stored_hash) {
            Ok(())
        } else {
            Err(AppError::InvalidAdminKey)
        }
    }
}

impl<S> FromRequestParts<S> for AdminKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing X-Admin-Key header".to_string(),
            })?;

        Ok(AdminKey { key, request_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_token_shape() {
        let token = generate_session_token();
        assert!(token.starts_with("st_"));
        // 32 bytes hex-encoded
        assert_eq!(token.len(), 3 + 64);
    }

    #[test]
    fn test_session_tokens_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_admin_key_hash_roundtrip() {
        let key = "ak_test_12345";
        let hash = hash_admin_key(key);
        assert!(validate_admin_key(key, &hash));
        assert!(!validate_admin_key("wrong_key", &hash));
    }

    #[test]
    fn test_verify_rejects_when_unconfigured() {
        let config = AuthConfig {
            admin_key_hash: None,
            admin_header: "X-Admin-Key".to_string(),
            request_id_header: "X-Request-ID".to_string(),
        };
        let admin = AdminKey {
            key: "anything".to_string(),
            request_id: "r1".to_string(),
        };
        assert!(admin.verify(&config).is_err());
    }

    #[test]
    fn test_verify_accepts_configured_key() {
        let key = generate_admin_key();
        let config = AuthConfig {
            admin_key_hash: Some(hash_admin_key(&key)),
            admin_header: "X-Admin-Key".to_string(),
            request_id_header: "X-Request-ID".to_string(),
        };
        let admin = AdminKey {
            key,
            request_id: "r1".to_string(),
        };
        assert!(admin.verify(&config).is_ok());
    }
}
