// Token options and configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HMAC signing algorithms
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    #[default]
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl JwtAlgorithm {
    pub(crate) fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            JwtAlgorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            JwtAlgorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            JwtAlgorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}

/// Configuration for issuing and verifying tokens
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenOptions {
    /// JWT signing algorithm
    #[serde(default)]
    pub algorithm: JwtAlgorithm,
    /// Token issuer (iss claim)
    pub issuer: String,
    /// Token audience (aud claim)
    pub audience: String,
    /// Lifetime of admin session tokens
    #[serde(with = "humantime_serde")]
    pub admin_token_expires_in: Duration,
    /// Lifetime of download links
    #[serde(with = "humantime_serde")]
    pub download_token_expires_in: Duration,
    /// Clock skew tolerated on `exp`, in seconds
    #[serde(default)]
    pub leeway_secs: u64,
    /// HMAC signing secret
    pub secret: String,
}

impl std::fmt::Debug for TokenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenOptions")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("admin_token_expires_in", &self.admin_token_expires_in)
            .field("download_token_expires_in", &self.download_token_expires_in)
            .field("leeway_secs", &self.leeway_secs)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenOptions {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            algorithm: JwtAlgorithm::default(),
            issuer: "larder".to_string(),
            audience: "larder-admin".to_string(),
            admin_token_expires_in: Duration::from_secs(12 * 3600),
            download_token_expires_in: Duration::from_secs(900),
            leeway_secs: 0,
            secret: secret.into(),
        }
    }

    pub fn with_download_ttl(mut self, ttl: Duration) -> Self {
        self.download_token_expires_in = ttl;
        self
    }

    pub fn with_admin_ttl(mut self, ttl: Duration) -> Self {
        self.admin_token_expires_in = ttl;
        self
    }

    /// Validate token configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.trim().is_empty() {
            return Err("JWT secret cannot be empty".to_string());
        }
        if self.secret.len() < 16 {
            return Err("JWT secret must be at least 16 bytes".to_string());
        }
        if self.issuer.is_empty() {
            return Err("JWT issuer cannot be empty".to_string());
        }
        if self.audience.is_empty() {
            return Err("JWT audience cannot be empty".to_string());
        }
        if self.download_token_expires_in.is_zero() || self.admin_token_expires_in.is_zero() {
            return Err("Token lifetimes must be greater than zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_humantime_durations() {
        let options: TokenOptions = serde_json::from_value(serde_json::json!({
            "issuer": "larder",
            "audience": "larder-admin",
            "adminTokenExpiresIn": "12h",
            "downloadTokenExpiresIn": "15m",
            "secret": "0123456789abcdef"
        }))
        .unwrap();

        assert_eq!(options.algorithm, JwtAlgorithm::HS256);
        assert_eq!(options.download_token_expires_in, Duration::from_secs(900));
        assert_eq!(options.admin_token_expires_in, Duration::from_secs(43200));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn short_secrets_are_rejected() {
        assert!(TokenOptions::new("").validate().is_err());
        assert!(TokenOptions::new("short").validate().is_err());
        assert!(TokenOptions::new("0123456789abcdef").validate().is_ok());
    }

    #[test]
    fn debug_hides_the_secret() {
        let rendered = format!("{:?}", TokenOptions::new("0123456789abcdef"));
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
