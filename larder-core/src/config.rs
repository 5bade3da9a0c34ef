//! # Configuration
//!
//! Larder keeps configuration in a flat string key/value store. Keys are
//! dotted (`uploads.dir`, `cloudinary.api_key`) and values are parsed on read
//! through a [`LarderConfigSnapshot`].
//!
//! ## Environment overrides
//! ```rust
//! use larder_core::LarderConfig;
//!
//! std::env::set_var("LARDER_DOC__UPLOADS__DIR", "/srv/uploads");
//! let config = LarderConfig::from_env("LARDER_DOC__");
//! assert_eq!(config.get("uploads.dir"), Some("/srv/uploads"));
//! ```

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct LarderConfig {
    values: HashMap<String, String>,
}

impl LarderConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Load every environment variable that starts with `prefix`.
    ///
    /// `LARDER__LIMITS__CV__MAX_BYTES` with prefix `LARDER__` becomes
    /// `limits.cv.max_bytes`. Single underscores are kept.
    pub fn from_env(prefix: &str) -> Self {
        let mut config = Self::new();
        config.merge_env(prefix);
        config
    }

    /// Merge matching environment variables over the current values.
    pub fn merge_env(&mut self, prefix: &str) {
        for (key, value) in std::env::vars() {
            if let Some(stripped) = key.strip_prefix(prefix) {
                self.set(normalize_env_key(stripped), value);
            }
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only if nothing has been set for it yet.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn snapshot(&self) -> LarderConfigSnapshot {
        LarderConfigSnapshot::new(self.values.clone())
    }
}

fn normalize_env_key(raw: &str) -> String {
    raw.to_lowercase().replace("__", ".")
}

#[derive(Debug, Clone, Default)]
pub struct LarderConfigSnapshot {
    map: HashMap<String, String>,
}

impl LarderConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|s| s.to_string())
    }

    /// `Ok(None)` when unset; an error when set but not a number.
    pub fn get_usize(&self, key: &str) -> anyhow::Result<Option<usize>> {
        self.parse(key)
    }

    /// `Ok(None)` when unset; an error when set but not a number.
    pub fn get_u64(&self, key: &str) -> anyhow::Result<Option<u64>> {
        self.parse(key)
    }

    fn parse<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.trim().parse::<T>().map_err(|e| {
                    anyhow::anyhow!("configuration key '{key}' has invalid value '{v}': {e}")
                })
            })
            .transpose()
    }

    /// Like [`get_string`](Self::get_string) but reports the missing key.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.get_string(key)
            .ok_or_else(|| anyhow::anyhow!("missing required configuration key '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_are_dotted_and_lowercased() {
        assert_eq!(normalize_env_key("UPLOADS__DIR"), "uploads.dir");
        assert_eq!(
            normalize_env_key("LIMITS__HERO_BACKGROUND__MAX_BYTES"),
            "limits.hero_background.max_bytes"
        );
    }

    #[test]
    fn set_default_does_not_override() {
        let mut config = LarderConfig::new();
        config.set("http.port", "8080");
        config.set_default("http.port", "3030");
        config.set_default("http.host", "127.0.0.1");

        let snap = config.snapshot();
        assert_eq!(snap.get_usize("http.port").unwrap(), Some(8080));
        assert_eq!(snap.get("http.host"), Some("127.0.0.1"));
    }

    #[test]
    fn blank_values_read_as_missing() {
        let mut config = LarderConfig::new();
        config.set("auth.jwt_secret", "   ");
        let snap = config.snapshot();
        assert!(snap.get("auth.jwt_secret").is_none());
        assert!(snap.require("auth.jwt_secret").is_err());
    }

    #[test]
    fn malformed_numbers_are_errors_not_defaults() {
        let mut config = LarderConfig::new();
        config.set("limits.cv.max_bytes", "10MB");
        let snap = config.snapshot();

        let err = snap.get_u64("limits.cv.max_bytes").unwrap_err();
        assert!(err.to_string().contains("limits.cv.max_bytes"));
        assert!(err.to_string().contains("10MB"));
        assert_eq!(snap.get_u64("limits.logo.max_bytes").unwrap(), None);
    }
}
