//! Client configuration: where the API lives, how long to wait for it and
//! where to keep the session token.
//!
//! Three ways to get a [`ClientConfig`], all ending in
//! [`validated`](ClientConfig::validated):
//!
//! - `ClientConfig::default()` plus struct update syntax
//! - [`ClientConfig::from_json`] for a config file
//! - [`ClientConfig::from_env`] for `PROCURA_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use procura_session::{DEFAULT_BACKGROUND_GRACE, DEFAULT_STORAGE_KEY};
use procura_transport::DEFAULT_REQUEST_TIMEOUT;
use serde::Deserialize;
use tracing::warn;

/// Base URL of the service, without the `/api` suffix.
pub const ENV_API_URL: &str = "PROCURA_API_URL";
/// Per-request timeout in whole seconds.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PROCURA_REQUEST_TIMEOUT_SECS";
/// Background grace period in whole seconds.
pub const ENV_GRACE_SECS: &str = "PROCURA_GRACE_SECS";
/// Directory for the file-backed credential store.
pub const ENV_STORAGE_DIR: &str = "PROCURA_STORAGE_DIR";

/// Errors from loading or validating a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("api_url must not be empty")]
    MissingApiUrl,

    #[error("{name} has an invalid value {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything needed to build a [`ProcuraClient`](crate::ProcuraClient).
///
/// Durations are written as whole seconds in JSON:
///
/// ```rust
/// use procura::ClientConfig;
///
/// let config = ClientConfig::from_json(
///     r#"{ "api_url": "https://manuales.example.org/", "background_grace": 60 }"#,
/// )?
/// .validated()?;
///
/// assert_eq!(config.api_url, "https://manuales.example.org");
/// assert_eq!(config.background_grace.as_secs(), 60);
/// # Ok::<(), procura::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service root. Default: `http://localhost:3000`.
    pub api_url: String,

    /// Default: 30 seconds.
    #[serde(with = "seconds")]
    pub request_timeout: Duration,

    /// Default: 15 minutes.
    #[serde(with = "seconds")]
    pub background_grace: Duration,

    /// Where to persist the token. `None` keeps it in memory only, so the
    /// session does not survive a restart.
    pub storage_dir: Option<PathBuf>,

    /// Default: `"userToken"`.
    pub storage_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            background_grace: DEFAULT_BACKGROUND_GRACE,
            storage_dir: None,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl ClientConfig {
    /// Parses a JSON config. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by whichever `PROCURA_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_URL) {
            config.api_url = url;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout = parse_secs(ENV_REQUEST_TIMEOUT_SECS, raw)?;
        }
        if let Some(raw) = lookup(ENV_GRACE_SECS) {
            config.background_grace = parse_secs(ENV_GRACE_SECS, raw)?;
        }
        if let Some(dir) = lookup(ENV_STORAGE_DIR).filter(|d| !d.trim().is_empty()) {
            config.storage_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    /// Normalizes the config so it is safe to use.
    ///
    /// - `api_url` is trimmed and loses any trailing `/`; empty is an error.
    /// - A zero `request_timeout` would fail every call, so it falls back
    ///   to the default.
    /// - A zero `background_grace` is kept: it logs out as soon as the app
    ///   leaves the foreground.
    /// - An empty `storage_key` falls back to the default.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.api_url = self.api_url.trim().trim_end_matches('/').to_string();
        if self.api_url.is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if self.request_timeout.is_zero() {
            warn!(
                default_secs = DEFAULT_REQUEST_TIMEOUT.as_secs(),
                "request_timeout is zero; using the default"
            );
            self.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }
        if self.storage_key.trim().is_empty() {
            self.storage_key = DEFAULT_STORAGE_KEY.to_string();
        }
        Ok(self)
    }
}

fn parse_secs(name: &'static str, raw: String) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidValue { name, value: raw })
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.background_grace, Duration::from_secs(900));
        assert_eq!(config.storage_key, "userToken");
        assert!(config.storage_dir.is_none());
    }

    #[test]
    fn test_from_lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(env(&[
            (ENV_API_URL, "https://api.example.org"),
            (ENV_REQUEST_TIMEOUT_SECS, "5"),
            (ENV_GRACE_SECS, " 120 "),
            (ENV_STORAGE_DIR, "/var/lib/procura"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://api.example.org");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.background_grace, Duration::from_secs(120));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/lib/procura")));
    }

    #[test]
    fn test_from_lookup_empty_keeps_defaults() {
        let config = ClientConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_from_lookup_invalid_number_names_variable() {
        let err = ClientConfig::from_lookup(env(&[(ENV_GRACE_SECS, "15m")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: ENV_GRACE_SECS, .. }
        ));
        assert!(err.to_string().contains("15m"));
    }

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let config =
            ClientConfig::from_json(r#"{ "request_timeout": 10 }"#).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.api_url, "http://localhost:3000");
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let err = ClientConfig::from_json(r#"{ "background_grace": "soon" }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_validated_trims_url() {
        let config = ClientConfig {
            api_url: " https://api.example.org// ".into(),
            ..ClientConfig::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.api_url, "https://api.example.org");
    }

    #[test]
    fn test_validated_rejects_empty_url() {
        let result = ClientConfig {
            api_url: "/".into(),
            ..ClientConfig::default()
        }
        .validated();
        assert!(matches!(result, Err(ConfigError::MissingApiUrl)));
    }

    #[test]
    fn test_validated_replaces_zero_timeout_and_blank_key() {
        let config = ClientConfig {
            request_timeout: Duration::ZERO,
            background_grace: Duration::ZERO,
            storage_key: " ".into(),
            ..ClientConfig::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.background_grace, Duration::ZERO);
        assert_eq!(config.storage_key, "userToken");
    }
}
