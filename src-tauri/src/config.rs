//! Configuration Module
//!
//! Backend location and request limits, read from the environment.

use std::time::Duration;

use tracing::debug;

/// Environment variable naming the backend base URL.
pub const API_URL_VAR: &str = "GROWTH_TRACKER_API_URL";

/// Environment variable overriding the per-request timeout, in seconds.
pub const TIMEOUT_VAR: &str = "GROWTH_TRACKER_TIMEOUT_SECS";

const DEFAULT_API_URL: &str = "http://localhost:4000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Absolute http(s) URL without a trailing slash.
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl Config {
    /// Build a config with the default timeout.
    pub fn new(api_base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: normalize_base_url(api_base_url)?,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Read the config from the process environment.
    ///
    /// The base URL falls back to the value captured when the app was built,
    /// so release bundles work without a runtime environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| option_env!("GROWTH_TRACKER_API_URL").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
                if secs == 0 {
                    return Err(ConfigError::InvalidTimeout(raw));
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let config = Self {
            api_base_url: normalize_base_url(&api_base_url)?,
            request_timeout,
        };
        debug!("Loaded config: {:?}", config);
        Ok(config)
    }

    /// Replace the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| ConfigError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(ConfigError::InvalidBaseUrl(format!(
            "{trimmed}: unsupported scheme {other}"
        ))),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Invalid request timeout: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_reads_base_url_and_trims_trailing_slash() {
        let config =
            Config::from_lookup(lookup(&[(API_URL_VAR, "https://api.example.com/")])).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_custom_timeout() {
        let config = Config::from_lookup(lookup(&[
            (API_URL_VAR, "http://10.0.2.2:4000"),
            (TIMEOUT_VAR, "5"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_timeout() {
        let err = Config::from_lookup(lookup(&[(TIMEOUT_VAR, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));

        let err = Config::from_lookup(lookup(&[(TIMEOUT_VAR, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            Config::new("ftp://files.example.com"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            Config::new("not a url"),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }
}
