//! Runtime configuration for the loader

use crate::constants::{
    API_URL_ENV_VAR, COINGECKO_API_URL, DELAY_UNIT, FINALIZE_DELAY, MAX_RETRY_ATTEMPTS,
    REQUEST_DELAY_UNITS, REQUEST_TIMEOUT_SECS,
};
use std::time::Duration;

/// Settings shared by the transport, the request queue and the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Base URL of the versioned REST API, without a trailing slash
    pub api_base_url: String,
    /// Length of one backoff unit
    pub delay_unit: Duration,
    /// Units to wait before each queued request runs
    pub request_delay_units: u32,
    /// Attempts per request before giving up
    pub max_retries: u32,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Settle time between the last step and the completed state
    pub finalize_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: COINGECKO_API_URL.to_string(),
            delay_unit: DELAY_UNIT,
            request_delay_units: REQUEST_DELAY_UNITS,
            max_retries: MAX_RETRY_ATTEMPTS,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            finalize_delay: FINALIZE_DELAY,
        }
    }
}

impl LoaderConfig {
    /// Builds the default configuration, taking the base URL from
    /// `COINGECKO_API_URL` when it is set and non-empty.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                config = config.with_base_url(url);
            }
        }
        config
    }

    /// Replaces the base URL, dropping any trailing slash
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Delay applied before every queued request
    pub fn request_delay(&self) -> Duration {
        self.delay_unit * self.request_delay_units
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_constants() {
        let config = LoaderConfig::default();
        assert_eq!(config.api_base_url, "https://api.coingecko.com/api/v3");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let config = LoaderConfig::default().with_base_url("http://localhost:8080/api/");
        assert_eq!(config.api_base_url, "http://localhost:8080/api");
    }
}
