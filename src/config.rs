//! Limiter configuration.
//!
//! The upstream service publishes its real limits only in response headers,
//! so until the first response arrives the limiter runs on conservative
//! guesses. Those guesses, the admission threshold, and the fallback retry
//! for header-less rejections are all supplied here once at startup rather
//! than hardcoded at call sites.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::quota::Quota;
use crate::window::Scope;

/// Default admission threshold: deny once a window is 95% consumed.
pub const DEFAULT_THRESHOLD: f64 = 0.95;

/// Default retry used for an upstream rejection that carries no
/// `Retry-After` header.
pub const DEFAULT_SYNTHETIC_RETRY: Duration = Duration::from_secs(10);

/// Configuration for a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Usage ratio at which admission denies. Below 1.0 to absorb races
    /// from in-flight concurrent calls.
    pub threshold: f64,

    /// Default app-scope window definitions used before any authoritative
    /// header has been seen.
    pub app_defaults: Vec<Quota>,

    /// Default method-scope window definitions.
    pub method_defaults: Vec<Quota>,

    /// Retry delay assumed for an upstream rejection without a
    /// `Retry-After` header.
    pub synthetic_retry: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            app_defaults: vec![Quota::per_second(20), Quota::per_interval(100, 120)],
            method_defaults: vec![Quota::per_interval(2000, 10)],
            synthetic_retry: DEFAULT_SYNTHETIC_RETRY,
        }
    }
}

impl LimiterConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the admission threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Replace the default app-scope windows.
    pub fn with_app_defaults(mut self, quotas: Vec<Quota>) -> Self {
        self.app_defaults = quotas;
        self
    }

    /// Replace the default method-scope windows.
    pub fn with_method_defaults(mut self, quotas: Vec<Quota>) -> Self {
        self.method_defaults = quotas;
        self
    }

    /// Set the fallback retry for header-less rejections.
    pub fn with_synthetic_retry(mut self, retry: Duration) -> Self {
        self.synthetic_retry = retry;
        self
    }

    /// The default window definitions for a scope.
    pub fn defaults_for(&self, scope: &Scope) -> &[Quota] {
        match scope {
            Scope::App => &self.app_defaults,
            Scope::Method(_) => &self.method_defaults,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.threshold).into());
        }
        if self.app_defaults.is_empty() {
            return Err(ConfigError::EmptyDefaults("app").into());
        }
        if self.method_defaults.is_empty() {
            return Err(ConfigError::EmptyDefaults("method").into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LimiterConfig::default();
        config.validate().unwrap();
        assert_eq!(config.threshold, 0.95);
        assert_eq!(config.app_defaults.len(), 2);
        assert_eq!(config.method_defaults.len(), 1);
        assert_eq!(config.synthetic_retry, Duration::from_secs(10));
    }

    #[test]
    fn test_defaults_for_scope() {
        let config = LimiterConfig::default();
        assert_eq!(config.defaults_for(&Scope::App).len(), 2);
        assert_eq!(
            config.defaults_for(&Scope::Method("summoner".into()))[0].max_requests(),
            2000
        );
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        assert!(LimiterConfig::default()
            .with_threshold(0.0)
            .validate()
            .is_err());
        assert!(LimiterConfig::default()
            .with_threshold(1.5)
            .validate()
            .is_err());
        assert!(LimiterConfig::default()
            .with_threshold(1.0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_defaults() {
        assert!(LimiterConfig::default()
            .with_app_defaults(vec![])
            .validate()
            .is_err());
        assert!(LimiterConfig::default()
            .with_method_defaults(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_deserializes() {
        let json = r#"{
            "threshold": 0.9,
            "app_defaults": [{"max_requests": 10, "window": {"secs": 1, "nanos": 0}}],
            "method_defaults": [{"max_requests": 500, "window": {"secs": 10, "nanos": 0}}],
            "synthetic_retry": {"secs": 5, "nanos": 0}
        }"#;
        let config: LimiterConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.threshold, 0.9);
        assert_eq!(config.app_defaults[0].max_requests(), 10);
    }
}
