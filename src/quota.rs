//! Window definitions used for default budget estimates.
//!
//! A `Quota` is a guessed or configured rate limit: how many requests are
//! allowed over what interval. Authoritative limits arrive later from the
//! upstream's response headers and override these.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A request budget over a fixed time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Maximum number of requests in the window.
    max_requests: u64,

    /// Time window duration.
    window: Duration,
}

impl Quota {
    /// Create a new quota with the given maximum requests and window.
    ///
    /// # Panics
    ///
    /// Panics if `max_requests` is 0 or `window` is zero duration.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        assert!(max_requests > 0, "max_requests must be greater than 0");
        assert!(!window.is_zero(), "window must be non-zero");

        Self {
            max_requests,
            window,
        }
    }

    /// Create a quota allowing `n` requests per second.
    pub fn per_second(n: u64) -> Self {
        Self::new(n, Duration::from_secs(1))
    }

    /// Create a quota allowing `n` requests over `secs` seconds.
    pub fn per_interval(n: u64, secs: u64) -> Self {
        Self::new(n, Duration::from_secs(secs))
    }

    /// Try to create a new quota, returning an error if invalid.
    pub fn try_new(max_requests: u64, window: Duration) -> Result<Self> {
        if max_requests == 0 {
            return Err(
                ConfigError::InvalidQuota("max_requests must be greater than 0".into()).into(),
            );
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidQuota("window must be non-zero".into()).into());
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Maximum requests allowed per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds.
    pub fn interval_secs(&self) -> u64 {
        self.window.as_secs()
    }
}
