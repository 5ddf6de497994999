//! Admission decision types.
//!
//! A rate-limit check produces a `RateLimitStatus`: whether the call may
//! proceed, how long to wait if not, and a snapshot of every window that
//! was consulted. Snapshots are read models only; nothing holds window
//! state beyond a single decision.

use std::time::Duration;

use serde::Serialize;

/// One window as seen at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSnapshot {
    /// Window length in seconds.
    pub interval_secs: u64,
    /// Requests consumed.
    pub count: u64,
    /// Maximum allowed.
    pub limit: u64,
    /// Absolute reset time (unix ms).
    pub reset_at: u64,
}

impl WindowSnapshot {
    /// Fraction of the budget consumed.
    pub fn usage_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 1.0;
        }
        self.count as f64 / self.limit as f64
    }
}

/// The result of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStatus {
    /// Whether the call must be held back.
    pub limited: bool,

    /// How long to wait before retrying. Only set when limited: the
    /// maximum time-to-reset across the windows that triggered denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,

    /// App-scope windows consulted, one per interval.
    pub app: Vec<WindowSnapshot>,

    /// Method-scope windows consulted.
    pub method: Vec<WindowSnapshot>,
}

impl RateLimitStatus {
    /// A permissive status: nothing observed, call may proceed.
    pub fn allowed() -> Self {
        Self {
            limited: false,
            retry_after: None,
            app: Vec::new(),
            method: Vec::new(),
        }
    }

    /// A denied status with a known retry delay and no snapshots, used
    /// when the denial comes from the upstream service itself.
    pub fn denied(retry_after: Duration) -> Self {
        Self {
            limited: true,
            retry_after: Some(retry_after),
            app: Vec::new(),
            method: Vec::new(),
        }
    }

    /// Whether the call must be held back.
    pub fn is_limited(&self) -> bool {
        self.limited
    }

    /// Retry delay in milliseconds, zero when not limited.
    pub fn retry_after_ms(&self) -> u64 {
        self.retry_after.map(|d| d.as_millis() as u64).unwrap_or(0)
    }

    /// Retry delay in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after
            .map(|d| d.as_secs_f64().ceil() as u64)
            .unwrap_or(0)
    }
}

impl Default for RateLimitStatus {
    fn default() -> Self {
        Self::allowed()
    }
}
