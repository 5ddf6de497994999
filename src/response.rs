//! User-facing rendering of admission decisions.
//!
//! Turns a [`RateLimitStatus`] into a human-readable wait message and the
//! transport headers a proxying handler sends back to its own clients.
//! Everything here is pure: same status in, same message and headers out.

use crate::clock::Clock;
use crate::status::RateLimitStatus;

/// Response header names emitted to the limiter's own clients.
pub mod names {
    /// Seconds until the client should retry (standard HTTP header).
    pub const RETRY_AFTER: &str = "Retry-After";

    /// Whether any budget remains ("1") or the caller is blocked ("0").
    pub const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";

    /// Unix epoch seconds at which the budget clears.
    pub const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
}

/// Format a wait-time message for display to users.
///
/// Bucketed by delay magnitude: a handful of seconds gets a generic
/// message, up to a minute the exact second count, beyond that minutes
/// rounded up. Returns an empty string when the status is not limited.
pub fn format_rate_limit_message(status: &RateLimitStatus) -> String {
    if !status.limited {
        return String::new();
    }

    let retry_secs = status.retry_after_secs();

    if retry_secs <= 5 {
        "Rate limit reached. Please try again in a few seconds.".to_string()
    } else if retry_secs <= 60 {
        format!("Rate limit reached. Please try again in {retry_secs} seconds.")
    } else {
        let minutes = retry_secs.div_ceil(60);
        format!(
            "Rate limit reached. Please try again in {} minute{}.",
            minutes,
            if minutes > 1 { "s" } else { "" }
        )
    }
}

/// Builder for the response headers derived from a status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    retry_after: Option<u64>,
    remaining: bool,
    reset_at_secs: u64,
}

impl RateLimitHeaders {
    /// Derive headers from a status, stamping reset times off `clock`.
    pub fn from_status(status: &RateLimitStatus, clock: &dyn Clock) -> Self {
        let now_secs = clock.now_ms() / 1000;
        Self {
            retry_after: status.limited.then(|| status.retry_after_secs()),
            remaining: !status.limited,
            reset_at_secs: now_secs + status.retry_after_secs(),
        }
    }

    /// Convert to a vector of (name, value) pairs.
    pub fn to_vec(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(3);

        if let Some(retry_after) = self.retry_after {
            headers.push((names::RETRY_AFTER, retry_after.to_string()));
        }
        headers.push((
            names::RATE_LIMIT_REMAINING,
            if self.remaining { "1" } else { "0" }.to_string(),
        ));
        headers.push((names::RATE_LIMIT_RESET, self.reset_at_secs.to_string()));

        headers
    }
}
