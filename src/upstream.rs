//! Upstream HTTP interface.
//!
//! The limiter never issues HTTP requests itself. Callers bring a client
//! implementing [`UpstreamClient`]; the limiter cares only about the
//! response status and the rate-limit descriptor headers the upstream
//! attaches.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Rate-limit header names used by the upstream service.
pub mod names {
    /// App-wide limit definition, e.g. `"20:1,100:120"`.
    pub const APP_RATE_LIMIT: &str = "X-App-Rate-Limit";

    /// App-wide usage, e.g. `"1:20,13:100"`.
    pub const APP_RATE_LIMIT_COUNT: &str = "X-App-Rate-Limit-Count";

    /// Per-method limit definition.
    pub const METHOD_RATE_LIMIT: &str = "X-Method-Rate-Limit";

    /// Per-method usage.
    pub const METHOD_RATE_LIMIT_COUNT: &str = "X-Method-Rate-Limit-Count";

    /// Seconds to wait, attached to 429 responses.
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// The rate-limit descriptor headers of one upstream response.
///
/// Any subset may be absent: unauthoritative error responses often carry
/// none, in which case reconciliation is skipped and prior estimates stand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamRateLimitHeaders {
    /// App-scope limit definition string.
    pub app_limit: Option<String>,
    /// App-scope usage string.
    pub app_usage: Option<String>,
    /// Method-scope limit definition string.
    pub method_limit: Option<String>,
    /// Method-scope usage string.
    pub method_usage: Option<String>,
    /// Retry delay from a rejection response.
    pub retry_after: Option<Duration>,
}

impl UpstreamRateLimitHeaders {
    /// Extract the descriptor headers from any `(name, value)` iterator.
    ///
    /// Names match case-insensitively; later duplicates win.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut out = Self::default();
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(names::APP_RATE_LIMIT) {
                out.app_limit = Some(value.to_string());
            } else if name.eq_ignore_ascii_case(names::APP_RATE_LIMIT_COUNT) {
                out.app_usage = Some(value.to_string());
            } else if name.eq_ignore_ascii_case(names::METHOD_RATE_LIMIT) {
                out.method_limit = Some(value.to_string());
            } else if name.eq_ignore_ascii_case(names::METHOD_RATE_LIMIT_COUNT) {
                out.method_usage = Some(value.to_string());
            } else if name.eq_ignore_ascii_case(names::RETRY_AFTER) {
                out.retry_after = value.trim().parse().ok().map(Duration::from_secs);
            }
        }
        out
    }

    /// Whether no descriptor header was present at all.
    pub fn is_empty(&self) -> bool {
        self.app_limit.is_none()
            && self.app_usage.is_none()
            && self.method_limit.is_none()
            && self.method_usage.is_none()
            && self.retry_after.is_none()
    }
}

/// A completed upstream response: status code plus headers.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers as received.
    pub headers: Vec<(String, String)>,
}

impl UpstreamResponse {
    /// Create a response.
    pub fn new(status: u16, headers: Vec<(String, String)>) -> Self {
        Self { status, headers }
    }

    /// Whether the upstream itself rejected the call for rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// The rate-limit descriptor headers of this response.
    pub fn rate_limit_headers(&self) -> UpstreamRateLimitHeaders {
        UpstreamRateLimitHeaders::from_headers(
            self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}

/// Errors from the upstream transport.
///
/// A timeout is neither a confirmed success nor an authoritative failure:
/// the request may well have counted against the upstream budget even
/// though the response was lost.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// No response arrived in time.
    #[error("Upstream call timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Client abstraction for the upstream service.
///
/// Implementations resolve `(region, method)` to a concrete endpoint and
/// perform the HTTP exchange. The limiter drives the call lifecycle around
/// this single operation.
pub trait UpstreamClient: Send + Sync {
    /// Perform one call against the upstream.
    fn send(
        &self,
        region: &str,
        method: &str,
    ) -> impl Future<Output = std::result::Result<UpstreamResponse, UpstreamError>> + Send;
}
