//! Window state and keys.
//!
//! A window is one counted budget over a fixed interval for a `(region,
//! scope)` pair. Several windows with different intervals track the same
//! traffic concurrently (e.g. 20 req/1s and 100 req/120s). Windows are
//! created lazily and destroyed only by expiry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key namespace shared by every window entry.
pub const KEY_NAMESPACE: &str = "ratelimit";

/// A rate-limit partition: the app-wide budget or one upstream method's
/// budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Shared across all outbound calls for a region.
    App,
    /// A named upstream method (e.g. "summoner", "matches").
    Method(String),
}

impl Scope {
    /// Scope segment as it appears in a store key.
    pub fn as_str(&self) -> &str {
        match self {
            Scope::App => "app",
            Scope::Method(name) => name,
        }
    }

    /// Build a scope from a key segment.
    pub fn from_segment(segment: &str) -> Self {
        if segment == "app" {
            Scope::App
        } else {
            Scope::Method(segment.to_string())
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one window: `(region, scope, interval)`.
///
/// Renders as the namespaced store key
/// `ratelimit:<region>:<scope>:<intervalSeconds>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    /// Region partition (e.g. "na1"). No state crosses regions.
    pub region: String,
    /// App or method scope.
    pub scope: Scope,
    /// Window length in seconds.
    pub interval_secs: u64,
}

impl WindowKey {
    /// Create a key for `(region, scope, interval)`.
    pub fn new(region: impl Into<String>, scope: Scope, interval_secs: u64) -> Self {
        Self {
            region: region.into(),
            scope,
            interval_secs,
        }
    }

    /// The rendered store key.
    pub fn name(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_NAMESPACE,
            self.region,
            self.scope.as_str(),
            self.interval_secs
        )
    }

    /// Key prefix covering every interval of a `(region, scope)` pair.
    pub fn scope_prefix(region: &str, scope: &Scope) -> String {
        format!("{}:{}:{}:", KEY_NAMESPACE, region, scope.as_str())
    }

    /// Parse a rendered key back into its parts.
    ///
    /// Returns `None` for keys outside the `ratelimit:` namespace or with a
    /// non-numeric interval segment.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(KEY_NAMESPACE)?.strip_prefix(':')?;
        let (head, interval) = rest.rsplit_once(':')?;
        let (region, scope) = head.split_once(':')?;
        if region.is_empty() || scope.is_empty() {
            return None;
        }
        let interval_secs = interval.parse().ok()?;
        Some(Self {
            region: region.to_string(),
            scope: Scope::from_segment(scope),
            interval_secs,
        })
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Stored counter state for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Requests consumed in the current interval.
    pub count: u64,
    /// Maximum allowed in the interval.
    pub limit: u64,
    /// Absolute expiry of this window (unix ms).
    pub reset_at: u64,
}

impl Window {
    /// Create a window.
    pub fn new(count: u64, limit: u64, reset_at: u64) -> Self {
        Self {
            count,
            limit,
            reset_at,
        }
    }

    /// Fraction of the budget consumed.
    ///
    /// A zero limit reads as fully consumed rather than dividing by zero.
    pub fn usage_ratio(&self) -> f64 {
        if self.limit == 0 {
            return 1.0;
        }
        self.count as f64 / self.limit as f64
    }

    /// Milliseconds until this window resets, saturating at zero.
    pub fn until_reset(&self, now_ms: u64) -> u64 {
        self.reset_at.saturating_sub(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name() {
        let key = WindowKey::new("na1", Scope::App, 120);
        assert_eq!(key.name(), "ratelimit:na1:app:120");

        let key = WindowKey::new("euw1", Scope::Method("summoner".into()), 10);
        assert_eq!(key.name(), "ratelimit:euw1:summoner:10");
    }

    #[test]
    fn test_key_roundtrip() {
        let key = WindowKey::new("na1", Scope::Method("match-details".into()), 600);
        let parsed = WindowKey::parse(&key.name()).unwrap();
        assert_eq!(parsed, key);

        let app = WindowKey::parse("ratelimit:kr:app:1").unwrap();
        assert_eq!(app.scope, Scope::App);
        assert_eq!(app.interval_secs, 1);
    }

    #[test]
    fn test_key_parse_rejects_garbage() {
        assert!(WindowKey::parse("cache:na1:app:1").is_none());
        assert!(WindowKey::parse("ratelimit:na1:app:soon").is_none());
        assert!(WindowKey::parse("ratelimit:na1").is_none());
    }

    #[test]
    fn test_scope_prefix() {
        assert_eq!(
            WindowKey::scope_prefix("na1", &Scope::App),
            "ratelimit:na1:app:"
        );
    }

    #[test]
    fn test_usage_ratio() {
        assert_eq!(Window::new(19, 20, 0).usage_ratio(), 0.95);
        assert_eq!(Window::new(0, 0, 0).usage_ratio(), 1.0);
    }

    #[test]
    fn test_until_reset_saturates() {
        let window = Window::new(1, 20, 5_000);
        assert_eq!(window.until_reset(4_000), 1_000);
        assert_eq!(window.until_reset(6_000), 0);
    }
}
