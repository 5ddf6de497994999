//! Admission check.
//!
//! Before an outbound call is made, every window tracking that call path is
//! consulted: the region's app-scope windows and the method's own windows,
//! across all intervals. Any window at or above the configured usage
//! threshold denies the call. The check is read-only; recording usage is
//! the estimator's job.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::status::{RateLimitStatus, WindowSnapshot};
use crate::store::WindowStore;
use crate::window::{Scope, Window, WindowKey};

/// Read-only gate deciding whether an outbound call may proceed.
pub struct AdmissionCheck<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    threshold: f64,
}

impl<S: WindowStore> AdmissionCheck<S> {
    /// Create a check against the given store.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, threshold: f64) -> Self {
        Self {
            store,
            clock,
            threshold,
        }
    }

    /// Decide whether a call for `(region, method)` may proceed.
    ///
    /// The call is admitted only if ALL applicable windows are below the
    /// threshold. An unobserved scope (no windows at all) is presumed safe.
    /// On denial the retry delay is the maximum time-to-reset across the
    /// offending windows, since admission requires every window clear.
    pub async fn check(&self, region: &str, method: &str) -> Result<RateLimitStatus> {
        let now = self.clock.now_ms();
        let scope = Scope::Method(method.to_string());

        let app_windows = self.store.scan(region, &Scope::App).await?;
        let method_windows = self.store.scan(region, &scope).await?;

        let mut limited = false;
        let mut max_retry_ms = 0u64;

        let mut fold = |windows: Vec<(WindowKey, Window)>| -> Vec<WindowSnapshot> {
            let mut snapshots = Vec::with_capacity(windows.len());
            for (key, window) in windows {
                if window.usage_ratio() >= self.threshold {
                    limited = true;
                    max_retry_ms = max_retry_ms.max(window.until_reset(now));
                }
                snapshots.push(WindowSnapshot {
                    interval_secs: key.interval_secs,
                    count: window.count,
                    limit: window.limit,
                    reset_at: window.reset_at,
                });
            }
            snapshots
        };

        let app = fold(app_windows);
        let method_snapshots = fold(method_windows);

        let status = RateLimitStatus {
            limited,
            retry_after: limited.then(|| std::time::Duration::from_millis(max_retry_ms)),
            app,
            method: method_snapshots,
        };

        if status.limited {
            debug!(
                region,
                method,
                retry_after_ms = status.retry_after_ms(),
                "admission denied"
            );
        }

        Ok(status)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        (store, clock)
    }

    #[tokio::test]
    async fn test_unobserved_scope_allows() {
        let (store, clock) = setup();
        let check = AdmissionCheck::new(store, clock, 0.95);

        let status = check.check("na1", "summoner").await.unwrap();
        assert!(!status.is_limited());
        assert!(status.app.is_empty());
        assert!(status.method.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_allows() {
        let (store, clock) = setup();

        store
            .put(
                &WindowKey::new("na1", Scope::App, 1),
                Window::new(10, 20, 1_000),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let check = AdmissionCheck::new(store, clock, 0.95);
        let status = check.check("na1", "summoner").await.unwrap();
        assert!(!status.is_limited());
        assert_eq!(status.app.len(), 1);
        assert_eq!(status.app[0].count, 10);
    }

    #[tokio::test]
    async fn test_at_threshold_denies() {
        let (store, clock) = setup();

        // 19/20 is exactly 95%.
        store
            .put(
                &WindowKey::new("na1", Scope::App, 1),
                Window::new(19, 20, 1_000),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let check = AdmissionCheck::new(store, clock, 0.95);
        let status = check.check("na1", "summoner").await.unwrap();
        assert!(status.is_limited());
        assert_eq!(status.retry_after, Some(Duration::from_millis(1_000)));
    }

    #[tokio::test]
    async fn test_method_window_alone_denies() {
        let (store, clock) = setup();

        store
            .put(
                &WindowKey::new("na1", Scope::Method("matches".into()), 10),
                Window::new(2000, 2000, 10_000),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let check = AdmissionCheck::new(store.clone(), clock, 0.95);

        let status = check.check("na1", "matches").await.unwrap();
        assert!(status.is_limited());

        // A different method is unaffected.
        let status = check.check("na1", "summoner").await.unwrap();
        assert!(!status.is_limited());
    }

    #[tokio::test]
    async fn test_retry_is_max_across_denying_windows() {
        let (store, clock) = setup();

        // Both windows deny; the slower reset wins. A third, healthy
        // window must not contribute.
        store
            .put(
                &WindowKey::new("na1", Scope::App, 1),
                Window::new(20, 20, 1_000),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        store
            .put(
                &WindowKey::new("na1", Scope::App, 120),
                Window::new(99, 100, 45_000),
                Duration::from_secs(120),
            )
            .await
            .unwrap();
        store
            .put(
                &WindowKey::new("na1", Scope::Method("summoner".into()), 10),
                Window::new(1, 2000, 90_000),
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let check = AdmissionCheck::new(store, clock, 0.95);
        let status = check.check("na1", "summoner").await.unwrap();
        assert!(status.is_limited());
        assert_eq!(status.retry_after, Some(Duration::from_millis(45_000)));
        assert_eq!(status.app.len(), 2);
        assert_eq!(status.method.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_accounts_for_elapsed_time() {
        let (store, clock) = setup();

        store
            .put(
                &WindowKey::new("na1", Scope::App, 120),
                Window::new(100, 100, 120_000),
                Duration::from_secs(120),
            )
            .await
            .unwrap();

        clock.advance(Duration::from_secs(30));
        let check = AdmissionCheck::new(store, clock, 0.95);
        let status = check.check("na1", "summoner").await.unwrap();
        assert_eq!(status.retry_after, Some(Duration::from_millis(90_000)));
    }
}
