//! Budget estimator.
//!
//! The upstream service has no "check without consuming" endpoint, so the
//! limiter tracks its own usage optimistically before each round trip and
//! reconciles with the truth afterwards. Preflight records bump counters
//! under conservative default definitions; authoritative records overwrite
//! whatever was guessed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::clock::Clock;
use crate::config::LimiterConfig;
use crate::descriptor::WindowReading;
use crate::error::Result;
use crate::store::WindowStore;
use crate::window::{Scope, Window, WindowKey};

/// Writes usage estimates and authoritative readings into the window store.
pub struct BudgetEstimator<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: Arc<LimiterConfig>,
}

impl<S: WindowStore> BudgetEstimator<S> {
    /// Create an estimator against the given store.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: Arc<LimiterConfig>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Record one outbound call before it is made.
    ///
    /// Bumps every default window for the region's app scope and the
    /// method's scope: initialized at `count = 1` when unobserved,
    /// incremented otherwise. An entry already holding authoritative
    /// values keeps its limit and reset; only the count moves. Preflight
    /// does not self-gate; the count may exceed the default limit.
    pub async fn record_preflight(&self, region: &str, method: &str) -> Result<()> {
        self.record_scope(region, &Scope::App).await?;
        self.record_scope(region, &Scope::Method(method.to_string()))
            .await
    }

    async fn record_scope(&self, region: &str, scope: &Scope) -> Result<()> {
        let now = self.clock.now_ms();

        for quota in self.config.defaults_for(scope) {
            let key = WindowKey::new(region, scope.clone(), quota.interval_secs());
            let init = Window::new(
                1,
                quota.max_requests(),
                now + quota.window().as_millis() as u64,
            );
            let count = self.store.increment(&key, 1, init, quota.window()).await?;
            trace!(key = %key, count, "preflight recorded");
        }
        Ok(())
    }

    /// Overwrite `(region, scope, interval)` entries with authoritative
    /// readings parsed from upstream headers.
    ///
    /// Authoritative data always wins over guesses: each window's count
    /// and limit are set exactly, with `reset_at` and the store expiry one
    /// interval out from now.
    pub async fn record_authoritative(
        &self,
        region: &str,
        scope: &Scope,
        readings: &[WindowReading],
    ) -> Result<()> {
        let now = self.clock.now_ms();

        for reading in readings {
            let key = WindowKey::new(region, scope.clone(), reading.interval_secs);
            let interval = Duration::from_secs(reading.interval_secs);
            let window = Window::new(
                reading.count,
                reading.limit,
                now + interval.as_millis() as u64,
            );
            self.store.put(&key, window, interval).await?;
            trace!(
                key = %key,
                count = reading.count,
                limit = reading.limit,
                "authoritative window stored"
            );
        }
        Ok(())
    }

    /// Record an upstream-confirmed rejection.
    ///
    /// A 429 carries no window data, so the method's estimate is replaced
    /// by a synthetic saturated window that clears when the upstream's
    /// retry delay elapses. Without a `Retry-After` hint the configured
    /// synthetic retry applies.
    pub async fn record_rejection(
        &self,
        region: &str,
        method: &str,
        retry_after: Option<Duration>,
    ) -> Result<()> {
        let retry = retry_after.unwrap_or(self.config.synthetic_retry);
        let interval_secs = retry.as_secs_f64().ceil().max(1.0) as u64;
        let now = self.clock.now_ms();

        let key = WindowKey::new(
            region,
            Scope::Method(method.to_string()),
            interval_secs,
        );
        let window = Window::new(1, 1, now + retry.as_millis() as u64);
        self.store.put(&key, window, retry).await?;

        debug!(region, method, retry_ms = retry.as_millis() as u64, "upstream rejection recorded");
        Ok(())
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn setup() -> (BudgetEstimator<MemoryStore>, Arc<MemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let estimator = BudgetEstimator::new(
            store.clone(),
            clock.clone(),
            Arc::new(LimiterConfig::default()),
        );
        (estimator, store, clock)
    }

    #[tokio::test]
    async fn test_preflight_initializes_all_default_windows() {
        let (estimator, store, _) = setup();

        estimator.record_preflight("na1", "summoner").await.unwrap();

        let app = store.scan("na1", &Scope::App).await.unwrap();
        assert_eq!(app.len(), 2);
        for (_, window) in &app {
            assert_eq!(window.count, 1);
        }

        let method = store
            .scan("na1", &Scope::Method("summoner".into()))
            .await
            .unwrap();
        assert_eq!(method.len(), 1);
        assert_eq!(method[0].1.limit, 2000);
    }

    #[tokio::test]
    async fn test_preflight_accumulates() {
        let (estimator, store, _) = setup();

        for _ in 0..5 {
            estimator.record_preflight("na1", "summoner").await.unwrap();
        }

        let key = WindowKey::new("na1", Scope::App, 1);
        assert_eq!(store.get(&key).await.unwrap().unwrap().count, 5);
    }

    #[tokio::test]
    async fn test_preflight_does_not_self_gate() {
        let (estimator, store, _) = setup();

        // Way past the 20/1s default; preflight keeps counting anyway.
        for _ in 0..25 {
            estimator.record_preflight("na1", "summoner").await.unwrap();
        }

        let key = WindowKey::new("na1", Scope::App, 1);
        assert_eq!(store.get(&key).await.unwrap().unwrap().count, 25);
    }

    #[tokio::test]
    async fn test_authoritative_overwrites_preflight() {
        let (estimator, store, _) = setup();

        for _ in 0..7 {
            estimator.record_preflight("na1", "summoner").await.unwrap();
        }

        let readings = vec![WindowReading {
            limit: 100,
            interval_secs: 120,
            count: 50,
        }];
        estimator
            .record_authoritative("na1", &Scope::App, &readings)
            .await
            .unwrap();

        // Exactly the authoritative value, independent of the prior 7.
        let key = WindowKey::new("na1", Scope::App, 120);
        let window = store.get(&key).await.unwrap().unwrap();
        assert_eq!(window.count, 50);
        assert_eq!(window.limit, 100);
        assert_eq!(window.reset_at, 120_000);
    }

    #[tokio::test]
    async fn test_preflight_after_authoritative_increments() {
        let (estimator, store, _) = setup();

        let readings = vec![
            WindowReading {
                limit: 20,
                interval_secs: 1,
                count: 3,
            },
            WindowReading {
                limit: 100,
                interval_secs: 120,
                count: 40,
            },
        ];
        estimator
            .record_authoritative("na1", &Scope::App, &readings)
            .await
            .unwrap();

        estimator.record_preflight("na1", "summoner").await.unwrap();

        let window = store
            .get(&WindowKey::new("na1", Scope::App, 120))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(window.count, 41);
        // Limit and reset survive the preflight.
        assert_eq!(window.limit, 100);
        assert_eq!(window.reset_at, 120_000);
    }

    #[tokio::test]
    async fn test_rejection_writes_saturated_window() {
        let (estimator, store, _) = setup();

        estimator
            .record_rejection("na1", "matches", Some(Duration::from_secs(30)))
            .await
            .unwrap();

        let key = WindowKey::new("na1", Scope::Method("matches".into()), 30);
        let window = store.get(&key).await.unwrap().unwrap();
        assert_eq!(window.count, window.limit);
        assert_eq!(window.reset_at, 30_000);
    }

    #[tokio::test]
    async fn test_rejection_without_hint_uses_synthetic_retry() {
        let (estimator, store, _) = setup();

        estimator.record_rejection("na1", "matches", None).await.unwrap();

        let key = WindowKey::new("na1", Scope::Method("matches".into()), 10);
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_regions_are_partitioned() {
        let (estimator, store, _) = setup();

        estimator.record_preflight("na1", "summoner").await.unwrap();

        assert!(store.scan("euw1", &Scope::App).await.unwrap().is_empty());
    }
}
