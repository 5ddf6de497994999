//! In-memory window store.
//!
//! Uses `DashMap` for thread-safe concurrent access. Expired entries read
//! as absent immediately; the map itself is cleaned by an opportunistic
//! sweep every few thousand operations, plus an optional background
//! sweeper task for deployments with long idle stretches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::WindowStore;
use crate::window::{Scope, Window, WindowKey};

/// Operations between opportunistic sweeps of expired entries.
const SWEEP_EVERY_OPS: u64 = 4096;

#[derive(Debug, Clone)]
struct StoredWindow {
    window: Window,
    expires_at: u64,
}

/// In-memory window store backed by `DashMap`.
///
/// # Example
///
/// ```ignore
/// use upstream_ratelimit::MemoryStore;
///
/// let store = MemoryStore::new();
///
/// // With a background sweeper, for long-lived processes:
/// let store = MemoryStore::new().with_sweeper(Duration::from_secs(60));
/// ```
pub struct MemoryStore {
    data: Arc<DashMap<String, StoredWindow>>,
    clock: Arc<dyn Clock>,
    op_count: AtomicU64,
    sweep_lock: Mutex<()>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.data.len())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new store reading time from the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            clock,
            op_count: AtomicU64::new(0),
            sweep_lock: Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Start a background task sweeping expired entries every `interval`.
    ///
    /// Must be called from within a tokio runtime. The task stops when the
    /// store is dropped.
    pub fn with_sweeper(self, interval: Duration) -> Self {
        let data = self.data.clone();
        let clock = self.clock.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        sweep(&data, clock.now_ms());
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        self
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.data.clear();
    }

    fn maybe_sweep(&self) {
        let count = self.op_count.fetch_add(1, Ordering::Relaxed);
        if count % SWEEP_EVERY_OPS == 0 && count > 0 {
            // Non-blocking: a concurrent sweep is already doing the work.
            if let Some(_guard) = self.sweep_lock.try_lock() {
                sweep(&self.data, self.clock.now_ms());
            }
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

fn sweep(data: &DashMap<String, StoredWindow>, now: u64) {
    let before = data.len();
    data.retain(|_, stored| stored.expires_at > now);
    // Concurrent inserts can land mid-retain; saturate rather than trust
    // the two reads to be consistent.
    let removed = before.saturating_sub(data.len());
    if removed > 0 {
        trace!(removed, "swept expired windows");
    }
}

impl WindowStore for MemoryStore {
    async fn get(&self, key: &WindowKey) -> Result<Option<Window>> {
        self.maybe_sweep();

        let now = self.clock.now_ms();
        if let Some(stored) = self.data.get(&key.name()) {
            if stored.expires_at > now {
                return Ok(Some(stored.window.clone()));
            }
            drop(stored);
            self.data.remove(&key.name());
        }
        Ok(None)
    }

    async fn put(&self, key: &WindowKey, window: Window, ttl: Duration) -> Result<()> {
        self.maybe_sweep();

        let expires_at = self.clock.now_ms() + ttl.as_millis() as u64;
        self.data
            .insert(key.name(), StoredWindow { window, expires_at });
        Ok(())
    }

    async fn increment(
        &self,
        key: &WindowKey,
        delta: u64,
        init: Window,
        ttl: Duration,
    ) -> Result<u64> {
        self.maybe_sweep();

        let now = self.clock.now_ms();
        let expires_at = now + ttl.as_millis() as u64;

        let count = self
            .data
            .entry(key.name())
            .and_modify(|stored| {
                if stored.expires_at <= now {
                    // Expired entries restart from the init value.
                    stored.window = init.clone();
                    stored.window.count = delta;
                    stored.expires_at = expires_at;
                } else {
                    stored.window.count += delta;
                }
            })
            .or_insert_with(|| {
                let mut window = init.clone();
                window.count = delta;
                StoredWindow { window, expires_at }
            })
            .window
            .count;

        Ok(count)
    }

    async fn scan(&self, region: &str, scope: &Scope) -> Result<Vec<(WindowKey, Window)>> {
        self.maybe_sweep();

        let now = self.clock.now_ms();
        let prefix = WindowKey::scope_prefix(region, scope);

        let mut windows = Vec::new();
        for entry in self.data.iter() {
            if entry.value().expires_at <= now || !entry.key().starts_with(&prefix) {
                continue;
            }
            if let Some(key) = WindowKey::parse(entry.key()) {
                windows.push((key, entry.value().window.clone()));
            }
        }
        Ok(windows)
    }

    async fn remove(&self, key: &WindowKey) -> Result<()> {
        self.data.remove(&key.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn key(region: &str, scope: Scope, interval: u64) -> WindowKey {
        WindowKey::new(region, scope, interval)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let k = key("na1", Scope::App, 120);

        let window = Window::new(5, 100, 99_000);
        store.put(&k, window.clone(), Duration::from_secs(120)).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Some(window));
    }

    #[tokio::test]
    async fn test_expired_reads_as_absent() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::with_clock(clock.clone());
        let k = key("na1", Scope::App, 1);

        store
            .put(&k, Window::new(1, 20, 2_000), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(store.get(&k).await.unwrap().is_some());

        clock.advance(Duration::from_millis(1_001));
        assert!(store.get(&k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_initializes_then_adds() {
        let store = MemoryStore::new();
        let k = key("na1", Scope::Method("summoner".into()), 10);
        let init = Window::new(1, 2000, 11_000);

        let count = store
            .increment(&k, 1, init.clone(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let count = store
            .increment(&k, 1, init, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_increment_preserves_authoritative_fields() {
        let store = MemoryStore::new();
        let k = key("na1", Scope::App, 120);

        // Authoritative write: 50/100, resets at t=121s.
        store
            .put(&k, Window::new(50, 100, 121_000), Duration::from_secs(120))
            .await
            .unwrap();

        // A later preflight must bump the count, not reset to defaults.
        let defaults = Window::new(1, 999, 500_000);
        let count = store
            .increment(&k, 1, defaults, Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(count, 51);

        let window = store.get(&k).await.unwrap().unwrap();
        assert_eq!(window.limit, 100);
        assert_eq!(window.reset_at, 121_000);
    }

    #[tokio::test]
    async fn test_increment_restarts_expired_window() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());
        let k = key("na1", Scope::App, 1);

        store
            .increment(&k, 1, Window::new(1, 20, 1_000), Duration::from_secs(1))
            .await
            .unwrap();

        clock.advance(Duration::from_millis(1_500));
        let count = store
            .increment(&k, 1, Window::new(1, 20, 2_500), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_scan_filters_scope_and_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::with_clock(clock.clone());

        let app1 = key("na1", Scope::App, 1);
        let app120 = key("na1", Scope::App, 120);
        let method = key("na1", Scope::Method("summoner".into()), 10);
        let other_region = key("euw1", Scope::App, 1);

        for (k, ttl) in [(&app1, 1), (&app120, 120), (&method, 10), (&other_region, 1)] {
            store
                .put(k, Window::new(1, 20, ttl * 1_000), Duration::from_secs(ttl))
                .await
                .unwrap();
        }

        let mut found = store.scan("na1", &Scope::App).await.unwrap();
        found.sort_by_key(|(k, _)| k.interval_secs);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, app1);
        assert_eq!(found[1].0, app120);

        // After the 1s window expires only the 120s one remains.
        clock.advance(Duration::from_millis(1_001));
        let found = store.scan("na1", &Scope::App).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, app120);
    }

    #[tokio::test]
    async fn test_concurrent_increments_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let k = key("na1", Scope::App, 120);
        let init = Window::new(1, 100, u64::MAX);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let k = k.clone();
            let init = init.clone();
            handles.push(tokio::spawn(async move {
                store.increment(&k, 1, init, Duration::from_secs(120)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get(&k).await.unwrap().unwrap().count, 32);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        let k = key("na1", Scope::App, 1);

        store
            .put(&k, Window::new(1, 20, 1_000), Duration::from_secs(60))
            .await
            .unwrap();
        store.remove(&k).await.unwrap();
        assert!(store.get(&k).await.unwrap().is_none());

        // Removing a missing key is fine.
        store.remove(&k).await.unwrap();
    }
}
