//! Window store trait and implementations.
//!
//! This module defines the `WindowStore` trait that all counter backends
//! must implement, along with built-in implementations for in-memory and
//! Redis storage. The store exclusively owns window state; the estimator
//! and admission check only read and write through it.

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};

use std::future::Future;
use std::time::Duration;

use crate::error::Result;
use crate::window::{Scope, Window, WindowKey};

/// Counter backend for rate-limit windows.
///
/// All operations are async to support both local and distributed backends.
/// Implementations must be thread-safe (`Send + Sync`) and must guarantee
/// two properties the limiter's correctness rests on:
///
/// - `increment` is an atomic increment-and-read with conditional
///   initialization, so concurrent preflight records never lose an update
///   and never clobber an existing entry's limit or reset time;
/// - an expired window reads as absent, never as a stale value.
pub trait WindowStore: Send + Sync + 'static {
    /// Get a window by key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    fn get(&self, key: &WindowKey) -> impl Future<Output = Result<Option<Window>>> + Send;

    /// Store a window with a TTL, overwriting any existing entry.
    fn put(
        &self,
        key: &WindowKey,
        window: Window,
        ttl: Duration,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically add `delta` to a window's count, initializing the entry
    /// from `init` if it is absent or expired.
    ///
    /// On an existing entry only the count changes; `limit` and `reset_at`
    /// keep whatever a previous (possibly authoritative) write stored.
    /// Returns the count AFTER incrementing.
    fn increment(
        &self,
        key: &WindowKey,
        delta: u64,
        init: Window,
        ttl: Duration,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// All live windows for a `(region, scope)` pair, one per interval.
    fn scan(
        &self,
        region: &str,
        scope: &Scope,
    ) -> impl Future<Output = Result<Vec<(WindowKey, Window)>>> + Send;

    /// Delete a window.
    ///
    /// Returns success even if the key didn't exist.
    fn remove(&self, key: &WindowKey) -> impl Future<Output = Result<()>> + Send;
}

impl<S: WindowStore + ?Sized> WindowStore for std::sync::Arc<S> {
    async fn get(&self, key: &WindowKey) -> Result<Option<Window>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &WindowKey, window: Window, ttl: Duration) -> Result<()> {
        (**self).put(key, window, ttl).await
    }

    async fn increment(
        &self,
        key: &WindowKey,
        delta: u64,
        init: Window,
        ttl: Duration,
    ) -> Result<u64> {
        (**self).increment(key, delta, init, ttl).await
    }

    async fn scan(&self, region: &str, scope: &Scope) -> Result<Vec<(WindowKey, Window)>> {
        (**self).scan(region, scope).await
    }

    async fn remove(&self, key: &WindowKey) -> Result<()> {
        (**self).remove(key).await
    }
}
