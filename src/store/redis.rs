//! Redis window store for multi-process deployments.
//!
//! Each window is a Redis hash (`count`, `limit`, `reset_at`) under its
//! rendered key name, expired by Redis itself. Counts are bumped with
//! `HINCRBY`; `HSETNX` and `EXPIRE NX` initialize the remaining fields only
//! when the entry is new, so concurrent preflight records cannot clobber an
//! authoritative limit.

use std::collections::HashMap;
use std::time::Duration;

use deadpool_redis::{
    redis::{cmd, AsyncCommands},
    Config, Connection, Pool, Runtime,
};
use tracing::trace;

use crate::error::{ConnectionError, Result, StorageError};
use crate::store::WindowStore;
use crate::window::{Scope, Window, WindowKey};

const FIELD_COUNT: &str = "count";
const FIELD_LIMIT: &str = "limit";
const FIELD_RESET_AT: &str = "reset_at";

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
    /// Connection timeout
    pub connection_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl RedisConfig {
    /// Create a new Redis configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }
}

/// Redis-backed window store.
///
/// # Example
///
/// ```ignore
/// use upstream_ratelimit::store::{RedisConfig, RedisStore};
///
/// let config = RedisConfig::new("redis://localhost:6379").with_pool_size(20);
/// let store = RedisStore::new(config).await?;
/// ```
pub struct RedisStore {
    pool: Pool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish()
    }
}

impl RedisStore {
    /// Create a new Redis store from configuration.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = Config::from_url(&config.url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        // Test connection
        let mut conn = pool
            .get()
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        let _: () = cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Create a new Redis store from a URL.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    async fn get_conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|_| StorageError::PoolExhausted.into())
    }
}

/// Decode a hash into a window.
///
/// An empty hash is an absent window. A hash with only a subset of fields
/// is treated the same way: it is the transient state between a concurrent
/// `HINCRBY` and its `HSETNX` follow-ups.
fn decode_window(name: &str, fields: &HashMap<String, String>) -> Result<Option<Window>> {
    let (Some(count), Some(limit), Some(reset_at)) = (
        fields.get(FIELD_COUNT),
        fields.get(FIELD_LIMIT),
        fields.get(FIELD_RESET_AT),
    ) else {
        if !fields.is_empty() {
            trace!(key = name, "skipping partially initialized window");
        }
        return Ok(None);
    };

    let parse = |value: &String| -> Result<u64> {
        value
            .parse()
            .map_err(|_| StorageError::MalformedEntry(name.to_string()).into())
    };

    Ok(Some(Window::new(
        parse(count)?,
        parse(limit)?,
        parse(reset_at)?,
    )))
}

fn ttl_secs(ttl: Duration) -> i64 {
    // Redis expiry has whole-second resolution; round up so a window never
    // outlives its store entry by less than it should.
    ttl.as_secs_f64().ceil() as i64
}

impl WindowStore for RedisStore {
    async fn get(&self, key: &WindowKey) -> Result<Option<Window>> {
        let mut conn = self.get_conn().await?;
        let name = key.name();

        let fields: HashMap<String, String> = conn
            .hgetall(&name)
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        decode_window(&name, &fields)
    }

    async fn put(&self, key: &WindowKey, window: Window, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        let name = key.name();

        conn.hset_multiple::<_, _, _, ()>(
            &name,
            &[
                (FIELD_COUNT, window.count),
                (FIELD_LIMIT, window.limit),
                (FIELD_RESET_AT, window.reset_at),
            ],
        )
        .await
        .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        conn.expire::<_, ()>(&name, ttl_secs(ttl))
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        Ok(())
    }

    async fn increment(
        &self,
        key: &WindowKey,
        delta: u64,
        init: Window,
        ttl: Duration,
    ) -> Result<u64> {
        let mut conn = self.get_conn().await?;
        let name = key.name();

        let count: u64 = conn
            .hincr(&name, FIELD_COUNT, delta)
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        // First writer initializes the metadata; HSETNX and EXPIRE NX are
        // no-ops on an entry that already carries authoritative values.
        let _: bool = conn
            .hset_nx(&name, FIELD_LIMIT, init.limit)
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;
        let _: bool = conn
            .hset_nx(&name, FIELD_RESET_AT, init.reset_at)
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;
        let _: () = cmd("EXPIRE")
            .arg(&name)
            .arg(ttl_secs(ttl))
            .arg("NX")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        Ok(count)
    }

    async fn scan(&self, region: &str, scope: &Scope) -> Result<Vec<(WindowKey, Window)>> {
        let mut conn = self.get_conn().await?;
        let prefix = WindowKey::scope_prefix(region, scope);

        let names: Vec<String> = conn
            .keys(format!("{prefix}*"))
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        let mut windows = Vec::with_capacity(names.len());
        for name in names {
            let Some(key) = WindowKey::parse(&name) else {
                continue;
            };
            let fields: HashMap<String, String> = conn
                .hgetall(&name)
                .await
                .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;
            if let Some(window) = decode_window(&name, &fields)? {
                windows.push((key, window));
            }
        }
        Ok(windows)
    }

    async fn remove(&self, key: &WindowKey) -> Result<()> {
        let mut conn = self.get_conn().await?;

        conn.del::<_, ()>(&key.name())
            .await
            .map_err(|e| StorageError::operation_failed(e.to_string(), true))?;

        Ok(())
    }
}
