//! Request-budget tracking for rate-limited upstream APIs.
//!
//! `upstream_ratelimit` sits in front of a third-party, regionally
//! partitioned REST API and keeps outbound traffic inside its published
//! limits:
//!
//! - **Overlapping windows**: per-region budgets at app-wide and
//!   per-method scope, several intervals each (e.g. 20 req/1s and
//!   100 req/120s tracking the same traffic).
//! - **Preflight estimation**: the upstream offers no "check without
//!   consuming" call, so usage is counted optimistically before each
//!   round trip.
//! - **Header reconciliation**: the limits and usage the upstream reports
//!   in its response headers overwrite local guesses after every call.
//! - **Admission control**: calls are held back once any window crosses a
//!   configurable threshold (95% by default, absorbing in-flight races),
//!   with a computed retry delay.
//! - **Pluggable storage**: in-memory with expiry sweeping, or Redis for
//!   multi-process deployments.
//!
//! # Quick Start
//!
//! ```ignore
//! use upstream_ratelimit::{LimiterConfig, MemoryStore, RateLimiter};
//!
//! #[tokio::main]
//! async fn main() -> upstream_ratelimit::Result<()> {
//!     let limiter = RateLimiter::new(MemoryStore::new(), LimiterConfig::default())?;
//!
//!     let status = limiter.check_rate_limits("na1", "summoner").await;
//!     if status.is_limited() {
//!         println!("{}", upstream_ratelimit::format_rate_limit_message(&status));
//!         return Ok(());
//!     }
//!
//!     limiter.record_request("na1", "summoner").await?;
//!     // ...perform the upstream call, then reconcile its headers:
//!     // limiter.update_rate_limits("na1", "summoner", &headers).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `memory` (default): in-memory window store
//! - `redis`: Redis window store for shared, multi-process counters

pub mod admission;
pub mod call;
pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod estimator;
pub mod limiter;
pub mod quota;
pub mod response;
pub mod status;
pub mod store;
pub mod upstream;
pub mod window;

// Re-export main types
pub use admission::AdmissionCheck;
pub use call::{CallPhase, OutboundCall};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LimiterConfig;
pub use descriptor::{parse_windows, WindowReading};
pub use error::{ConfigError, ConnectionError, RateLimitError, Result, StorageError};
pub use estimator::BudgetEstimator;
pub use limiter::{CallOutcome, RateLimiter};
pub use quota::Quota;
pub use response::{format_rate_limit_message, RateLimitHeaders};
pub use status::{RateLimitStatus, WindowSnapshot};
pub use store::WindowStore;
pub use upstream::{UpstreamClient, UpstreamError, UpstreamRateLimitHeaders, UpstreamResponse};
pub use window::{Scope, Window, WindowKey};

#[cfg(feature = "memory")]
pub use store::MemoryStore;

#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisStore};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::LimiterConfig;
    pub use crate::error::{RateLimitError, Result};
    pub use crate::limiter::{CallOutcome, RateLimiter};
    pub use crate::quota::Quota;
    pub use crate::status::RateLimitStatus;
    pub use crate::store::WindowStore;
    pub use crate::upstream::{UpstreamClient, UpstreamResponse};

    #[cfg(feature = "memory")]
    pub use crate::store::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::store::{RedisConfig, RedisStore};
}
