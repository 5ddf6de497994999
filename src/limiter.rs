//! The limiter facade.
//!
//! `RateLimiter` wires the window store, budget estimator, and admission
//! check together behind the operations a route-handler layer calls. The
//! store is injected and owned here — never reached as ambient state — and
//! all time flows through the injected clock.
//!
//! The facade applies the degradation policy: a broken store fails OPEN.
//! The store is an optimization over guesses, not a safety-critical gate;
//! blocking all traffic because a counter backend is down would be worse
//! than briefly flying blind. Degradations are logged.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::admission::AdmissionCheck;
use crate::call::OutboundCall;
use crate::clock::{Clock, SystemClock};
use crate::config::LimiterConfig;
use crate::descriptor;
use crate::error::Result;
use crate::estimator::BudgetEstimator;
use crate::response::RateLimitHeaders;
use crate::status::RateLimitStatus;
use crate::store::WindowStore;
use crate::upstream::{UpstreamClient, UpstreamRateLimitHeaders, UpstreamResponse};
use crate::window::Scope;

/// Outcome of a fully managed outbound call.
#[derive(Debug)]
pub enum CallOutcome {
    /// The call went through; the response is reconciled and returned.
    /// Non-rejection error statuses are the caller's to interpret.
    Completed(UpstreamResponse),
    /// The call was held back, either by local prediction (with window
    /// snapshots) or by the upstream's own rejection (without).
    Denied(RateLimitStatus),
}

/// Request-budget tracker for one upstream service.
///
/// Cheap to share: hold it in an `Arc` and call from any task.
///
/// # Example
///
/// ```ignore
/// use upstream_ratelimit::{LimiterConfig, MemoryStore, RateLimiter};
///
/// let limiter = RateLimiter::new(MemoryStore::new(), LimiterConfig::default())?;
///
/// let status = limiter.check_rate_limits("na1", "summoner").await;
/// if status.is_limited() {
///     // surface retry message + headers to the client
/// } else {
///     limiter.record_request("na1", "summoner").await?;
///     // ...perform the upstream call...
/// }
/// ```
pub struct RateLimiter<S> {
    estimator: BudgetEstimator<S>,
    admission: AdmissionCheck<S>,
    config: Arc<LimiterConfig>,
    clock: Arc<dyn Clock>,
}

impl<S: WindowStore> RateLimiter<S> {
    /// Create a limiter over the given store, using the system clock.
    pub fn new(store: S, config: LimiterConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from the given clock.
    pub fn with_clock(store: S, config: LimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(store);
        let config = Arc::new(config);
        Ok(Self {
            estimator: BudgetEstimator::new(store.clone(), clock.clone(), config.clone()),
            admission: AdmissionCheck::new(store, clock.clone(), config.threshold),
            config,
            clock,
        })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub(crate) fn admission(&self) -> &AdmissionCheck<S> {
        &self.admission
    }

    pub(crate) fn estimator(&self) -> &BudgetEstimator<S> {
        &self.estimator
    }

    /// Check whether a call for `(region, method)` may proceed.
    ///
    /// Read-only; recording usage is [`record_request`](Self::record_request).
    /// Fails open: if the store is unreachable the call is presumed safe
    /// and the degradation logged.
    pub async fn check_rate_limits(&self, region: &str, method: &str) -> RateLimitStatus {
        match self.admission.check(region, method).await {
            Ok(status) => status,
            Err(error) => {
                warn!(region, method, %error, "window store unavailable, failing open");
                RateLimitStatus::allowed()
            }
        }
    }

    /// Record one outbound call before it is made (preflight estimate).
    pub async fn record_request(&self, region: &str, method: &str) -> Result<()> {
        self.estimator.record_preflight(region, method).await
    }

    /// Reconcile the rate-limit headers of an upstream response.
    ///
    /// Each scope's pair of descriptor strings is parsed and stored
    /// authoritatively; a scope whose pair is incomplete is skipped,
    /// leaving prior estimates intact.
    pub async fn update_rate_limits(
        &self,
        region: &str,
        method: &str,
        headers: &UpstreamRateLimitHeaders,
    ) -> Result<()> {
        if let (Some(limits), Some(usage)) = (&headers.app_limit, &headers.app_usage) {
            let readings = descriptor::parse_windows(limits, usage);
            self.estimator
                .record_authoritative(region, &Scope::App, &readings)
                .await?;
        }

        if let (Some(limits), Some(usage)) = (&headers.method_limit, &headers.method_usage) {
            let readings = descriptor::parse_windows(limits, usage);
            self.estimator
                .record_authoritative(region, &Scope::Method(method.to_string()), &readings)
                .await?;
        }

        Ok(())
    }

    /// Record an upstream-confirmed rejection for `(region, method)`.
    pub async fn record_rejection(
        &self,
        region: &str,
        method: &str,
        retry_after: Option<Duration>,
    ) -> Result<()> {
        self.estimator
            .record_rejection(region, method, retry_after)
            .await
    }

    /// Response headers for a status, stamped off this limiter's clock.
    pub fn response_headers(&self, status: &RateLimitStatus) -> RateLimitHeaders {
        RateLimitHeaders::from_status(status, &*self.clock)
    }

    /// Begin an explicitly driven call lifecycle.
    ///
    /// Use this when the caller performs the upstream exchange itself;
    /// [`execute`](Self::execute) drives the same machine end to end.
    pub fn begin_call<'a>(&'a self, region: &str, method: &str) -> OutboundCall<'a, S> {
        OutboundCall::new(self, region, method)
    }

    /// Run one fully managed call: admission, preflight, the upstream
    /// exchange, and reconciliation.
    ///
    /// Store failures during recording are logged and do not block the
    /// call (fail-open). A transport error propagates and leaves the
    /// preflight estimate standing: the request may well have counted
    /// upstream even though the response was lost.
    pub async fn execute<C: UpstreamClient>(
        &self,
        client: &C,
        region: &str,
        method: &str,
    ) -> Result<CallOutcome> {
        let status = self.check_rate_limits(region, method).await;
        if status.is_limited() {
            debug!(region, method, "call denied locally");
            return Ok(CallOutcome::Denied(status));
        }

        if let Err(error) = self.record_request(region, method).await {
            warn!(region, method, %error, "preflight record failed, continuing");
        }

        let response = client.send(region, method).await?;

        if response.is_rate_limited() {
            let retry_after = response.rate_limit_headers().retry_after;
            if let Err(error) = self.record_rejection(region, method, retry_after).await {
                warn!(region, method, %error, "rejection record failed");
            }
            let delay = retry_after.unwrap_or(self.config.synthetic_retry);
            debug!(region, method, retry_ms = delay.as_millis() as u64, "call denied upstream");
            return Ok(CallOutcome::Denied(RateLimitStatus::denied(delay)));
        }

        let headers = response.rate_limit_headers();
        if !headers.is_empty() {
            if let Err(error) = self.update_rate_limits(region, method, &headers).await {
                warn!(region, method, %error, "header reconciliation failed");
            }
        }

        Ok(CallOutcome::Completed(response))
    }
}

impl<S> std::fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}
