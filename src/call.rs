//! Outbound-call lifecycle.
//!
//! Every outbound call moves through a fixed sequence: it is checked, then
//! either rejected outright or admitted, dispatched (which records the
//! preflight estimate), and finally reconciled from the response — either
//! authoritative headers or an upstream rejection. The guard here makes
//! those transitions explicit and refuses to run them out of order.
//!
//! Dropping a guard in [`CallPhase::Calling`] models a timed-out call: the
//! preflight increment stands, on the assumption that the request likely
//! counted against the upstream budget even though the response was lost.

use std::time::Duration;

use tracing::trace;

use crate::error::{RateLimitError, Result};
use crate::limiter::RateLimiter;
use crate::status::RateLimitStatus;
use crate::store::WindowStore;
use crate::upstream::UpstreamRateLimitHeaders;

/// Phase of a single outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// No admission check has run yet.
    Unchecked,
    /// Admission passed; the call may be dispatched.
    Admitted,
    /// Admission denied; the call is never made. Terminal.
    Rejected,
    /// Preflight recorded, upstream call in flight.
    Calling,
    /// Response headers reconciled. Terminal.
    Reconciled,
    /// Upstream rejected the call; synthetic window recorded. Terminal.
    ReconciledFromError,
}

impl CallPhase {
    /// Whether the call can make no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallPhase::Rejected | CallPhase::Reconciled | CallPhase::ReconciledFromError
        )
    }
}

/// State-machine guard for one outbound call.
///
/// Created by [`RateLimiter::begin_call`]. Unlike the facade's fail-open
/// operations, the guard propagates store errors to its caller.
#[derive(Debug)]
pub struct OutboundCall<'a, S> {
    limiter: &'a RateLimiter<S>,
    region: String,
    method: String,
    phase: CallPhase,
}

impl<'a, S: WindowStore> OutboundCall<'a, S> {
    pub(crate) fn new(limiter: &'a RateLimiter<S>, region: &str, method: &str) -> Self {
        Self {
            limiter,
            region: region.to_string(),
            method: method.to_string(),
            phase: CallPhase::Unchecked,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Region this call targets.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Upstream method this call targets.
    pub fn method(&self) -> &str {
        &self.method
    }

    fn expect_phase(&self, expected: CallPhase, action: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(RateLimitError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }

    /// Run the admission check.
    ///
    /// Moves to [`CallPhase::Admitted`] or [`CallPhase::Rejected`] and
    /// returns the full status either way.
    pub async fn admit(&mut self) -> Result<RateLimitStatus> {
        self.expect_phase(CallPhase::Unchecked, "admit")?;

        let status = self
            .limiter
            .admission()
            .check(&self.region, &self.method)
            .await?;
        self.phase = if status.limited {
            CallPhase::Rejected
        } else {
            CallPhase::Admitted
        };
        trace!(region = %self.region, method = %self.method, phase = ?self.phase, "admission ran");
        Ok(status)
    }

    /// Record the preflight estimate; the upstream call may now be made.
    pub async fn dispatch(&mut self) -> Result<()> {
        self.expect_phase(CallPhase::Admitted, "dispatch")?;

        self.limiter
            .estimator()
            .record_preflight(&self.region, &self.method)
            .await?;
        self.phase = CallPhase::Calling;
        Ok(())
    }

    /// Reconcile a completed response's rate-limit headers.
    ///
    /// Missing or empty headers skip reconciliation, leaving the preflight
    /// estimate in place; the call still terminates.
    pub async fn complete(&mut self, headers: &UpstreamRateLimitHeaders) -> Result<()> {
        self.expect_phase(CallPhase::Calling, "complete")?;

        self.limiter
            .update_rate_limits(&self.region, &self.method, headers)
            .await?;
        self.phase = CallPhase::Reconciled;
        Ok(())
    }

    /// Reconcile an upstream rejection (a 429-equivalent).
    ///
    /// No authoritative window data accompanies a rejection, so a
    /// synthetic saturated window replaces the local estimate instead of
    /// leaving it stale.
    pub async fn complete_rejected(&mut self, retry_after: Option<Duration>) -> Result<()> {
        self.expect_phase(CallPhase::Calling, "complete_rejected")?;

        self.limiter
            .estimator()
            .record_rejection(&self.region, &self.method, retry_after)
            .await?;
        self.phase = CallPhase::ReconciledFromError;
        Ok(())
    }
}
