//! Report Rate Limit
//!
//! One report per plate per user per window, across both directions. The
//! window is measured from the latest cached report timestamp.

use std::sync::Arc;
use std::time::Duration;

use platform::clock::Clock;
use platform::rate_limit::Cooldown;

use crate::application::cache::ReputationCache;
use crate::domain::services;
use crate::domain::value_objects::PlateIdentity;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Latest report timestamp for the plate, 0 if never reported
    pub latest_report_ms: i64,
    /// When the next report becomes allowed, 0 if allowed already
    pub next_allowed_at_ms: i64,
}

/// Report rate-limit policy
#[derive(Clone)]
pub struct RateLimitPolicy {
    cooldown: Cooldown,
    clock: Arc<dyn Clock>,
}

impl RateLimitPolicy {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown: Cooldown::new(window),
            clock,
        }
    }

    pub fn window(&self) -> Duration {
        self.cooldown.window
    }

    pub fn latest_report_timestamp(
        &self,
        cache: &ReputationCache,
        plate: &impl PlateIdentity,
    ) -> i64 {
        services::latest_report_timestamp(cache.report_entries(), plate)
    }

    /// Decide whether `plate` may be reported now
    ///
    /// Anonymous sessions are never allowed.
    pub fn check(
        &self,
        cache: &ReputationCache,
        plate: &impl PlateIdentity,
        is_anonymous: bool,
    ) -> RateLimitDecision {
        self.decide(self.latest_report_timestamp(cache, plate), is_anonymous)
    }

    /// Decide from an already known latest report timestamp
    pub fn decide(&self, latest_report_ms: i64, is_anonymous: bool) -> RateLimitDecision {
        let result = self.cooldown.check(latest_report_ms, self.clock.now_ms());
        RateLimitDecision {
            allowed: result.allowed && !is_anonymous,
            latest_report_ms,
            next_allowed_at_ms: result.next_allowed_at_ms,
        }
    }

    pub fn is_report_allowed(
        &self,
        cache: &ReputationCache,
        plate: &impl PlateIdentity,
        is_anonymous: bool,
    ) -> bool {
        self.check(cache, plate, is_anonymous).allowed
    }

    /// Epoch milliseconds when the window for `plate` elapses
    pub fn next_report_at(&self, cache: &ReputationCache, plate: &impl PlateIdentity) -> i64 {
        self.check(cache, plate, false).next_allowed_at_ms
    }
}

impl std::fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}
