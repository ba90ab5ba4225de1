//! Rate Limiting Infrastructure
//!
//! Cooldown windows: an actor may act again once a fixed window has passed
//! since its latest recorded action.

use std::time::Duration;

/// 30 days
pub const MONTH: Duration = Duration::from_secs(30 * 24 * 3600);

/// Cooldown configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    /// Minimum time between two actions
    pub window: Duration,
}

impl Default for Cooldown {
    fn default() -> Self {
        Self { window: MONTH }
    }
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }

    /// Check whether an action is allowed at `now_ms`
    ///
    /// `last_ms == 0` means no recorded action.
    pub fn check(&self, last_ms: i64, now_ms: i64) -> CooldownResult {
        let next_allowed_at_ms = if last_ms == 0 {
            0
        } else {
            last_ms.saturating_add(self.window_ms())
        };
        CooldownResult {
            allowed: now_ms >= next_allowed_at_ms,
            next_allowed_at_ms,
        }
    }

    pub fn is_elapsed(&self, last_ms: i64, now_ms: i64) -> bool {
        self.check(last_ms, now_ms).allowed
    }
}

/// Cooldown check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownResult {
    pub allowed: bool,
    pub next_allowed_at_ms: i64,
}

impl CooldownResult {
    /// Time left until the next action is allowed
    pub fn remaining(&self, now_ms: i64) -> Duration {
        let left = self.next_allowed_at_ms.saturating_sub(now_ms);
        Duration::from_millis(left.max(0) as u64)
    }
}
