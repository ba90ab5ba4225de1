//! Application Configuration
//!
//! Configuration for the reputation application layer.

use std::time::Duration;

use platform::deadline::DEFAULT_DEADLINE;
use platform::rate_limit::MONTH;

/// Owner id used for device-local data when nobody is signed in
pub const ANONYMOUS_OWNER_ID: &str = "-1";

/// Reputation application configuration
#[derive(Debug, Clone)]
pub struct ReputationConfig {
    /// Minimum time between two reports of the same plate by one user
    pub rate_limit_window: Duration,
    /// Deadline for each one-shot remote call
    pub operation_timeout: Duration,
    /// Buffer of each feed and signal channel
    pub feed_buffer: usize,
    /// Owner id for recent searches of signed-out or anonymous users
    pub anonymous_id: String,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            rate_limit_window: MONTH,
            operation_timeout: DEFAULT_DEADLINE,
            feed_buffer: 64,
            anonymous_id: ANONYMOUS_OWNER_ID.to_string(),
        }
    }
}

impl ReputationConfig {
    /// Config with a short window and deadline (for tests)
    pub fn for_testing() -> Self {
        Self {
            rate_limit_window: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    pub fn with_rate_limit_window(mut self, window: Duration) -> Self {
        self.rate_limit_window = window;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Channel capacity, never below what one Loading + terminal pair needs
    pub(crate) fn channel_capacity(&self) -> usize {
        self.feed_buffer.max(2)
    }
}
