//! Application Configuration
//!
//! Configuration for the identity application layer.

use std::time::Duration;

use platform::deadline::DEFAULT_DEADLINE;

/// Identity application configuration
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Deadline for each provider call
    pub timeout: Duration,
    /// Buffer of each signal channel
    pub signal_buffer: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DEADLINE,
            signal_buffer: 4,
        }
    }
}

impl IdentityConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}
