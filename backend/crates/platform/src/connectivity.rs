//! Connectivity Probing
//!
//! Answers "is the device online right now" before a caller registers a
//! listener that could never deliver anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Trait for connectivity probes
#[trait_variant::make(Connectivity: Send)]
pub trait LocalConnectivity {
    /// Returns true if the remote side is currently reachable
    async fn is_online(&self) -> bool;
}

/// Fixed answer, switchable at runtime
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Probe that issues a `HEAD` request against a known endpoint
///
/// Any HTTP response (even an error status) counts as online; only transport
/// failures and timeouts count as offline.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            timeout,
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

impl Connectivity for HttpProbe {
    async fn is_online(&self) -> bool {
        match self
            .client
            .head(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}
