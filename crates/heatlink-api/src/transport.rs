// Shared transport configuration for building reqwest::Client instances.
//
// The session manager and the cloud client share one HTTP client; this
// module keeps the builder logic in a single place. Timeouts are
// mandatory -- an unbounded hang on one request must never stall the
// sync cycle (the caller picks the value, we refuse "no timeout").

use std::time::Duration;

/// Transport tuning for the vendor cloud connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. Applied to every call, including login.
    pub timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("heatlink/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(crate::error::Error::Transport)
    }
}
