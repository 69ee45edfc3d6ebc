// ── Runtime controller configuration ──
//
// Describes *how* to reach the vendor cloud and how aggressively to
// poll it. The host platform constructs a `ControllerConfig` and hands
// it in -- core never reads config files (see heatlink-config for the
// TOML/env loader).

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use heatlink_api::Credentials;

/// Configuration for one cloud account connection.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cloud API base URL.
    pub base_url: Url,
    /// Account credentials.
    pub credentials: Credentials,
    /// Per-request timeout. Must be finite -- a hung request must never
    /// stall the sync cycle.
    pub timeout: Duration,
    /// Main state-sync interval.
    pub poll_interval: Duration,
    /// Recurring cadence of the ambient-sensor sub-poll, once a device
    /// has probed as supporting it.
    pub telemetry_interval: Duration,
    /// Quiet window of the post-command refresh debounce.
    pub debounce_window: Duration,
    /// Retention horizon for hourly energy buckets. Buckets past it are
    /// final and get pruned; the cumulative total survives.
    pub energy_retention: Duration,
    /// Where to persist energy accumulator state. `None` disables the
    /// built-in JSON file store (a custom `EnergyStore` can still be
    /// supplied to the controller).
    pub energy_store_path: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cloud.example.com"
                .parse()
                .expect("default base URL is valid"),
            credentials: Credentials::new("", ""),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(60),
            telemetry_interval: Duration::from_secs(30 * 60),
            debounce_window: Duration::from_secs(2),
            energy_retention: Duration::from_secs(48 * 3600),
            energy_store_path: None,
        }
    }
}
