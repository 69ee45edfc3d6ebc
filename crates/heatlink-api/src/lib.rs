//! Async Rust client for the heat pump vendor cloud API.
//!
//! One authenticated session ([`SessionManager`], single-flight login)
//! shared by one HTTP client ([`CloudClient`]) covering both device
//! families (air-to-air and air-to-water): the combined snapshot GET,
//! the full-sparse-patch state PUT, and the time-ranged telemetry GET.
//!
//! This crate is the wire layer only -- polling, deduplication,
//! debounce, and energy accumulation live in `heatlink-core`.

pub mod ata;
pub mod atw;
pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod transport;

pub use auth::{Credentials, Session};
pub use client::CloudClient;
pub use error::Error;
pub use models::{
    CapabilityFlags, DeviceEntry, DeviceFamily, Measure, StatePatch, TelemetryPoint,
    TelemetrySeries, UserContext,
};
pub use session::SessionManager;
pub use transport::TransportConfig;
