//! Control and synchronization core between `heatlink-api` and a host
//! automation platform.
//!
//! This crate owns the business logic and reactive data infrastructure
//! for the heatlink workspace:
//!
//! - **[`Controller`]** — Central facade managing the full lifecycle:
//!   [`connect()`](Controller::connect) authenticates, loads persisted
//!   energy state, fetches an initial snapshot, then spawns the sync
//!   loop and the capability-gated sub-poll tasks.
//!   [`apply()`](Controller::apply) routes control intent through the
//!   dispatch policy; [`ata()`](Controller::ata) /
//!   [`atw()`](Controller::atw) vend typed per-family handles on top.
//!
//! - **Control dispatch** — every command is deduplicated against the
//!   last known state, retried exactly once on session expiry, and
//!   followed by a trailing-edge debounced refresh (a burst of rapid
//!   commands yields one confirmatory fetch).
//!
//! - **[`DeviceStore`]** — Concurrent snapshot storage (`DashMap` +
//!   `tokio::sync::watch`). The sync loop is its only state writer and
//!   replaces per-device snapshots wholesale, so readers never observe
//!   fields from two different polls mixed together.
//!
//! - **[`EnergyAccumulator`]** — Folds the vendor's progressively
//!   updating hourly energy buckets into a monotonic cumulative total,
//!   persisted through the [`EnergyStore`] contract.

pub mod config;
pub mod controller;
mod dispatch;
pub mod energy;
pub mod error;
pub mod facade;
pub mod model;
pub mod persist;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerConfig;
pub use controller::{ConnectionState, Controller};
pub use energy::{EnergyAccumulator, IngestSummary};
pub use error::CoreError;
pub use facade::{AtaHandle, AtwHandle};
pub use model::{AmbientReading, Device, StateMap};
pub use persist::{EnergyStore, JsonFileStore, PersistedEnergy};
pub use store::{DeviceStore, SyncHealth};

// Re-export the wire-level types consumers routinely touch.
pub use heatlink_api::{CapabilityFlags, Credentials, DeviceFamily};
