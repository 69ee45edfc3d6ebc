// ── Reactive device store ──
//
// Concurrent storage for device snapshots with push-based change
// notification via `watch` channels. The sync loop is the only writer
// of device state; each cycle replaces whole `Arc<Device>` values
// (never field-by-field merges), so every read is internally
// consistent with one poll.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::{AmbientReading, Device};

/// Observable health of the sync loop.
///
/// A failed cycle leaves the previous snapshot in place and flips
/// `stale` instead of clearing data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncHealth {
    pub last_success: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Store for all devices of the account.
pub struct DeviceStore {
    devices: DashMap<Uuid, Arc<Device>>,
    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<Device>>>>,
    health: watch::Sender<SyncHealth>,
}

impl DeviceStore {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (health, _) = watch::channel(SyncHealth::default());
        Self {
            devices: DashMap::new(),
            snapshot,
            health,
        }
    }

    // ── Sync-cycle writes ────────────────────────────────────────────

    /// Apply a full poll result: upsert every incoming device, then
    /// prune ids the poll no longer reports. Upsert-then-prune avoids
    /// the brief empty state a clear-then-insert would cause.
    ///
    /// Ambient readings come from the slower sub-poll, so the incoming
    /// snapshot never carries them -- the previous reading is kept.
    pub fn apply_snapshot(&self, incoming: Vec<Device>) {
        let incoming_ids: Vec<Uuid> = incoming.iter().map(|d| d.id).collect();

        for mut device in incoming {
            if let Some(existing) = self.devices.get(&device.id) {
                device.ambient = existing.ambient;
            }
            self.devices.insert(device.id, Arc::new(device));
        }

        let stale_ids: Vec<Uuid> = self
            .devices
            .iter()
            .map(|r| *r.key())
            .filter(|id| !incoming_ids.contains(id))
            .collect();
        for id in stale_ids {
            self.devices.remove(&id);
        }

        self.rebuild_snapshot();
        let _ = self.health.send(SyncHealth {
            last_success: Some(Utc::now()),
            stale: false,
        });
    }

    /// Record an ambient sub-poll reading by swapping in a new
    /// `Arc<Device>` that differs only in the `ambient` field.
    /// Returns `false` if the device is unknown.
    pub fn set_ambient(&self, device_id: Uuid, reading: AmbientReading) -> bool {
        let Some(existing) = self.devices.get(&device_id).map(|r| Arc::clone(r.value())) else {
            return false;
        };
        let mut device = (*existing).clone();
        device.ambient = Some(reading);
        self.devices.insert(device_id, Arc::new(device));
        self.rebuild_snapshot();
        true
    }

    /// Flag a failed sync cycle. The previous snapshot stays published.
    pub fn mark_stale(&self) {
        self.health.send_modify(|h| h.stale = true);
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn device(&self, device_id: &Uuid) -> Option<Arc<Device>> {
        self.devices.get(device_id).map(|r| Arc::clone(r.value()))
    }

    /// The current snapshot (cheap `Arc` clone), sorted by name.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.snapshot.subscribe()
    }

    pub fn health(&self) -> SyncHealth {
        *self.health.borrow()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<SyncHealth> {
        self.health.subscribe()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Device>> =
            self.devices.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}
