// ── Domain model ──
//
// The core's view of a device: the wire entry plus the sub-poll data
// merged in. A `Device` is immutable once built -- the store swaps
// whole `Arc<Device>` values, so a reader can never observe fields
// from two different polls mixed together.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use heatlink_api::{CapabilityFlags, DeviceEntry, DeviceFamily};

/// Flat field→value state map, replaced wholesale each sync cycle.
pub type StateMap = serde_json::Map<String, Value>;

/// A reading from the optional auxiliary ambient sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub temperature_c: f64,
    pub measured_at: DateTime<Utc>,
}

/// One heat pump as the core tracks it.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: Uuid,
    pub family: DeviceFamily,
    pub name: String,
    pub serial: String,
    pub capabilities: CapabilityFlags,
    /// Last known state. Written only by the sync loop; the control
    /// dispatcher reads it for deduplication but never mutates it.
    pub state: StateMap,
    /// Latest ambient sub-poll reading, if the device supports the
    /// series. Preserved across snapshot swaps.
    pub ambient: Option<AmbientReading>,
    /// When the snapshot carrying `state` was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl Device {
    pub(crate) fn from_entry(entry: DeviceEntry, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id: entry.id,
            family: entry.family,
            name: entry.name,
            serial: entry.serial,
            capabilities: entry.capabilities,
            state: entry.state,
            ambient: None,
            fetched_at,
        }
    }

    /// One field of the last known state.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    pub fn is_powered(&self) -> bool {
        self.field("power").and_then(Value::as_bool).unwrap_or(false)
    }

    /// The current room temperature (air-to-air) if reported.
    pub fn room_temperature(&self) -> Option<f64> {
        self.field("room_temperature").and_then(Value::as_f64)
    }

    /// The current outdoor temperature (air-to-water) if reported.
    pub fn outdoor_temperature(&self) -> Option<f64> {
        self.field("outdoor_temperature").and_then(Value::as_f64)
    }
}
