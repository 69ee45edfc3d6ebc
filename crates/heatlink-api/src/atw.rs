// ── Air-to-water write schema ──
//
// Field names and typed values for the air-to-water (hydronic) family.
// Zone 2 fields are always part of the write schema even on single-zone
// hardware -- the no-op sentinel covers the absent zone.

use serde_json::{Value, json};

/// Every writable field of the air-to-water state schema, wire order.
pub const WRITABLE_FIELDS: &[&str] = &[
    "power",
    "operation_mode",
    "zone1_target_temperature",
    "zone2_target_temperature",
    "tank_target_temperature",
    "forced_hot_water",
];

// Read-only state fields the snapshot also carries: "outdoor_temperature",
// "flow_temperature", "return_temperature", "tank_temperature".

/// How an air-to-water unit decides its flow temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtwOperationMode {
    /// Track a room thermostat setpoint.
    Room,
    /// Hold a fixed flow temperature.
    Flow,
    /// Follow the outdoor-compensation heat curve.
    Curve,
}

impl AtwOperationMode {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Flow => "flow",
            Self::Curve => "curve",
        }
    }
}

/// Heating zone selector for zone-scoped setpoint writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Zone1,
    Zone2,
}

impl Zone {
    /// The writable field carrying this zone's target temperature.
    pub fn target_field(self) -> &'static str {
        match self {
            Self::Zone1 => "zone1_target_temperature",
            Self::Zone2 => "zone2_target_temperature",
        }
    }
}

/// JSON value for an operation mode field write.
pub fn operation_mode_value(mode: AtwOperationMode) -> Value {
    json!(mode.wire_value())
}
