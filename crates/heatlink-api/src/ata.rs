// ── Air-to-air write schema ──
//
// Field names and typed values for the air-to-air (room climate)
// family. The wire names double as the generic dispatch keys the
// control layer deduplicates on.

use serde_json::{Value, json};

/// Every writable field of the air-to-air state schema, wire order.
pub const WRITABLE_FIELDS: &[&str] = &[
    "power",
    "mode",
    "target_temperature",
    "fan_speed",
    "vane_horizontal",
    "vane_vertical",
];

// Read-only state fields the snapshot also carries:
// "room_temperature", "standby".

/// Operating mode of an air-to-air unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtaMode {
    Heat,
    Cool,
    Dry,
    FanOnly,
    Auto,
}

impl AtaMode {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
            Self::Auto => "auto",
        }
    }
}

/// Fan speed steps. `Auto` lets the unit decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanSpeed {
    Auto,
    Quiet,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Quiet => "quiet",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Horizontal vane position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaneHorizontal {
    Auto,
    Left,
    Center,
    Right,
    Swing,
}

impl VaneHorizontal {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Swing => "swing",
        }
    }
}

/// Vertical vane position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaneVertical {
    Auto,
    Up,
    Middle,
    Down,
    Swing,
}

impl VaneVertical {
    pub fn wire_value(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Up => "up",
            Self::Middle => "middle",
            Self::Down => "down",
            Self::Swing => "swing",
        }
    }
}

/// JSON value for a mode field write.
pub fn mode_value(mode: AtaMode) -> Value {
    json!(mode.wire_value())
}

/// JSON value for a fan speed field write.
pub fn fan_speed_value(speed: FanSpeed) -> Value {
    json!(speed.wire_value())
}
