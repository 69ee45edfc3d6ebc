// ── Wire models ──
//
// Types mirroring the vendor cloud's JSON payloads. The combined
// snapshot endpoint returns both device families in one document;
// per-device state arrives as a flat field→value map so the control
// layer can deduplicate generically without knowing every field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The two heat pump product families the cloud exposes.
///
/// Same operations, different field sets -- a tagged variant, not a
/// type hierarchy. The family decides the write schema and the URL
/// path segment for device endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    /// Air-to-air unit (room climate: mode, setpoint, fan, vanes).
    #[serde(rename = "ata")]
    AirToAir,
    /// Air-to-water unit (zones, flow, hot water tank).
    #[serde(rename = "atw")]
    AirToWater,
}

impl DeviceFamily {
    /// Path segment used in device endpoints (`/devices/{segment}/{id}`).
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::AirToAir => "ata",
            Self::AirToWater => "atw",
        }
    }

    /// The writable fields of this family's state schema, in wire order.
    ///
    /// Every one of these must be present in a write body -- untouched
    /// fields carry the explicit `null` no-op sentinel.
    pub fn writable_fields(self) -> &'static [&'static str] {
        match self {
            Self::AirToAir => crate::ata::WRITABLE_FIELDS,
            Self::AirToWater => crate::atw::WRITABLE_FIELDS,
        }
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Static capability flags the vendor reports per device.
///
/// These describe what the hardware *can* do; whether optional
/// telemetry series actually exist is discovered at runtime by the
/// sync loop's one-time probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapabilityFlags {
    /// Device reports hourly energy consumption.
    pub has_energy_reporting: bool,
    /// Air-to-water unit controls a second heating zone.
    pub has_zone2: bool,
    /// Air-to-air unit supports horizontal vane control.
    pub has_wide_vane: bool,
    /// Unit has a domestic hot water tank.
    pub has_hot_water_tank: bool,
}

/// One device as it appears in the combined user-context snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub id: Uuid,
    pub family: DeviceFamily,
    pub name: String,
    pub serial: String,
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    /// Flat field→value state map. Replaced wholesale on every poll.
    #[serde(default)]
    pub state: Map<String, Value>,
}

/// The combined snapshot: every device of both families in one
/// round trip. The vendor API intentionally has no per-family listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

// ── Telemetry ───────────────────────────────────────────────────────

/// Telemetry measures the time-ranged endpoint can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Auxiliary ambient sensor temperature. Not universally present.
    Ambient,
    /// Hourly energy consumption buckets (progressively updated).
    Energy,
}

impl Measure {
    pub fn query_value(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::Energy => "energy",
        }
    }
}

/// One `(timestamp, value)` sample of a telemetry series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A telemetry response. `Unavailable` is a *structural* answer ("this
/// device has no such series"), distinct from a transport failure --
/// the capability probe relies on telling the two apart.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetrySeries {
    Available(Vec<TelemetryPoint>),
    Unavailable,
}

impl TelemetrySeries {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// Raw shape of the telemetry endpoint body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TelemetryResponse {
    pub available: bool,
    #[serde(default)]
    pub points: Vec<TelemetryPoint>,
}

impl From<TelemetryResponse> for TelemetrySeries {
    fn from(resp: TelemetryResponse) -> Self {
        if resp.available {
            Self::Available(resp.points)
        } else {
            Self::Unavailable
        }
    }
}

// ── State patches ───────────────────────────────────────────────────

/// A full sparse-patch write body.
///
/// The write endpoint requires every writable field of the family's
/// schema to be present: `null` means "leave unchanged", any other
/// literal (including `0` and `false`) is applied verbatim. Omitting a
/// field is NOT equivalent to `null` in this protocol, so the patch is
/// always constructed with the complete field set and fields are only
/// ever overwritten, never removed.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct StatePatch {
    fields: Map<String, Value>,
    #[serde(skip)]
    family: DeviceFamily,
}

impl StatePatch {
    /// A patch with every writable field set to the no-op sentinel.
    pub fn for_family(family: DeviceFamily) -> Self {
        let mut fields = Map::new();
        for field in family.writable_fields() {
            fields.insert((*field).to_owned(), Value::Null);
        }
        Self { fields, family }
    }

    /// Set one field to a literal value.
    ///
    /// Rejects fields outside the family's write schema -- a typo here
    /// must fail loudly instead of silently growing the body.
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), crate::Error> {
        if !self.family.writable_fields().contains(&field) {
            return Err(crate::Error::UnknownField {
                field: field.to_owned(),
                family: self.family,
            });
        }
        self.fields.insert(field.to_owned(), value);
        Ok(())
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// The current value of a field (`Null` = no-op sentinel).
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
