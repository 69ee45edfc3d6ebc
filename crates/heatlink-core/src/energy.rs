// ── Energy accumulation ──
//
// The vendor reports, per device, an hourly consumption bucket whose
// value *grows over successive polls* as the device uploads more of
// that hour's data, within a bounded rolling window. This module folds
// that progressive feed into a single ever-increasing cumulative total
// by tracking the delta over the last observed value per bucket.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use heatlink_api::DeviceFamily;

use crate::persist::PersistedEnergy;

/// Air-to-air telemetry reports energy in watt-hours.
pub const ATA_KWH_PER_REPORTED_UNIT: f64 = 1e-3;

/// Air-to-water telemetry reports energy in kilowatt-hours.
pub const ATW_KWH_PER_REPORTED_UNIT: f64 = 1.0;

/// Conversion factor from a family's reported unit to kWh.
///
/// The payload is not self-describing and the families do not share a
/// unit, so the factor is an explicit constant per endpoint family --
/// never inferred from magnitude.
pub fn unit_factor(family: DeviceFamily) -> f64 {
    match family {
        DeviceFamily::AirToAir => ATA_KWH_PER_REPORTED_UNIT,
        DeviceFamily::AirToWater => ATW_KWH_PER_REPORTED_UNIT,
    }
}

/// Hour-bucket key for a timestamp: minutes and below truncated.
pub fn bucket_key(ts: DateTime<Utc>) -> String {
    let hour = ts
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts);
    hour.format("%Y-%m-%dT%H:00:00Z").to_string()
}

fn parse_bucket_key(key: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(key)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// What one `ingest` call did, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IngestSummary {
    /// kWh added to the cumulative total by this poll.
    pub applied_kwh: f64,
    /// Buckets seen for the first time.
    pub new_buckets: usize,
    /// Decreasing observations (flagged, never subtracted).
    pub anomalies: usize,
    /// Whether this poll established the device's baseline.
    pub baseline: bool,
}

/// Delta-tracking accumulator over progressive hourly energy buckets.
///
/// Invariants:
/// - a stored bucket value is monotonically non-decreasing: it is only
///   ever replaced by a strictly larger observation;
/// - the cumulative total is a running sum of applied deltas, never
///   recomputed, so it survives bucket pruning.
pub struct EnergyAccumulator {
    retention: ChronoDuration,
    cumulative_kwh: HashMap<Uuid, f64>,
    hour_records: HashMap<Uuid, BTreeMap<String, f64>>,
}

impl EnergyAccumulator {
    pub fn new(retention: std::time::Duration) -> Self {
        Self::from_persisted(retention, PersistedEnergy::default())
    }

    /// Rebuild from persisted state so in-progress hour buckets resume
    /// instead of re-crediting. A legacy shape without bucket records
    /// arrives here as empty maps: totals preserved, bucket tracking
    /// restarts clean (the next poll re-baselines).
    pub fn from_persisted(retention: std::time::Duration, persisted: PersistedEnergy) -> Self {
        Self {
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::hours(48)),
            cumulative_kwh: persisted.cumulative_kwh,
            hour_records: persisted.hour_records,
        }
    }

    pub fn to_persisted(&self) -> PersistedEnergy {
        PersistedEnergy {
            cumulative_kwh: self.cumulative_kwh.clone(),
            hour_records: self.hour_records.clone(),
        }
    }

    /// The running total for a device, in kWh.
    pub fn total_kwh(&self, device_id: &Uuid) -> f64 {
        self.cumulative_kwh.get(device_id).copied().unwrap_or(0.0)
    }

    /// Fold one poll's observations (already converted to kWh) into the
    /// running total.
    ///
    /// A device with no recorded buckets takes the baseline path:
    /// observed values are recorded without contributing deltas. The
    /// pre-install history of a freshly added device must not be
    /// credited as newly consumed energy.
    pub fn ingest(
        &mut self,
        device_id: Uuid,
        observations: &[(DateTime<Utc>, f64)],
        now: DateTime<Utc>,
    ) -> IngestSummary {
        let records = self.hour_records.entry(device_id).or_default();
        let baseline = records.is_empty();

        let mut summary = IngestSummary {
            baseline,
            ..IngestSummary::default()
        };

        for (ts, observed_kwh) in observations {
            let key = bucket_key(*ts);
            match records.get(&key).copied() {
                None => {
                    records.insert(key, *observed_kwh);
                    summary.new_buckets += 1;
                    if !baseline {
                        // A bucket first seen after the baseline is new
                        // consumption in full.
                        summary.applied_kwh += *observed_kwh;
                    }
                }
                Some(previous) if *observed_kwh > previous => {
                    summary.applied_kwh += *observed_kwh - previous;
                    records.insert(key, *observed_kwh);
                }
                Some(previous) if *observed_kwh < previous => {
                    // Out-of-order or corrupt report: keep the higher
                    // value, never subtract.
                    summary.anomalies += 1;
                    warn!(
                        device = %device_id,
                        bucket = %key,
                        observed = observed_kwh,
                        stored = previous,
                        "energy bucket decreased, ignoring observation"
                    );
                }
                Some(_) => {}
            }
        }

        if summary.applied_kwh > 0.0 {
            *self.cumulative_kwh.entry(device_id).or_default() += summary.applied_kwh;
        }

        // Buckets past the horizon are final and already folded into
        // the total; dropping them is safe.
        let horizon = now - self.retention;
        records.retain(|key, _| parse_bucket_key(key).is_none_or(|ts| ts >= horizon));

        debug!(
            device = %device_id,
            applied_kwh = summary.applied_kwh,
            new_buckets = summary.new_buckets,
            anomalies = summary.anomalies,
            baseline = summary.baseline,
            "energy poll ingested"
        );
        summary
    }
}
