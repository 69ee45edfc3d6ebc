// ── Energy state persistence ──
//
// The accumulator's storage contract: a load/save pair over the
// `{cumulative totals, hour records}` document. The built-in
// implementation is a JSON file written atomically (temp file, then
// rename); hosts with their own storage implement `EnergyStore`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persisted accumulator state.
///
/// `hour_records` defaults to empty so a legacy document that predates
/// bucket tracking still loads: totals are preserved and the bucket
/// bookkeeping restarts clean (the accumulator re-baselines).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEnergy {
    #[serde(default)]
    pub cumulative_kwh: HashMap<Uuid, f64>,
    #[serde(default)]
    pub hour_records: HashMap<Uuid, BTreeMap<String, f64>>,
}

/// Storage contract for the energy accumulator.
pub trait EnergyStore: Send + Sync {
    fn load(&self) -> Result<PersistedEnergy, PersistError>;
    fn save(&self, state: &PersistedEnergy) -> Result<(), PersistError>;
}

/// JSON file store. A missing file loads as the empty state.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EnergyStore for JsonFileStore {
    fn load(&self) -> Result<PersistedEnergy, PersistError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no persisted energy state, starting empty");
            return Ok(PersistedEnergy::default());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save(&self, state: &PersistedEnergy) -> Result<(), PersistError> {
        let contents = serde_json::to_string_pretty(state)?;
        // Write-then-rename so a crash mid-save never truncates the
        // previous document.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "persisted energy state");
        Ok(())
    }
}
