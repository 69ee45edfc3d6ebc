// ── Control dispatch ──
//
// The per-command policy layer between caller intent ("set field X to
// value Y on device D") and the wire call: deduplication against the
// last known state, one reauthenticate-and-retry on session expiry,
// and a trailing-edge debounce that collapses command bursts into a
// single confirmatory refresh.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use heatlink_api::{CloudClient, DeviceFamily, StatePatch};

use crate::error::CoreError;
use crate::store::DeviceStore;

/// Out-of-band refresh request sent to the sync loop.
#[derive(Debug, Clone, Copy)]
pub(crate) enum RefreshTrigger {
    /// A command burst settled; fetch the confirmed state.
    PostCommand { device_id: Uuid },
}

pub(crate) struct ControlDispatcher {
    client: CloudClient,
    store: Arc<DeviceStore>,
    refresh_tx: mpsc::Sender<RefreshTrigger>,
    window: Duration,
    /// Per-(device, field) serialization: a second `apply()` for the
    /// same field waits for the in-flight attempt instead of racing it.
    locks: DashMap<(Uuid, String), Arc<Mutex<()>>>,
    /// Target values of commands sent but not yet confirmed by a
    /// refresh. Lets a repeat of an in-flight command join it instead
    /// of dispatching again. Cleared on every snapshot apply.
    pending: DashMap<(Uuid, String), Value>,
    /// At most one live debounce timer per device; re-arming replaces
    /// (and cancels) the previous one, never stacks a second.
    timers: DashMap<Uuid, CancellationToken>,
    shutdown: CancellationToken,
}

impl ControlDispatcher {
    pub(crate) fn new(
        client: CloudClient,
        store: Arc<DeviceStore>,
        refresh_tx: mpsc::Sender<RefreshTrigger>,
        window: Duration,
    ) -> Self {
        Self {
            client,
            store,
            refresh_tx,
            window,
            locks: DashMap::new(),
            pending: DashMap::new(),
            timers: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Apply one field change to one device.
    ///
    /// Success means the write was accepted (or was a no-op); the
    /// cached state is NOT updated optimistically -- the debounced
    /// refresh is the single source of truth for the outcome.
    pub(crate) async fn apply(
        &self,
        device_id: Uuid,
        field: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let device = self
            .store
            .device(&device_id)
            .ok_or(CoreError::DeviceNotFound { device_id })?;
        let family = device.family;
        let key = (device_id, field.to_owned());

        // Dedup first: against the last known state, and against the
        // target of an in-flight command for the same field. This is
        // the main defense against command storms from rapid UI input.
        if device.state.get(field) == Some(&value) {
            trace!(%device_id, field, "command deduplicated against snapshot");
            return Ok(());
        }
        if self.pending.get(&key).is_some_and(|p| *p == value) {
            trace!(%device_id, field, "command joined in-flight attempt");
            return Ok(());
        }

        let lock = self.locks.entry(key.clone()).or_default().clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring: the attempt we waited on may have
        // dispatched this exact target, or a refresh may have landed.
        if self.pending.get(&key).is_some_and(|p| *p == value) {
            trace!(%device_id, field, "command deduplicated after join");
            return Ok(());
        }
        if self
            .store
            .device(&device_id)
            .is_some_and(|d| d.state.get(field) == Some(&value))
        {
            return Ok(());
        }

        let mut patch = StatePatch::for_family(family);
        patch.set(field, value.clone())?;

        self.pending.insert(key.clone(), value);
        match self.dispatch(device_id, family, &patch).await {
            Ok(()) => {
                self.arm_refresh(device_id);
                Ok(())
            }
            Err(e) => {
                // A failed command leaves no trace: the next poll or
                // user action is the recovery path.
                self.pending.remove(&key);
                Err(e)
            }
        }
    }

    /// Send the patch, re-authenticating and retrying exactly once on
    /// session expiry. A second expiry (or any other error) is fatal
    /// for this command.
    async fn dispatch(
        &self,
        device_id: Uuid,
        family: DeviceFamily,
        patch: &StatePatch,
    ) -> Result<(), CoreError> {
        match self.client.send_update(device_id, family, patch).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_auth_expired() => {
                debug!(%device_id, "session expired mid-command, re-authenticating");
                self.client.session().invalidate();
                self.client.session().ensure_valid().await?;
                self.client
                    .send_update(device_id, family, patch)
                    .await
                    .map_err(CoreError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Arm (or extend) the device's debounce timer.
    ///
    /// Trailing-edge: the refresh fires `window` after the *last*
    /// command of a burst. Replacing the token cancels the previous
    /// timer, so N rapid commands yield exactly one refresh.
    fn arm_refresh(&self, device_id: Uuid) {
        let token = CancellationToken::new();
        if let Some(previous) = self.timers.insert(device_id, token.clone()) {
            previous.cancel();
        }

        let window = self.window;
        let refresh_tx = self.refresh_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {}
                () = token.cancelled() => {}
                () = tokio::time::sleep(window) => {
                    trace!(%device_id, "debounce window elapsed");
                    let _ = refresh_tx
                        .send(RefreshTrigger::PostCommand { device_id })
                        .await;
                }
            }
        });
    }

    /// Called by the sync loop after every snapshot apply: confirmed
    /// state supersedes any recorded in-flight targets.
    pub(crate) fn on_snapshot_applied(&self) {
        self.pending.clear();
    }

    /// Cancel all pending debounce timers. Called on disconnect so no
    /// timer fires against a torn-down client.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
        for entry in self.timers.iter() {
            entry.value().cancel();
        }
        self.timers.clear();
    }
}
