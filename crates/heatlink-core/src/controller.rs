// ── Controller abstraction ──
//
// Full lifecycle management for one cloud account connection:
// authentication, the periodic state-sync loop, capability-gated
// sub-polls (ambient sensor, energy), command dispatch, and reactive
// snapshot publication through the DeviceStore.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use heatlink_api::{CloudClient, Measure, TelemetrySeries, TransportConfig};

use crate::config::ControllerConfig;
use crate::dispatch::{ControlDispatcher, RefreshTrigger};
use crate::energy::{EnergyAccumulator, unit_factor};
use crate::error::CoreError;
use crate::model::{AmbientReading, Device};
use crate::persist::{EnergyStore, JsonFileStore};
use crate::store::DeviceStore;

const REFRESH_CHANNEL_SIZE: usize = 16;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Manages the full
/// lifecycle: [`connect()`](Self::connect) authenticates, loads an
/// initial snapshot, and spawns the background sync and sub-poll
/// tasks; [`apply()`](Self::apply) routes control intent through the
/// dispatcher's dedup/retry/debounce policy.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    store: Arc<DeviceStore>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection -- cancelled on
    /// disconnect, replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    client: Mutex<Option<CloudClient>>,
    dispatcher: Mutex<Option<Arc<ControlDispatcher>>>,
    energy: Mutex<Option<Arc<Mutex<EnergyAccumulator>>>>,
    energy_store: Option<Arc<dyn EnergyStore>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller from configuration. Does NOT connect --
    /// call [`connect()`](Self::connect) to authenticate and start the
    /// background tasks.
    ///
    /// If `config.energy_store_path` is set, energy state persists to
    /// a JSON file there; use [`with_energy_store`](Self::with_energy_store)
    /// to plug in host-managed storage instead.
    pub fn new(config: ControllerConfig) -> Self {
        let file_store = config
            .energy_store_path
            .as_ref()
            .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn EnergyStore>);
        Self::build(config, file_store)
    }

    /// Create a controller with a custom energy storage backend.
    pub fn with_energy_store(config: ControllerConfig, store: Arc<dyn EnergyStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: ControllerConfig, energy_store: Option<Arc<dyn EnergyStore>>) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ControllerInner {
                config,
                store: Arc::new(DeviceStore::new()),
                connection_state,
                cancel: CancellationToken::new(),
                cancel_child: Mutex::new(CancellationToken::new()),
                client: Mutex::new(None),
                dispatcher: Mutex::new(None),
                energy: Mutex::new(None),
                energy_store,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Access the controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Access the underlying device store.
    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Connect to the cloud.
    ///
    /// Authenticates, reloads persisted energy state, performs the
    /// initial snapshot fetch, and spawns the background tasks
    /// (sync loop, ambient sub-poll, energy poll).
    pub async fn connect(&self) -> Result<(), CoreError> {
        let _ = self.inner.connection_state.send(ConnectionState::Connecting);

        // Fresh child token for this connection (supports reconnect).
        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let config = &self.inner.config;
        let transport = TransportConfig {
            timeout: config.timeout,
            ..TransportConfig::default()
        };
        let client = match CloudClient::new(
            config.base_url.clone(),
            config.credentials.clone(),
            &transport,
        ) {
            Ok(client) => client,
            Err(e) => {
                let _ = self.inner.connection_state.send(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        if let Err(e) = client.session().login().await {
            let _ = self.inner.connection_state.send(ConnectionState::Disconnected);
            return Err(e.into());
        }
        debug!("cloud authentication successful");

        // Reload persisted energy state before the first poll so
        // in-progress hour buckets resume instead of re-crediting.
        let persisted = match &self.inner.energy_store {
            Some(store) => store.load()?,
            None => crate::persist::PersistedEnergy::default(),
        };
        let accumulator = Arc::new(Mutex::new(EnergyAccumulator::from_persisted(
            config.energy_retention,
            persisted,
        )));
        *self.inner.energy.lock().await = Some(Arc::clone(&accumulator));

        let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_CHANNEL_SIZE);
        let dispatcher = Arc::new(ControlDispatcher::new(
            client.clone(),
            Arc::clone(&self.inner.store),
            refresh_tx,
            config.debounce_window,
        ));
        *self.inner.client.lock().await = Some(client);
        *self.inner.dispatcher.lock().await = Some(dispatcher);

        // Initial data load
        if let Err(e) = self.sync_once().await {
            let _ = self.inner.connection_state.send(ConnectionState::Disconnected);
            return Err(e);
        }

        // Spawn background tasks
        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(refresh_task(
            self.clone(),
            config.poll_interval,
            refresh_rx,
            child.clone(),
        )));
        handles.push(tokio::spawn(telemetry_poll_task(
            self.clone(),
            config.poll_interval,
            config.telemetry_interval,
            child.clone(),
        )));
        handles.push(tokio::spawn(energy_poll_task(
            self.clone(),
            config.poll_interval,
            child,
        )));
        drop(handles);

        let _ = self.inner.connection_state.send(ConnectionState::Connected);
        info!(devices = self.inner.store.device_count(), "connected to cloud");
        Ok(())
    }

    /// Disconnect from the cloud.
    ///
    /// Cancels the background tasks and all pending debounce timers
    /// (none may fire against a torn-down client), then drops the
    /// session.
    pub async fn disconnect(&self) {
        // Cancel the child token (not the parent -- allows reconnect).
        self.inner.cancel_child.lock().await.cancel();

        if let Some(dispatcher) = self.inner.dispatcher.lock().await.take() {
            dispatcher.shutdown();
        }

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        if let Some(client) = self.inner.client.lock().await.take() {
            client.session().invalidate();
        }
        *self.inner.energy.lock().await = None;

        let _ = self.inner.connection_state.send(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// The current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    // ── Control ──────────────────────────────────────────────────

    /// Apply one field change to one device through the dispatch
    /// policy: dedup, one retry on session expiry, debounced refresh.
    pub async fn apply(
        &self,
        device_id: Uuid,
        field: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let dispatcher = self
            .inner
            .dispatcher
            .lock()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(CoreError::ControllerDisconnected)?;
        dispatcher.apply(device_id, field, value).await
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The current merged device snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.inner.store.snapshot()
    }

    /// Subscribe to snapshot updates (one notification per sync
    /// cycle, including debounce-triggered out-of-band refreshes).
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Device>>>> {
        self.inner.store.subscribe()
    }

    /// One device by id.
    pub fn device(&self, device_id: &Uuid) -> Option<Arc<Device>> {
        self.inner.store.device(device_id)
    }

    /// Observable sync-loop health (staleness after a failed cycle).
    pub fn sync_health(&self) -> crate::store::SyncHealth {
        self.inner.store.health()
    }

    /// The accumulated energy total for a device, in kWh.
    pub async fn energy_total_kwh(&self, device_id: &Uuid) -> Option<f64> {
        let accumulator = self.inner.energy.lock().await.as_ref().map(Arc::clone)?;
        let total = accumulator.lock().await.total_kwh(device_id);
        Some(total)
    }

    // ── Sync cycle ───────────────────────────────────────────────

    /// One full state-sync cycle: fetch the combined snapshot and
    /// replace every device's cached state wholesale.
    ///
    /// A session expiry re-authenticates (single-flight) and retries
    /// the fetch exactly once.
    async fn sync_once(&self) -> Result<(), CoreError> {
        let Some(client) = self.client_handle().await else {
            return Err(CoreError::ControllerDisconnected);
        };

        let context = match client.fetch_user_context().await {
            Err(e) if e.is_auth_expired() => {
                debug!("session expired during sync, re-authenticating");
                client.session().invalidate();
                client.session().ensure_valid().await?;
                client.fetch_user_context().await?
            }
            other => other?,
        };

        let fetched_at = Utc::now();
        let devices: Vec<Device> = context
            .devices
            .into_iter()
            .map(|entry| Device::from_entry(entry, fetched_at))
            .collect();

        trace!(devices = devices.len(), "applying snapshot");
        self.inner.store.apply_snapshot(devices);

        if let Some(dispatcher) = self.inner.dispatcher.lock().await.as_ref() {
            dispatcher.on_snapshot_applied();
        }
        Ok(())
    }

    /// Clone the client out of its lock (released before any await).
    async fn client_handle(&self) -> Option<CloudClient> {
        self.inner.client.lock().await.as_ref().cloned()
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// The sync loop: a full refresh every `period`, plus out-of-band
/// refreshes when a device's post-command debounce window elapses.
async fn refresh_task(
    controller: Controller,
    period: Duration,
    mut refresh_rx: mpsc::Receiver<RefreshTrigger>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!("scheduled refresh tick");
            }
            trigger = refresh_rx.recv() => {
                match trigger {
                    Some(RefreshTrigger::PostCommand { device_id }) => {
                        debug!(%device_id, "post-command refresh");
                    }
                    None => break,
                }
                // Coalesce triggers that queued up while we were busy:
                // one fetch confirms all of them.
                while refresh_rx.try_recv().is_ok() {}
            }
        }

        if let Err(e) = controller.sync_once().await {
            warn!(error = %e, "state sync failed, keeping previous snapshot");
            controller.inner.store.mark_stale();
        }
    }
}

/// Per-device capability probe state for an optional telemetry series.
enum ProbeState {
    /// The device answered "no such series" -- never probed again.
    Unsupported,
    /// The series exists; re-polled on the slow cadence.
    Supported { last_polled: DateTime<Utc> },
}

/// Capability-gated ambient-sensor sub-poll.
///
/// First encounter of a device costs one probe; devices that
/// structurally lack the series are marked and never asked again,
/// supported ones are re-polled every `cadence`. Failures leave the
/// probe state unchanged and never abort the main sync loop.
async fn telemetry_poll_task(
    controller: Controller,
    check_period: Duration,
    cadence: Duration,
    cancel: CancellationToken,
) {
    let cadence = chrono::Duration::from_std(cadence)
        .unwrap_or_else(|_| chrono::Duration::minutes(30));
    let mut probes: HashMap<Uuid, ProbeState> = HashMap::new();
    let mut interval = tokio::time::interval(check_period);
    // First tick fires immediately: probe the fleet right after connect.

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(client) = controller.client_handle().await else {
            continue;
        };

        let now = Utc::now();
        let due: Vec<Arc<Device>> = controller
            .inner
            .store
            .snapshot()
            .iter()
            .filter(|device| match probes.get(&device.id) {
                None => true,
                Some(ProbeState::Unsupported) => false,
                Some(ProbeState::Supported { last_polled }) => now - *last_polled >= cadence,
            })
            .map(Arc::clone)
            .collect();
        if due.is_empty() {
            continue;
        }

        let futs = due.iter().map(|device| {
            let client = client.clone();
            let id = device.id;
            async move {
                let from = now - chrono::Duration::hours(1);
                (id, client.fetch_telemetry(id, Measure::Ambient, from, now).await)
            }
        });
        let results = futures_util::future::join_all(futs).await;

        for (device_id, result) in results {
            match result {
                Ok(TelemetrySeries::Unavailable) => {
                    debug!(device = %device_id, "ambient series absent, disabling probe");
                    probes.insert(device_id, ProbeState::Unsupported);
                }
                Ok(TelemetrySeries::Available(points)) => {
                    probes.insert(device_id, ProbeState::Supported { last_polled: now });
                    if let Some(point) = points.last() {
                        controller.inner.store.set_ambient(
                            device_id,
                            AmbientReading {
                                temperature_c: point.value,
                                measured_at: point.timestamp,
                            },
                        );
                    }
                }
                Err(e) => {
                    // Probe state untouched: retried on the next tick.
                    debug!(device = %device_id, error = %e, "ambient sub-poll failed");
                }
            }
        }
    }
}

/// Energy sub-poll: fetch each reporting device's hourly buckets over
/// the retention window, fold them through the accumulator, persist.
///
/// Per-device failures are logged and never affect other devices or
/// the main sync loop.
async fn energy_poll_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut unsupported: HashSet<Uuid> = HashSet::new();
    let mut interval = tokio::time::interval(period);
    // First tick fires immediately: establish baselines early.

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(client) = controller.client_handle().await else {
            continue;
        };
        let Some(accumulator) = controller.inner.energy.lock().await.as_ref().map(Arc::clone)
        else {
            continue;
        };

        let now = Utc::now();
        let window = controller.inner.config.energy_retention;
        let from = now
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(48));

        let due: Vec<Arc<Device>> = controller
            .inner
            .store
            .snapshot()
            .iter()
            .filter(|d| d.capabilities.has_energy_reporting && !unsupported.contains(&d.id))
            .map(Arc::clone)
            .collect();
        if due.is_empty() {
            continue;
        }

        let futs = due.iter().map(|device| {
            let client = client.clone();
            let id = device.id;
            let family = device.family;
            async move {
                (
                    id,
                    family,
                    client.fetch_telemetry(id, Measure::Energy, from, now).await,
                )
            }
        });
        let results = futures_util::future::join_all(futs).await;

        let mut changed = false;
        for (device_id, family, result) in results {
            match result {
                Ok(TelemetrySeries::Unavailable) => {
                    debug!(device = %device_id, "energy series absent, disabling poll");
                    unsupported.insert(device_id);
                }
                Ok(TelemetrySeries::Available(points)) => {
                    let factor = unit_factor(family);
                    let observations: Vec<(DateTime<Utc>, f64)> = points
                        .iter()
                        .map(|p| (p.timestamp, p.value * factor))
                        .collect();
                    let summary = accumulator
                        .lock()
                        .await
                        .ingest(device_id, &observations, now);
                    changed = changed
                        || summary.applied_kwh > 0.0
                        || summary.new_buckets > 0;
                }
                Err(e) => {
                    debug!(device = %device_id, error = %e, "energy poll failed");
                }
            }
        }

        // Durably save after every poll so a restart resumes
        // in-progress buckets instead of re-crediting them.
        let store = controller.inner.energy_store.as_ref().filter(|_| changed);
        if let Some(store) = store {
            let state = accumulator.lock().await.to_persisted();
            if let Err(e) = store.save(&state) {
                warn!(error = %e, "energy state save failed");
            }
        }
    }
}
