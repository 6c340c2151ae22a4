use std::{io, sync::Arc, time::Duration};

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CollectorError, PreconditionFailure, Result},
    models::{Reading, SessionRecord},
    session::{is_well_formed_session_id, SessionManager},
    storage::{format_bytes, MonitorController, StorageMonitor, DEFAULT_MAX_LOG_AGE},
    store::LogStore,
};

use super::{
    device::DeviceLink,
    events::{CollectionEvent, DeviceEvent},
    state::{CollectionState, CollectionStatus},
};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct CollectionSettings {
    /// Readings below this level stop an active session.
    pub battery_critical_percent: u8,
    /// Readings below this level (and at or above critical) raise a warning.
    pub battery_low_percent: u8,
    /// Routine cleanup horizon used when starting on a low volume.
    pub max_log_age: Duration,
    pub monitor_interval: Duration,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            battery_critical_percent: 15,
            battery_low_percent: 20,
            max_log_age: DEFAULT_MAX_LOG_AGE,
            monitor_interval: Duration::from_secs(30),
        }
    }
}

/// Drives one collection session at a time: gates start on device and
/// storage health, routes readings into the log store while collecting and
/// stops on its own when the battery or the volume gives out.
#[derive(Clone)]
pub struct CollectionController {
    state: Arc<Mutex<CollectionState>>,
    snapshot_tx: Arc<watch::Sender<CollectionState>>,
    events: broadcast::Sender<CollectionEvent>,
    device: Arc<dyn DeviceLink>,
    sessions: SessionManager,
    store: LogStore,
    monitor: StorageMonitor,
    storage_watch: Arc<Mutex<MonitorController>>,
    settings: CollectionSettings,
}

impl CollectionController {
    pub fn new(
        device: Arc<dyn DeviceLink>,
        store: LogStore,
        monitor: StorageMonitor,
        settings: CollectionSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot_tx, _) = watch::channel(CollectionState::new());

        Self {
            state: Arc::new(Mutex::new(CollectionState::new())),
            snapshot_tx: Arc::new(snapshot_tx),
            events,
            device,
            sessions: SessionManager::new(),
            store,
            monitor,
            storage_watch: Arc::new(Mutex::new(MonitorController::new())),
            settings,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.events.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<CollectionState> {
        self.snapshot_tx.subscribe()
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub async fn snapshot(&self) -> CollectionState {
        self.state.lock().await.clone()
    }

    pub async fn status(&self) -> CollectionStatus {
        self.state.lock().await.status
    }

    /// Starts the periodic storage check. It keeps running across sessions
    /// until `shutdown`.
    pub async fn start_monitoring(&self) -> anyhow::Result<()> {
        self.storage_watch.lock().await.start(
            self.monitor.clone(),
            self.settings.monitor_interval,
            self.events.clone(),
        )
    }

    pub async fn start_collection(&self) -> Result<SessionRecord> {
        self.start_session(None).await
    }

    /// Start requested from the device side. A well-formed id from the device
    /// is kept so its readings land under the session they claim.
    pub async fn start_requested(&self, session_id: String) -> Result<SessionRecord> {
        if is_well_formed_session_id(&session_id) {
            self.start_session(Some(session_id)).await
        } else {
            warn!("ignoring malformed session id {session_id:?} from device");
            self.start_session(None).await
        }
    }

    async fn start_session(&self, requested: Option<String>) -> Result<SessionRecord> {
        {
            let mut state = self.state.lock().await;
            if state.status != CollectionStatus::Idle {
                drop(state);
                let err = CollectorError::from(PreconditionFailure::AlreadyCollecting);
                self.report(&err);
                return Err(err);
            }
            state.begin_starting();
            self.publish(&state);
        }

        match self.open_session(requested).await {
            Ok(record) => Ok(record),
            Err(err) => {
                {
                    let mut state = self.state.lock().await;
                    state.abort_start();
                    self.publish(&state);
                }
                self.report(&err);
                Err(err)
            }
        }
    }

    async fn open_session(&self, requested: Option<String>) -> Result<SessionRecord> {
        if !self.device.is_connected().await {
            return Err(PreconditionFailure::NotConnected.into());
        }

        self.check_storage().await?;

        let device_id = self.device.device_id();
        let record = match requested {
            Some(id) => self.sessions.create_with_id(id, &device_id),
            None => self.sessions.create(&device_id),
        };

        if !self.device.start_streaming(&record.session_id).await {
            return Err(CollectorError::DeviceFault(format!(
                "device did not acknowledge start of {}",
                record.session_id
            )));
        }

        {
            let mut state = self.state.lock().await;
            state.begin_session(record.clone());
            self.publish(&state);
        }

        info!(
            "collection started: session {} on device {}",
            record.session_id, record.device_id
        );
        self.emit(CollectionEvent::SessionStarted(record.clone()));
        Ok(record)
    }

    /// Storage gate for a new session: the directory must be writable, and a
    /// low volume gets one routine cleanup before the start is refused.
    async fn check_storage(&self) -> Result<()> {
        let monitor = self.monitor.clone();
        let max_age = self.settings.max_log_age;

        blocking(move || {
            if !monitor.is_storage_available() {
                return Err(PreconditionFailure::StorageUnavailable.into());
            }
            if !monitor.is_low_space()? {
                return Ok(());
            }

            let removed = monitor.cleanup_older_than(max_age)?;
            info!("storage low before start; routine cleanup removed {removed} files");

            if monitor.is_low_space()? {
                return Err(PreconditionFailure::LowStorage.into());
            }
            Ok(())
        })
        .await
    }

    /// Stops streaming and closes the live session. A device that fails to
    /// acknowledge is reported, but the local session is completed anyway.
    pub async fn stop_collection(&self) -> Result<SessionRecord> {
        {
            let mut state = self.state.lock().await;
            let status = state.status;
            match status {
                CollectionStatus::Collecting | CollectionStatus::Stopping => {
                    state.begin_stopping();
                    self.publish(&state);
                }
                CollectionStatus::Idle | CollectionStatus::Starting => {
                    drop(state);
                    let err = CollectorError::from(PreconditionFailure::NotCollecting);
                    self.report(&err);
                    return Err(err);
                }
            }
        }

        if !self.device.stop_streaming().await {
            let err = CollectorError::DeviceFault("device did not acknowledge stop".into());
            self.report(&err);
        }

        let finished = {
            let mut state = self.state.lock().await;
            let finished = state.finish(Utc::now());
            self.publish(&state);
            finished
        };

        let Some(record) = finished else {
            return Err(PreconditionFailure::NotCollecting.into());
        };

        // No session is live past this point, so every handle goes, late ones included.
        self.store.release_all();
        info!(
            "collection stopped: session {} with {} data points",
            record.session_id, record.data_points_collected
        );
        self.emit(CollectionEvent::SessionCompleted(record.clone()));
        Ok(record)
    }

    /// Persists the reading while collecting, then checks its battery level.
    /// The battery check runs whatever the state.
    pub async fn on_reading_received(&self, reading: Reading) {
        let level = reading.battery_level();
        let collecting = {
            let mut state = self.state.lock().await;
            state.last_battery = Some(level);
            state.is_collecting()
        };

        if collecting {
            self.ingest(reading).await;
        }

        self.check_battery(level).await;
    }

    async fn ingest(&self, reading: Reading) {
        let store = self.store.clone();
        let session_id = reading.session_id().to_string();
        let appended = blocking(move || store.append(reading.session_id(), &reading)).await;

        let current = {
            let mut state = self.state.lock().await;
            let current = state.session_id() == Some(session_id.as_str());
            if current && appended.is_ok() {
                state.data_points += 1;
                self.publish(&state);
            }
            current
        };

        // Late rows from an earlier session are persisted but neither counted
        // nor kept open.
        if !current {
            self.store.release(&session_id);
        }

        if let Err(err) = appended {
            self.handle_append_failure(err).await;
        }
    }

    async fn handle_append_failure(&self, err: CollectorError) {
        error!("failed to persist reading: {err}");

        let monitor = self.monitor.clone();
        let keep = self.store.open_paths();
        let low_threshold = monitor.thresholds().low_space_bytes;

        let outcome = blocking(move || {
            if !monitor.is_low_space()? {
                return Ok(None);
            }
            monitor.emergency_cleanup_excluding(&keep).map(Some)
        })
        .await;

        match outcome {
            Ok(None) => self.report(&err),
            Ok(Some(result)) if result.final_free_space >= low_threshold => {
                warn!(
                    "emergency cleanup freed {} across {} files",
                    format_bytes(result.space_freed),
                    result.files_deleted
                );
                self.emit(CollectionEvent::StorageWarning(result));
            }
            Ok(Some(result)) => self.exhausted(result.final_free_space).await,
            Err(cleanup_err) => {
                error!("emergency cleanup failed: {cleanup_err}");
                self.exhausted(0).await;
            }
        }
    }

    async fn exhausted(&self, free_space: u64) {
        let err = CollectorError::StorageExhausted { free_space };
        error!("{err}; stopping collection");
        self.report(&err);
        if let Err(stop_err) = self.stop_collection().await {
            warn!("automatic stop after storage exhaustion failed: {stop_err}");
        }
    }

    async fn check_battery(&self, level: u8) {
        if level < self.settings.battery_critical_percent {
            warn!("battery critical at {level}%");
            self.emit(CollectionEvent::CriticalBattery { level });

            if self.status().await == CollectionStatus::Collecting {
                info!("stopping collection on critical battery");
                if let Err(err) = self.stop_collection().await {
                    warn!("automatic stop on critical battery failed: {err}");
                }
            }
        } else if level < self.settings.battery_low_percent {
            warn!("battery low at {level}%");
            self.emit(CollectionEvent::LowBattery { level });
        }
    }

    pub async fn handle_device_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Reading(reading) => self.on_reading_received(reading).await,
            DeviceEvent::StartRequested(session_id) => {
                let _ = self.start_requested(session_id).await;
            }
            DeviceEvent::StopRequested => {
                let _ = self.stop_collection().await;
            }
        }
    }

    /// Consumes device events one at a time until the channel closes or the
    /// token is cancelled, then shuts the controller down.
    pub async fn run_event_loop(
        &self,
        mut events: mpsc::Receiver<DeviceEvent>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_device_event(event).await,
                    None => {
                        info!("device event channel closed");
                        break;
                    }
                },
                _ = cancel_token.cancelled() => {
                    info!("collection event loop cancelled");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Cancels the storage monitor, closes any live session and drops every
    /// held file handle.
    pub async fn shutdown(&self) {
        if let Err(err) = self.storage_watch.lock().await.stop().await {
            error!("failed to stop storage monitor: {err:#}");
        }

        if matches!(
            self.status().await,
            CollectionStatus::Collecting | CollectionStatus::Stopping
        ) {
            if let Err(err) = self.stop_collection().await {
                warn!("stop during shutdown failed: {err}");
            }
        }

        self.store.release_all();
    }

    fn publish(&self, state: &CollectionState) {
        let previous = self.snapshot_tx.send_replace(state.clone());
        if previous.status != state.status {
            self.emit(CollectionEvent::StateChanged {
                status: state.status,
            });
        }
    }

    fn emit(&self, event: CollectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Turns a failure into a user-facing notification.
    fn report(&self, err: &CollectorError) {
        warn!("{err}");
        let event = match err {
            CollectorError::DeviceFault(message) => CollectionEvent::DeviceFault {
                message: message.clone(),
            },
            CollectorError::StorageExhausted { free_space } => CollectionEvent::StorageExhausted {
                free_space: *free_space,
            },
            CollectorError::Precondition(reason) => CollectionEvent::Error {
                message: reason.message().to_string(),
            },
            other => CollectionEvent::Error {
                message: other.to_string(),
            },
        };
        self.emit(event);
    }
}

/// Runs blocking filesystem work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join_err| CollectorError::io("running storage worker", io::Error::other(join_err)))?
}
