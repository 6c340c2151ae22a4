pub mod collection;
pub mod error;
pub mod history;
pub mod models;
pub mod session;
pub mod settings;
pub mod storage;
pub mod store;
pub mod utils;

use std::sync::Arc;

use anyhow::Context;
use log::info;

pub use collection::{
    CollectionController, CollectionEvent, CollectionSettings, CollectionState, CollectionStatus,
    DeviceEvent, DeviceLink, SimulatedDevice,
};
pub use error::{CollectorError, PreconditionFailure, Result};
pub use history::HistoryReconstructor;
pub use models::{
    BiometricReading, EmergencyCleanupResult, InertialReading, Reading, SessionRecord,
    SessionSummary, StorageStats, StreamKind, Vector3,
};
pub use session::SessionManager;
pub use settings::{Settings, SettingsStore};
pub use storage::{StorageMonitor, StorageThresholds, SysinfoProbe};
pub use store::LogStore;
pub use utils::init_logging;

/// Everything the collector needs that outlives a single device connection.
pub struct AppState {
    pub settings: SettingsStore,
    pub store: LogStore,
    pub monitor: StorageMonitor,
    pub history: HistoryReconstructor,
}

impl AppState {
    pub fn new(settings: SettingsStore) -> anyhow::Result<Self> {
        let current = settings.get();
        let log_dir = current.log_dir();

        let store = LogStore::new(&log_dir);
        store
            .ensure_dir()
            .with_context(|| format!("failed to prepare log directory {}", log_dir.display()))?;

        let monitor =
            StorageMonitor::with_probe(store.clone(), Arc::new(SysinfoProbe), current.thresholds());
        let history = HistoryReconstructor::new(store.clone());

        info!("log directory at {}", log_dir.display());

        Ok(Self {
            settings,
            store,
            monitor,
            history,
        })
    }

    pub fn controller(&self, device: Arc<dyn DeviceLink>) -> CollectionController {
        CollectionController::new(
            device,
            self.store.clone(),
            self.monitor.clone(),
            self.settings.get().collection(),
        )
    }
}
