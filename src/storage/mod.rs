pub mod controller;
pub mod loop_worker;
pub mod monitor;
pub mod probe;

pub use controller::MonitorController;
pub use monitor::{
    format_bytes, StorageMonitor, StorageThresholds, DEFAULT_MAX_LOG_AGE, EMERGENCY_TARGET_BYTES,
    LOW_SPACE_THRESHOLD_BYTES,
};
pub use probe::{DiskSpace, SpaceProbe, SysinfoProbe};
