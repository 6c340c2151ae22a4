pub mod reading;
pub mod session;
pub mod storage;

pub use reading::{BiometricReading, InertialReading, Reading, StreamKind, Vector3};
pub use session::{SessionRecord, SessionSummary, UNKNOWN_DEVICE};
pub use storage::{EmergencyCleanupResult, StorageStats};
