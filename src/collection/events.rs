use serde::Serialize;

use crate::models::{EmergencyCleanupResult, Reading, SessionRecord, StorageStats};

use super::state::CollectionStatus;

/// Everything the paired device can deliver, funnelled through one queue so
/// the controller handles events strictly one at a time.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Reading(Reading),
    StartRequested(String),
    StopRequested,
}

/// Notifications for whoever watches the collector (UI, CLI, tests).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CollectionEvent {
    StateChanged { status: CollectionStatus },
    SessionStarted(SessionRecord),
    SessionCompleted(SessionRecord),
    #[serde(rename_all = "camelCase")]
    LowBattery { level: u8 },
    #[serde(rename_all = "camelCase")]
    CriticalBattery { level: u8 },
    /// Emergency cleanup ran after a failed append and recovered enough space.
    StorageWarning(EmergencyCleanupResult),
    LowStorage(StorageStats),
    #[serde(rename_all = "camelCase")]
    StorageExhausted { free_space: u64 },
    DeviceFault { message: String },
    Error { message: String },
}
