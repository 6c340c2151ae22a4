use serde::{Deserialize, Serialize};

/// Point-in-time view of the volume holding the log directory. Recomputed on
/// every call to `StorageMonitor::stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_space: u64,
    pub free_space: u64,
    pub used_space: u64,
    pub app_data_size: u64,
    pub file_count: usize,
    pub is_low_space: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCleanupResult {
    pub files_deleted: usize,
    /// Sum of the sizes of the deleted files.
    pub space_freed: u64,
    pub final_free_space: u64,
}
