//! Session-related data models.
//!
//! - `SessionRecord`: the live, controller-owned record of one collection interval.
//! - `SessionSummary`: a read-only aggregate rebuilt from log files on disk.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reported for sessions whose device cannot be recovered from file names.
pub const UNKNOWN_DEVICE: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub data_points_collected: u64,
    pub device_id: String,
}

impl SessionRecord {
    /// Closes the record. A record that is already inactive is left untouched
    /// and `false` is returned.
    pub fn complete(&mut self, ended_at: DateTime<Utc>, data_points: u64) -> bool {
        if !self.is_active {
            return false;
        }
        self.end_time = Some(ended_at);
        self.is_active = false;
        self.data_points_collected = data_points;
        true
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

/// Summary of a session as reconstructed from the log directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub data_points_collected: u64,
    pub device_id: String,
    pub inertial_file_path: Option<PathBuf>,
    pub biometric_file_path: Option<PathBuf>,
}
