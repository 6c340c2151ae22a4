//! Rebuilds session summaries from the log directory alone. There is no index:
//! sessions are grouped by file name and sized by counting rows.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use chrono::{DateTime, Utc};
use log::warn;

use crate::error::Result;
use crate::models::{SessionSummary, StreamKind, UNKNOWN_DEVICE};
use crate::store::{csv, naming, LogFileInfo, LogStore};

#[derive(Clone)]
pub struct HistoryReconstructor {
    store: LogStore,
}

impl HistoryReconstructor {
    pub fn new(store: LogStore) -> Self {
        Self { store }
    }

    /// One summary per session found on disk, newest start first.
    pub fn reconstruct(&self) -> Result<Vec<SessionSummary>> {
        let mut groups: HashMap<String, Vec<LogFileInfo>> = HashMap::new();
        for file in self.store.list_log_files()? {
            groups
                .entry(naming::group_key(&file.path))
                .or_default()
                .push(file);
        }

        let mut summaries: Vec<SessionSummary> = groups
            .into_iter()
            .filter_map(|(session_id, files)| summarize(session_id, files))
            .collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }
}

fn summarize(session_id: String, files: Vec<LogFileInfo>) -> Option<SessionSummary> {
    let start_time: DateTime<Utc> = files.iter().map(|f| f.modified).min()?.into();
    let end_time: DateTime<Utc> = files.iter().map(|f| f.modified).max()?.into();

    let data_points_collected = files.iter().map(|f| count_data_rows(&f.path)).sum();

    // With several files of one kind, the most recently written one is reported.
    let latest_of = |kind: StreamKind| {
        files
            .iter()
            .filter(|f| f.kind == Some(kind))
            .max_by_key(|f| f.modified)
            .map(|f| f.path.clone())
    };

    Some(SessionSummary {
        duration_ms: (end_time - start_time).num_milliseconds(),
        inertial_file_path: latest_of(StreamKind::Inertial),
        biometric_file_path: latest_of(StreamKind::Biometric),
        session_id,
        start_time,
        end_time,
        data_points_collected,
        device_id: UNKNOWN_DEVICE.to_string(),
    })
}

/// Lines after the header; an unreadable file counts as zero.
fn count_data_rows(path: &Path) -> u64 {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("history: skipping unreadable {}: {err}", path.display());
            return 0;
        }
    };

    let mut lines = BufReader::new(file).lines();
    let has_header = match lines.next() {
        None => return 0,
        Some(Ok(first)) => csv::is_header(&first),
        Some(Err(err)) => {
            warn!("history: skipping unreadable {}: {err}", path.display());
            return 0;
        }
    };

    let mut rows: u64 = if has_header { 0 } else { 1 };
    for line in lines {
        match line {
            Ok(line) if line.is_empty() => {}
            Ok(_) => rows += 1,
            Err(err) => {
                warn!("history: skipping unreadable {}: {err}", path.display());
                return 0;
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BiometricReading, InertialReading, Reading, Vector3};
    use std::{
        fs,
        time::{Duration, SystemTime},
    };
    use tempfile::TempDir;

    fn inertial(session_id: &str, timestamp: i64) -> Reading {
        Reading::Inertial(InertialReading {
            timestamp,
            session_id: session_id.into(),
            device_id: "test_device".into(),
            accelerometer: Vector3::new(0.12, -0.34, 9.81),
            gyroscope: Vector3::new(0.01, 0.02, -0.01),
            magnetometer: Vector3::new(45.2, -12.3, 8.7),
            battery_level: 85,
        })
    }

    fn biometric(session_id: &str, timestamp: i64) -> Reading {
        Reading::Biometric(BiometricReading {
            timestamp,
            session_id: session_id.into(),
            device_id: "test_device".into(),
            heart_rate: Some(72),
            step_count: 5,
            calories: 0.4,
            skin_temperature: None,
            battery_level: 85,
        })
    }

    fn set_age(path: &Path, age: Duration) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
    }

    #[test]
    fn test_groups_both_streams_of_a_session() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let inertial_path = store
            .write_batch(
                "session_001",
                StreamKind::Inertial,
                &[inertial("session_001", 1), inertial("session_001", 2)],
            )
            .unwrap();
        let biometric_path = store
            .write_batch("session_001", StreamKind::Biometric, &[biometric("session_001", 1)])
            .unwrap();
        set_age(&inertial_path, Duration::from_secs(120));
        set_age(&biometric_path, Duration::from_secs(60));

        let summaries = HistoryReconstructor::new(store).reconstruct().unwrap();

        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.session_id, "session_001");
        assert_eq!(summary.data_points_collected, 3);
        assert_eq!(summary.device_id, UNKNOWN_DEVICE);
        assert_eq!(summary.inertial_file_path.as_ref(), Some(&inertial_path));
        assert_eq!(summary.biometric_file_path.as_ref(), Some(&biometric_path));
        assert!(summary.end_time > summary.start_time);
        assert!((59_000..=61_000).contains(&summary.duration_ms));
    }

    #[test]
    fn test_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let old = store.append("session_old", &biometric("session_old", 1)).unwrap();
        let new = store.append("session_new", &biometric("session_new", 1)).unwrap();
        set_age(&old, Duration::from_secs(3600));
        set_age(&new, Duration::from_secs(10));

        let ids: Vec<String> = HistoryReconstructor::new(store)
            .reconstruct()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["session_new", "session_old"]);
    }

    #[test]
    fn test_unconventional_names_become_singletons() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("export.csv"), "a,b\n1,2\n3,4\n").unwrap();
        fs::write(
            dir.path().join("legacy_dump.csv"),
            format!("{}\n1,s,d,,1,0.5,,50\n", csv::BIOMETRIC_HEADER),
        )
        .unwrap();

        let mut summaries = HistoryReconstructor::new(LogStore::new(dir.path()))
            .reconstruct()
            .unwrap();
        summaries.sort_by(|a, b| a.session_id.cmp(&b.session_id));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id, "export");
        // No recognized header, so every line is data.
        assert_eq!(summaries[0].data_points_collected, 3);
        assert_eq!(summaries[0].inertial_file_path, None);
        assert_eq!(summaries[1].session_id, "legacy_dump");
        assert_eq!(summaries[1].data_points_collected, 1);
    }

    #[test]
    fn test_header_only_file_counts_zero() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("inertial_session_empty_1.csv"),
            format!("{}\n", csv::INERTIAL_HEADER),
        )
        .unwrap();

        let summaries = HistoryReconstructor::new(LogStore::new(dir.path()))
            .reconstruct()
            .unwrap();
        assert_eq!(summaries[0].session_id, "session_empty");
        assert_eq!(summaries[0].data_points_collected, 0);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let summaries = HistoryReconstructor::new(LogStore::new(dir.path()))
            .reconstruct()
            .unwrap();
        assert!(summaries.is_empty());
    }
}
