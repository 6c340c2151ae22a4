use std::{
    fs,
    path::PathBuf,
    sync::Arc,
    time::{Duration, SystemTime},
};

use log::{info, warn};

use crate::error::{CollectorError, Result};
use crate::models::{EmergencyCleanupResult, StorageStats};
use crate::store::{LogFileInfo, LogStore};

use super::probe::{DiskSpace, SpaceProbe, SysinfoProbe};

const MB: u64 = 1024 * 1024;
pub const LOW_SPACE_THRESHOLD_BYTES: u64 = 100 * MB;
pub const EMERGENCY_TARGET_BYTES: u64 = 200 * MB;
pub const DEFAULT_MAX_LOG_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const WRITE_PROBE_NAME: &str = ".write_probe";
// A staging file older than this is never renamed into place.
const STAGING_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageThresholds {
    /// Below this much free space the volume counts as low.
    pub low_space_bytes: u64,
    /// Emergency cleanup stops once free space reaches this.
    pub emergency_target_bytes: u64,
}

impl Default for StorageThresholds {
    fn default() -> Self {
        Self {
            low_space_bytes: LOW_SPACE_THRESHOLD_BYTES,
            emergency_target_bytes: EMERGENCY_TARGET_BYTES,
        }
    }
}

/// Free-space accounting and eviction over the files a `LogStore` owns.
#[derive(Clone)]
pub struct StorageMonitor {
    store: LogStore,
    probe: Arc<dyn SpaceProbe>,
    thresholds: StorageThresholds,
}

impl StorageMonitor {
    pub fn new(store: LogStore) -> Self {
        Self::with_probe(store, Arc::new(SysinfoProbe), StorageThresholds::default())
    }

    pub fn with_probe(
        store: LogStore,
        probe: Arc<dyn SpaceProbe>,
        thresholds: StorageThresholds,
    ) -> Self {
        Self {
            store,
            probe,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> StorageThresholds {
        self.thresholds
    }

    fn disk_space(&self) -> Result<DiskSpace> {
        self.probe
            .space(self.store.root())
            .map_err(|e| CollectorError::io_at("querying free space for", self.store.root(), e))
    }

    pub fn free_space(&self) -> Result<u64> {
        Ok(self.disk_space()?.free)
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let space = self.disk_space()?;
        let files = self.store.list_log_files()?;

        Ok(StorageStats {
            total_space: space.total,
            free_space: space.free,
            used_space: space.total.saturating_sub(space.free),
            app_data_size: files.iter().map(|f| f.size_bytes).sum(),
            file_count: files.len(),
            is_low_space: space.free < self.thresholds.low_space_bytes,
        })
    }

    pub fn is_low_space(&self) -> Result<bool> {
        Ok(self.free_space()? < self.thresholds.low_space_bytes)
    }

    /// True when the log directory exists (or can be created) and accepts writes.
    pub fn is_storage_available(&self) -> bool {
        if let Err(err) = self.store.ensure_dir() {
            warn!("storage unavailable: {err}");
            return false;
        }
        let probe = self.store.root().join(WRITE_PROBE_NAME);
        match fs::write(&probe, b"ok") {
            Ok(()) => {
                if let Err(err) = fs::remove_file(&probe) {
                    warn!("could not remove write check {}: {err}", probe.display());
                }
                true
            }
            Err(err) => {
                warn!("storage at {} is not writable: {err}", self.store.root().display());
                false
            }
        }
    }

    /// Deletes every log file last modified more than `max_age` ago, along
    /// with header staging files abandoned by an interrupted create.
    /// A failed delete is logged and the scan carries on.
    pub fn cleanup_older_than(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut deleted = 0;

        let swept = self.store.sweep_staging(STAGING_GRACE)?;
        if swept > 0 {
            info!("removed {swept} abandoned staging files");
        }

        for file in self.store.list_log_files()? {
            let age = now.duration_since(file.modified).unwrap_or(Duration::ZERO);
            if age <= max_age {
                continue;
            }
            match self.store.delete(&file.path) {
                Ok(()) => deleted += 1,
                Err(err) => warn!("cleanup could not delete {}: {err}", file.path.display()),
            }
        }

        if deleted > 0 {
            info!("routine cleanup removed {deleted} log files older than {max_age:?}");
        }
        Ok(deleted)
    }

    pub fn emergency_cleanup(&self) -> Result<EmergencyCleanupResult> {
        self.emergency_cleanup_excluding(&[])
    }

    /// Deletes log files oldest first until free space reaches the emergency
    /// target, re-reading free space after every deletion. Paths in `keep`
    /// are never deleted.
    pub fn emergency_cleanup_excluding(&self, keep: &[PathBuf]) -> Result<EmergencyCleanupResult> {
        let mut candidates: Vec<LogFileInfo> = self
            .store
            .list_log_files()?
            .into_iter()
            .filter(|file| !keep.contains(&file.path))
            .collect();
        candidates.sort_by_key(|file| file.modified);

        let mut result = EmergencyCleanupResult {
            final_free_space: self.free_space()?,
            ..Default::default()
        };

        for file in candidates {
            if result.final_free_space >= self.thresholds.emergency_target_bytes {
                break;
            }
            match self.store.delete(&file.path) {
                Ok(()) => {
                    result.files_deleted += 1;
                    result.space_freed += file.size_bytes;
                }
                Err(err) => {
                    warn!("emergency cleanup could not delete {}: {err}", file.path.display());
                    continue;
                }
            }
            result.final_free_space = self.free_space()?;
        }

        warn!(
            "emergency cleanup removed {} files ({}), {} free",
            result.files_deleted,
            format_bytes(result.space_freed),
            format_bytes(result.final_free_space)
        );
        Ok(result)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BiometricReading, Reading};
    use std::{fs::File, io, path::Path};
    use tempfile::TempDir;

    /// Free space grows as log files are removed from the watched directory.
    struct DirBackedProbe {
        total: u64,
        free_without_logs: u64,
        dir: PathBuf,
    }

    impl SpaceProbe for DirBackedProbe {
        fn space(&self, _path: &Path) -> io::Result<DiskSpace> {
            let used: u64 = fs::read_dir(&self.dir)?
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum();
            Ok(DiskSpace {
                total: self.total,
                free: self.free_without_logs.saturating_sub(used),
            })
        }
    }

    fn reading(session_id: &str) -> Reading {
        Reading::Biometric(BiometricReading {
            timestamp: 1,
            session_id: session_id.into(),
            device_id: "d".into(),
            heart_rate: Some(70),
            step_count: 1,
            calories: 0.5,
            skin_temperature: None,
            battery_level: 90,
        })
    }

    /// Writes a log of exactly `size` bytes aged `age` into the past.
    fn aged_log(store: &LogStore, session_id: &str, size: u64, age: Duration) -> PathBuf {
        let path = store.append(session_id, &reading(session_id)).unwrap();
        store.release(session_id);
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(size).unwrap();
        drop(file);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    fn monitor(dir: &TempDir, free_without_logs: u64, thresholds: StorageThresholds) -> StorageMonitor {
        let store = LogStore::new(dir.path());
        let probe = DirBackedProbe {
            total: 10_000,
            free_without_logs,
            dir: dir.path().to_path_buf(),
        };
        StorageMonitor::with_probe(store, Arc::new(probe), thresholds)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_stats_accounts_for_logs() {
        let dir = TempDir::new().unwrap();
        let thresholds = StorageThresholds {
            low_space_bytes: 5_000,
            emergency_target_bytes: 6_000,
        };
        let monitor = monitor(&dir, 8_000, thresholds);
        let store = LogStore::new(dir.path());
        aged_log(&store, "session_a", 1_000, HOUR);
        aged_log(&store, "session_b", 2_500, HOUR);
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let stats = monitor.stats().unwrap();
        assert_eq!(stats.total_space, 10_000);
        assert_eq!(stats.free_space, 4_500);
        assert_eq!(stats.used_space, 5_500);
        assert_eq!(stats.app_data_size, 3_500);
        assert_eq!(stats.file_count, 2);
        assert!(stats.is_low_space);
    }

    #[test]
    fn test_cleanup_older_than_deletes_only_expired() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, 1_000_000, StorageThresholds::default());
        let store = LogStore::new(dir.path());

        let old = aged_log(&store, "session_old", 10, 8 * 24 * HOUR);
        let older = aged_log(&store, "session_older", 10, 30 * 24 * HOUR);
        let fresh = aged_log(&store, "session_new", 10, 2 * HOUR);
        let edge = aged_log(&store, "session_edge", 10, 6 * 24 * HOUR);
        let staging = dir.path().join("inertial_session_cut_1.csv.tmp");
        fs::write(&staging, b"timestamp").unwrap();
        File::options()
            .write(true)
            .open(&staging)
            .unwrap()
            .set_modified(SystemTime::now() - HOUR)
            .unwrap();

        let deleted = monitor.cleanup_older_than(DEFAULT_MAX_LOG_AGE).unwrap();

        assert_eq!(deleted, 2);
        assert!(!staging.exists());
        assert!(!old.exists());
        assert!(!older.exists());
        assert!(fresh.exists());
        assert!(edge.exists());
    }

    #[test]
    fn test_emergency_cleanup_oldest_first_and_stops_at_target() {
        let dir = TempDir::new().unwrap();
        let thresholds = StorageThresholds {
            low_space_bytes: 3_000,
            emergency_target_bytes: 5_000,
        };
        let monitor = monitor(&dir, 8_000, thresholds);
        let store = LogStore::new(dir.path());

        let newest = aged_log(&store, "session_c", 2_000, HOUR);
        let oldest = aged_log(&store, "session_a", 2_000, 3 * HOUR);
        let middle = aged_log(&store, "session_b", 2_000, 2 * HOUR);
        assert_eq!(monitor.free_space().unwrap(), 2_000);

        let result = monitor.emergency_cleanup().unwrap();

        // 2_000 -> 4_000 -> 6_000 crosses the target after two deletions.
        assert_eq!(result.files_deleted, 2);
        assert_eq!(result.space_freed, 4_000);
        assert_eq!(result.final_free_space, 6_000);
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(newest.exists());
    }

    #[test]
    fn test_emergency_cleanup_noop_when_already_above_target() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&dir, 1_000_000, StorageThresholds::default());
        let store = LogStore::new(dir.path());
        let path = aged_log(&store, "session_a", 100, HOUR);

        let result = monitor.emergency_cleanup().unwrap();
        assert_eq!(result.files_deleted, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_emergency_cleanup_skips_kept_paths() {
        let dir = TempDir::new().unwrap();
        let thresholds = StorageThresholds {
            low_space_bytes: 3_000,
            emergency_target_bytes: 9_000,
        };
        let monitor = monitor(&dir, 8_000, thresholds);
        let store = LogStore::new(dir.path());
        let active = aged_log(&store, "session_live", 1_000, 5 * HOUR);
        let other = aged_log(&store, "session_old", 1_000, HOUR);

        let result = monitor
            .emergency_cleanup_excluding(&[active.clone()])
            .unwrap();

        assert_eq!(result.files_deleted, 1);
        assert!(active.exists());
        assert!(!other.exists());
        assert!(result.final_free_space < thresholds.emergency_target_bytes);
    }

    #[test]
    fn test_storage_available_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path().join("logs"));
        let monitor = StorageMonitor::with_probe(
            store.clone(),
            Arc::new(SysinfoProbe),
            StorageThresholds::default(),
        );
        assert!(monitor.is_storage_available());
        assert!(store.root().is_dir());
        assert!(store.list_log_files().unwrap().is_empty());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(200 * MB), "200.0 MB");
    }
}
