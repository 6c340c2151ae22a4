use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::collection::CollectionSettings;
use crate::storage::{StorageThresholds, EMERGENCY_TARGET_BYTES, LOW_SPACE_THRESHOLD_BYTES};

const APP_DIR: &str = "wearlog";
const LOG_DIR: &str = "sensor_data";
const DEBUG_MONITOR_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the session logs; the platform data dir when unset.
    pub data_dir: Option<PathBuf>,
    pub low_space_threshold_bytes: u64,
    pub emergency_target_bytes: u64,
    pub max_log_age_secs: u64,
    pub monitor_interval_secs: u64,
    pub battery_critical_percent: u8,
    pub battery_low_percent: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            low_space_threshold_bytes: LOW_SPACE_THRESHOLD_BYTES,
            emergency_target_bytes: EMERGENCY_TARGET_BYTES,
            max_log_age_secs: 7 * 24 * 60 * 60,
            monitor_interval_secs: 30,
            battery_critical_percent: 15,
            battery_low_percent: 20,
        }
    }
}

impl Settings {
    /// Log directory after applying `WEARLOG_DATA_DIR`.
    pub fn log_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os("WEARLOG_DATA_DIR") {
            return PathBuf::from(dir);
        }
        self.data_dir.clone().unwrap_or_else(default_log_dir)
    }

    pub fn thresholds(&self) -> StorageThresholds {
        StorageThresholds {
            low_space_bytes: self.low_space_threshold_bytes,
            emergency_target_bytes: self.emergency_target_bytes,
        }
    }

    pub fn collection(&self) -> CollectionSettings {
        let debug_mode = std::env::var("WEARLOG_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let monitor_secs = if debug_mode {
            DEBUG_MONITOR_INTERVAL_SECS
        } else {
            self.monitor_interval_secs.max(1)
        };

        CollectionSettings {
            battery_critical_percent: self.battery_critical_percent,
            battery_low_percent: self.battery_low_percent,
            max_log_age: Duration::from_secs(self.max_log_age_secs),
            monitor_interval: Duration::from_secs(monitor_secs),
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(LOG_DIR)
}

pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("settings.json")
}

/// JSON-backed settings; missing files and unknown fields fall back to defaults.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring malformed settings at {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.get(), Settings::default());
        assert_eq!(store.get().thresholds(), StorageThresholds::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"battery_low_percent": 25}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().get();
        assert_eq!(settings.battery_low_percent, 25);
        assert_eq!(settings.battery_critical_percent, 15);
        assert_eq!(settings.max_log_age_secs, 604_800);
    }

    #[test]
    fn test_update_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.data_dir = Some(dir.path().join("logs"));
        settings.monitor_interval_secs = 60;
        store.update(settings.clone()).unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().get(), settings);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().get(), Settings::default());
    }
}
