//! Append-only, per-session CSV log files in one flat directory.
//!
//! The directory is the only source of truth: a file is found again after a
//! restart purely from its name, and every file carries its header from the
//! moment it becomes visible under its final name.

pub mod csv;
pub mod naming;

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use chrono::Utc;

use crate::error::{CollectorError, Result};
use crate::models::{Reading, StreamKind};

// Set to false to silence per-file logging from the store
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const CREATE_ATTEMPTS: i64 = 5;

/// Metadata for one recognized log file.
#[derive(Debug, Clone)]
pub struct LogFileInfo {
    pub path: PathBuf,
    pub kind: Option<StreamKind>,
    pub size_bytes: u64,
    pub modified: SystemTime,
}

struct OpenLog {
    path: PathBuf,
    file: File,
}

type WriterKey = (StreamKind, String);
type WriterSlot = Arc<Mutex<Option<OpenLog>>>;

struct StoreInner {
    root: PathBuf,
    writers: Mutex<HashMap<WriterKey, WriterSlot>>,
}

#[derive(Clone)]
pub struct LogStore {
    inner: Arc<StoreInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root: root.into(),
                writers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Creates the log directory if needed. Safe to call repeatedly.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(self.root())
            .map_err(|e| CollectorError::io_at("creating log directory", self.root(), e))
    }

    /// Writes `readings` into a brand-new file for `(kind, session_id)`.
    ///
    /// Nothing is rolled back on failure: a partially written file stays on
    /// disk, and every row that made it out is complete.
    pub fn write_batch(
        &self,
        session_id: &str,
        kind: StreamKind,
        readings: &[Reading],
    ) -> Result<PathBuf> {
        let (path, file) = self.create_with_header(kind, session_id)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0usize;

        for reading in readings {
            if reading.kind() != kind {
                log_warn!(
                    "skipping {} reading in {} batch for {}",
                    reading.kind(),
                    kind,
                    session_id
                );
                continue;
            }
            writeln!(writer, "{}", csv::encode_row(reading))
                .map_err(|e| CollectorError::io_at("writing batch to", &path, e))?;
            written += 1;
        }

        writer
            .flush()
            .map_err(|e| CollectorError::io_at("flushing batch to", &path, e))?;

        log_info!("wrote {} {} rows to {}", written, kind, path.display());
        Ok(path)
    }

    /// Appends one row to the session's file for the reading's stream,
    /// creating the file (header first) when none exists yet.
    ///
    /// Calls for the same `(kind, session_id)` are serialized; different
    /// sessions or streams never wait on each other.
    pub fn append(&self, session_id: &str, reading: &Reading) -> Result<PathBuf> {
        let kind = reading.kind();
        let slot = self.writer_slot(kind, session_id);
        let mut guard = lock(&slot);

        let mut open = match guard.take() {
            Some(open) if open.path.exists() => open,
            Some(open) => {
                log_warn!(
                    "{} disappeared while open, starting a new file",
                    open.path.display()
                );
                self.open_for_append(kind, session_id)?
            }
            None => self.open_for_append(kind, session_id)?,
        };

        let line = format!("{}\n", csv::encode_row(reading));
        let written = open
            .file
            .write_all(line.as_bytes())
            .and_then(|_| open.file.flush());
        let path = open.path.clone();
        *guard = Some(open);

        written.map_err(|e| CollectorError::io_at("appending to", &path, e))?;
        Ok(path)
    }

    /// Every file in the log directory with the log extension.
    pub fn list_log_files(&self) -> Result<Vec<LogFileInfo>> {
        self.ensure_dir()?;
        let entries = fs::read_dir(self.root())
            .map_err(|e| CollectorError::io_at("listing", self.root(), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CollectorError::io_at("listing", self.root(), e))?;
            let path = entry.path();
            if !naming::is_log_file(&path) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(err) => {
                    log_warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            files.push(LogFileInfo {
                kind: naming::stream_kind(&path),
                size_bytes: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                path,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// First file on disk belonging to `(kind, session_id)`, if any.
    pub fn find_log_file(&self, kind: StreamKind, session_id: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .list_log_files()?
            .into_iter()
            .map(|info| info.path)
            .find(|path| naming::matches(path, kind, session_id)))
    }

    /// All lines of a log file, header included.
    pub fn read_lines(&self, path: &Path) -> Result<Vec<String>> {
        let file = File::open(path).map_err(|e| CollectorError::io_at("opening", path, e))?;
        BufReader::new(file)
            .lines()
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| CollectorError::io_at("reading", path, e))
    }

    /// Deletes a log file and forgets any handle held for it.
    pub fn delete(&self, path: &Path) -> Result<()> {
        {
            let writers = lock(&self.inner.writers);
            for slot in writers.values() {
                let mut open = lock(slot);
                if open.as_ref().map(|o| o.path == path).unwrap_or(false) {
                    *open = None;
                }
            }
        }
        fs::remove_file(path).map_err(|e| CollectorError::io_at("deleting", path, e))
    }

    /// Deletes header staging files last touched more than `grace` ago.
    /// Younger ones may belong to a create still in flight and are left alone.
    pub fn sweep_staging(&self, grace: Duration) -> Result<usize> {
        self.ensure_dir()?;
        let entries = fs::read_dir(self.root())
            .map_err(|e| CollectorError::io_at("listing", self.root(), e))?;
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            if !naming::is_staging_file(&path) {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    log_warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            if now.duration_since(modified).unwrap_or(Duration::ZERO) <= grace {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    log_info!("removed abandoned staging file {}", path.display());
                    removed += 1;
                }
                Err(err) => log_warn!("could not remove {}: {err}", path.display()),
            }
        }
        Ok(removed)
    }

    /// Paths currently held open for appending.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        let writers = lock(&self.inner.writers);
        writers
            .values()
            .filter_map(|slot| lock(slot).as_ref().map(|open| open.path.clone()))
            .collect()
    }

    /// Drops cached handles for a finished session.
    pub fn release(&self, session_id: &str) {
        let mut writers = lock(&self.inner.writers);
        writers.retain(|(_, id), _| id != session_id);
    }

    /// Drops every cached handle.
    pub fn release_all(&self) {
        lock(&self.inner.writers).clear();
    }

    fn writer_slot(&self, kind: StreamKind, session_id: &str) -> WriterSlot {
        let mut writers = lock(&self.inner.writers);
        writers
            .entry((kind, session_id.to_string()))
            .or_default()
            .clone()
    }

    fn open_for_append(&self, kind: StreamKind, session_id: &str) -> Result<OpenLog> {
        let Some(path) = self.find_log_file(kind, session_id)? else {
            let (path, file) = self.create_with_header(kind, session_id)?;
            log_info!("created {}", path.display());
            return Ok(OpenLog { path, file });
        };

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| CollectorError::io_at("opening", &path, e))?;

        // A crash mid-row leaves the tail unterminated; start the next row on a fresh line.
        if !ends_with_newline(&mut file).map_err(|e| CollectorError::io_at("checking", &path, e))? {
            log_warn!("{} ends with a partial row, terminating it", path.display());
            file.write_all(b"\n")
                .map_err(|e| CollectorError::io_at("repairing", &path, e))?;
        }

        log_info!("reopened {} for appending", path.display());
        Ok(OpenLog { path, file })
    }

    /// Writes the header under a temporary name and renames it into place, so
    /// a file visible under a log name always starts with its header.
    fn create_with_header(&self, kind: StreamKind, session_id: &str) -> Result<(PathBuf, File)> {
        self.ensure_dir()?;
        let created_ms = Utc::now().timestamp_millis();

        for attempt in 0..CREATE_ATTEMPTS {
            let path = self
                .root()
                .join(naming::file_name(kind, session_id, created_ms + attempt));
            if path.exists() {
                continue;
            }

            let tmp = path.with_extension(format!(
                "{}.{}",
                naming::LOG_EXTENSION,
                naming::STAGING_EXTENSION
            ));
            let mut staging = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp)
                .map_err(|e| CollectorError::io_at("creating", &tmp, e))?;
            staging
                .write_all(format!("{}\n", csv::header(kind)).as_bytes())
                .and_then(|_| staging.sync_all())
                .map_err(|e| CollectorError::io_at("writing header to", &tmp, e))?;
            drop(staging);

            fs::rename(&tmp, &path).map_err(|e| CollectorError::io_at("renaming", &tmp, e))?;

            let file = OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| CollectorError::io_at("opening", &path, e))?;
            return Ok((path, file));
        }

        Err(CollectorError::io(
            format!("creating {kind} log for {session_id}"),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free file name for this timestamp",
            ),
        ))
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
