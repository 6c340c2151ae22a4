//! Error types shared by the log store, storage monitor and collection controller.

use std::{io, path::Path};

use thiserror::Error;

/// Why a lifecycle request was refused without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionFailure {
    NotConnected,
    StorageUnavailable,
    LowStorage,
    AlreadyCollecting,
    NotCollecting,
}

impl PreconditionFailure {
    pub fn message(&self) -> &'static str {
        match self {
            PreconditionFailure::NotConnected => "device is not connected",
            PreconditionFailure::StorageUnavailable => "storage directory is not writable",
            PreconditionFailure::LowStorage => {
                "storage space is critically low, free up space and try again"
            }
            PreconditionFailure::AlreadyCollecting => "data collection already in progress",
            PreconditionFailure::NotCollecting => "no data collection in progress",
        }
    }
}

impl std::fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Error, Debug)]
pub enum CollectorError {
    /// File create/write/delete failed; the operation was aborted.
    #[error("I/O failure while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("precondition failed: {0}")]
    Precondition(PreconditionFailure),

    /// An append failed and emergency cleanup could not recover enough space.
    #[error("storage exhausted ({free_space} bytes free after emergency cleanup)")]
    StorageExhausted { free_space: u64 },

    /// The device link did not acknowledge a start/stop request.
    #[error("device fault: {0}")]
    DeviceFault(String),
}

impl CollectorError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CollectorError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("{action} {}", path.display()), source)
    }

    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CollectorError::StorageExhausted { .. })
    }
}

impl From<PreconditionFailure> for CollectorError {
    fn from(reason: PreconditionFailure) -> Self {
        CollectorError::Precondition(reason)
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;
