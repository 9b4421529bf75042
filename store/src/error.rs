//! Error types for the merge engine and the persisted store

use covfetch_shared::protocol::ProtocolError;
use covfetch_shared::types::coverage::{UnitConflict, UnitId};
use std::io;
use std::path::PathBuf;

/// The existing store and the new data cannot be combined
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("existing store {} is unreadable: {source}", path.display())]
    CorruptExistingStore {
        path: PathBuf,
        #[source]
        source: ProtocolError,
    },

    #[error("unit {id:#x} has {existing} probes in the existing store but {incoming} in the new data")]
    ProbeCountConflict {
        id: UnitId,
        existing: usize,
        incoming: usize,
    },

    #[error("unit {id:#x} is named {existing:?} in the existing store but {incoming:?} in the new data")]
    NameConflict {
        id: UnitId,
        existing: String,
        incoming: String,
    },
}

impl MergeError {
    pub fn kind(&self) -> &'static str {
        match self {
            MergeError::CorruptExistingStore { .. } => "CorruptExistingStore",
            MergeError::ProbeCountConflict { .. } => "ProbeCountConflict",
            MergeError::NameConflict { .. } => "NameConflict",
        }
    }
}

impl From<UnitConflict> for MergeError {
    fn from(conflict: UnitConflict) -> Self {
        match conflict {
            UnitConflict::ProbeCount {
                id,
                existing,
                incoming,
            } => MergeError::ProbeCountConflict {
                id,
                existing,
                incoming,
            },
            UnitConflict::Name {
                id,
                existing,
                incoming,
            } => MergeError::NameConflict {
                id,
                existing,
                incoming,
            },
        }
    }
}

/// Filesystem failures reading or writing a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("directory {} does not exist", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::DirectoryMissing(_) => "DirectoryMissing",
            StoreError::Io { .. } => "Io",
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> StoreError {
        let path = path.into();
        move |source| StoreError::Io { path, source }
    }
}

/// Any failure of a store operation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Unsupported store version, or data that cannot be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
