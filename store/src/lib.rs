//! Coverage store library
//!
//! Merges freshly retrieved coverage into the dataset persisted at a
//! destination path, and writes the result back atomically.

pub mod config;
pub mod error;
pub mod merge;
pub mod storage;

pub use config::{CorruptStorePolicy, StoreConfig};
pub use error::{Error, MergeError, Result, StoreError};
pub use merge::MergeSummary;
pub use storage::{read_store, write_store, StoreLock};

use covfetch_shared::types::coverage::CoverageDataset;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Shape of the store after a write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub path: PathBuf,
    pub merge: MergeSummary,
    pub units: usize,
    pub sessions: usize,
    pub total_probes: usize,
    pub covered_probes: usize,
}

impl StoreSummary {
    fn new(path: &Path, dataset: &CoverageDataset, merge: MergeSummary) -> Self {
        Self {
            path: path.to_path_buf(),
            merge,
            units: dataset.unit_count(),
            sessions: dataset.session_count(),
            total_probes: dataset.total_probes(),
            covered_probes: dataset.covered_probes(),
        }
    }
}

/// A destination opened for one load-merge-write cycle.
///
/// Holds the destination lock from `open` until `commit` returns or the value
/// is dropped, so concurrent writers cannot lose each other's updates.
#[derive(Debug)]
pub struct LockedStore {
    path: PathBuf,
    existing: CoverageDataset,
    _lock: StoreLock,
}

impl LockedStore {
    /// Lock `path` and load the dataset currently stored there.
    ///
    /// Blocks while another writer holds the lock.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self> {
        let lock = StoreLock::acquire(path)?;
        let existing = storage::load_existing(path, config)?;
        Ok(Self {
            path: path.to_path_buf(),
            existing,
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dataset found at the destination (empty if there was none)
    pub fn existing(&self) -> &CoverageDataset {
        &self.existing
    }

    /// Merge `fresh` into the loaded dataset and replace the destination.
    pub fn commit(self, fresh: &CoverageDataset) -> Result<StoreSummary> {
        let (merged, summary) = merge::merge(&self.existing, fresh)?;
        storage::write_store(&self.path, &merged)?;
        info!(
            path = %self.path.display(),
            units_added = summary.units_added,
            units_merged = summary.units_merged,
            sessions_added = summary.sessions_added,
            "coverage store updated"
        );
        Ok(StoreSummary::new(&self.path, &merged, summary))
    }
}

/// Merge the stores at `inputs` into a new store at `output`.
///
/// Every input must exist and decode; `output` is replaced, not merged into,
/// unless it is also listed as an input.
pub fn merge_stores(inputs: &[PathBuf], output: &Path) -> Result<StoreSummary> {
    // Held across the reads, since `output` may itself be an input
    let _lock = StoreLock::acquire(output)?;
    let mut datasets = Vec::with_capacity(inputs.len());
    for input in inputs {
        let dataset = read_store(input)?.ok_or_else(|| StoreError::Io {
            path: input.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "store does not exist"),
        })?;
        datasets.push(dataset);
    }

    let (merged, summary) = merge::merge_all(&datasets)?;
    write_store(output, &merged)?;
    info!(
        inputs = inputs.len(),
        output = %output.display(),
        units = merged.unit_count(),
        "stores merged"
    );
    Ok(StoreSummary::new(output, &merged, summary))
}
