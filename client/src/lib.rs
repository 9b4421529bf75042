//! Coverage retrieval library
//!
//! Connects to a remote coverage agent, downloads its accumulated coverage
//! (optionally resetting the agent's counters) and merges the result into a
//! store file on local disk.

pub mod config;
pub mod error;
pub mod remote;
pub mod retry;
pub mod validate;

pub use config::{ClientConfig, RetrieveOptions};
pub use error::{Failure, RetrievalError, TransportError, ValidationError};

use covfetch_store::{LockedStore, StoreError, StoreSummary};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// What a successful retrieval did
#[derive(Debug, Clone, Serialize)]
pub struct RetrieveOutcome {
    pub destination: PathBuf,
    /// Distinct units in the dump
    pub units_fetched: usize,
    /// Distinct sessions in the dump
    pub sessions_fetched: usize,
    /// The agent confirmed a dump that asked for a reset
    pub reset_acknowledged: bool,
    /// The store as written
    pub store: StoreSummary,
}

/// Retrieve coverage from `hostname:port` and merge it into `destination`
/// with default options.
pub async fn retrieve(
    hostname: &str,
    port: u32,
    destination: &Path,
    reset_after_fetch: bool,
) -> Result<RetrieveOutcome, Failure> {
    Retriever::new()
        .retrieve(hostname, port, destination, reset_after_fetch)
        .await
}

/// Runs retrievals with a fixed set of options
#[derive(Debug, Clone, Default)]
pub struct Retriever {
    options: RetrieveOptions,
}

impl Retriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: RetrieveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetrieveOptions {
        &self.options
    }

    /// One attempt at retrieving and persisting coverage.
    ///
    /// Input is validated before any socket is opened. The destination stays
    /// locked from loading the existing store until the merged store has
    /// replaced it, and is left untouched if anything fails.
    pub async fn retrieve(
        &self,
        hostname: &str,
        port: u32,
        destination: &Path,
        reset_after_fetch: bool,
    ) -> Result<RetrieveOutcome, Failure> {
        validate::hostname(hostname)?;
        let port = validate::port(port)?;
        validate::destination(destination)?;
        self.options.client.validate()?;

        // Loading first means an unreadable store fails the run before the
        // agent is asked to reset its counters.
        let path = destination.to_path_buf();
        let store_config = self.options.store.clone();
        let store = tokio::task::spawn_blocking(move || LockedStore::open(&path, &store_config))
            .await
            .map_err(|e| blocking_failure(destination, e))??;

        info!(
            host = hostname,
            port,
            reset = reset_after_fetch,
            destination = %destination.display(),
            "retrieving coverage"
        );
        let stream = remote::connect(hostname, port, self.options.client.connect_timeout).await?;
        let fresh =
            remote::fetch_with_deadline(stream, reset_after_fetch, self.options.client.read_timeout)
                .await?;

        let units_fetched = fresh.unit_count();
        let sessions_fetched = fresh.session_count();
        let summary = tokio::task::spawn_blocking(move || store.commit(&fresh))
            .await
            .map_err(|e| blocking_failure(destination, e))??;

        Ok(RetrieveOutcome {
            destination: destination.to_path_buf(),
            units_fetched,
            sessions_fetched,
            reset_acknowledged: reset_after_fetch,
            store: summary,
        })
    }
}

fn blocking_failure(destination: &Path, err: tokio::task::JoinError) -> Failure {
    Failure::Retrieval(RetrievalError::Store(StoreError::Io {
        path: destination.to_path_buf(),
        source: io::Error::new(io::ErrorKind::Other, err),
    }))
}
