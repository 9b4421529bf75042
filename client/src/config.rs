//! Configuration types for coverage retrieval

use crate::error::ValidationError;
use covfetch_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network limits for one retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Upper bound for establishing the TCP connection
    pub connect_timeout: Duration,

    /// Upper bound for the whole exchange once connected (handshake, command,
    /// and streaming up to the ACK)
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(
                std::env::var("COVFETCH_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            read_timeout: Duration::from_secs(
                std::env::var("COVFETCH_READ_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connect_timeout.is_zero() {
            return Err(ValidationError::InvalidTimeout { name: "connect" });
        }
        if self.read_timeout.is_zero() {
            return Err(ValidationError::InvalidTimeout { name: "read" });
        }
        Ok(())
    }
}

/// Everything a `Retriever` can be tuned with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrieveOptions {
    pub client: ClientConfig,
    pub store: StoreConfig,
}
