//! Failure classification for retrievals
//!
//! Every failure is either a validation failure (bad caller input, detected
//! before any I/O) or a retrieval failure (anything that went wrong while
//! talking to the agent or writing the store). Callers apply different
//! policy to each.

use covfetch_shared::protocol::ProtocolError;
use covfetch_store::{MergeError, StoreError};
use std::io;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("invalid hostname {0:?}")]
    InvalidHostname(String),

    #[error("port {0} is outside 1-65535")]
    InvalidPort(u32),

    #[error("destination path must not be empty")]
    EmptyDestination,

    #[error("destination {} is a directory", .0.display())]
    DestinationIsDirectory(PathBuf),

    #[error("directory {} does not exist", .0.display())]
    ParentDirectoryMissing(PathBuf),

    #[error("destination {} is not writable", .0.display())]
    DestinationReadOnly(PathBuf),

    #[error("{name} timeout must be greater than zero")]
    InvalidTimeout { name: &'static str },
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyHostname => "EmptyHostname",
            ValidationError::InvalidHostname(_) => "InvalidHostname",
            ValidationError::InvalidPort(_) => "InvalidPort",
            ValidationError::EmptyDestination => "EmptyDestination",
            ValidationError::DestinationIsDirectory(_) => "DestinationIsDirectory",
            ValidationError::ParentDirectoryMissing(_) => "ParentDirectoryMissing",
            ValidationError::DestinationReadOnly(_) => "DestinationReadOnly",
            ValidationError::InvalidTimeout { .. } => "InvalidTimeout",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no ACK received within {0:?}")]
    Timeout(Duration),

    #[error("connection closed before ACK ({units} units received)")]
    StreamTruncated { units: usize },

    #[error("socket I/O error: {0}")]
    Io(#[source] io::Error),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::ConnectFailed { .. } => "ConnectFailed",
            TransportError::Timeout(_) => "Timeout",
            TransportError::StreamTruncated { .. } => "StreamTruncated",
            TransportError::Io(_) => "Io",
        }
    }
}

/// Anything that went wrong after validation succeeded
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RetrievalError {
    /// `"Category:Kind"` label, e.g. `"MergeError:CorruptExistingStore"`
    pub fn kind(&self) -> String {
        let (category, kind) = match self {
            RetrievalError::Transport(e) => ("TransportError", e.kind()),
            RetrievalError::Protocol(e) => ("ProtocolError", e.kind()),
            RetrievalError::Merge(e) => ("MergeError", e.kind()),
            RetrievalError::Store(e) => ("IOError", e.kind()),
        };
        format!("{category}:{kind}")
    }
}

impl From<covfetch_store::Error> for RetrievalError {
    fn from(err: covfetch_store::Error) -> Self {
        match err {
            covfetch_store::Error::Merge(e) => RetrievalError::Merge(e),
            covfetch_store::Error::Protocol(e) => RetrievalError::Protocol(e),
            covfetch_store::Error::Store(e) => RetrievalError::Store(e),
        }
    }
}

/// Outcome of a failed `retrieve`
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
}

impl Failure {
    /// `"ValidationFailure"` or `"RetrievalFailure"`
    pub fn category(&self) -> &'static str {
        match self {
            Failure::Validation(_) => "ValidationFailure",
            Failure::Retrieval(_) => "RetrievalFailure",
        }
    }

    /// Stable `"Category:Kind"` label for logs and policy decisions
    pub fn kind(&self) -> String {
        match self {
            Failure::Validation(e) => format!("ValidationError:{}", e.kind()),
            Failure::Retrieval(e) => e.kind(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Failure::Validation(_))
    }

    /// Only transport failures may succeed on a later attempt. A version
    /// mismatch or a corrupt store never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Failure::Retrieval(RetrievalError::Transport(_)))
    }
}

impl From<TransportError> for Failure {
    fn from(err: TransportError) -> Self {
        Failure::Retrieval(err.into())
    }
}

impl From<ProtocolError> for Failure {
    fn from(err: ProtocolError) -> Self {
        Failure::Retrieval(err.into())
    }
}

impl From<covfetch_store::Error> for Failure {
    fn from(err: covfetch_store::Error) -> Self {
        Failure::Retrieval(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let f = Failure::from(TransportError::StreamTruncated { units: 1 });
        assert_eq!(f.kind(), "TransportError:StreamTruncated");
        assert_eq!(f.category(), "RetrievalFailure");
        assert!(f.is_retryable());

        let f = Failure::from(ProtocolError::VersionMismatch {
            found: 0x2000,
            supported: 0x1007,
        });
        assert_eq!(f.kind(), "ProtocolError:VersionMismatch");
        assert!(!f.is_retryable());

        let f = Failure::from(ValidationError::InvalidPort(0));
        assert_eq!(f.kind(), "ValidationError:InvalidPort");
        assert_eq!(f.category(), "ValidationFailure");
        assert!(f.is_validation());
        assert!(!f.is_retryable());
    }

    #[test]
    fn test_store_errors_keep_their_category() {
        let f = Failure::from(covfetch_store::Error::Store(StoreError::DirectoryMissing(
            PathBuf::from("out"),
        )));
        assert_eq!(f.kind(), "IOError:DirectoryMissing");

        let f = Failure::from(covfetch_store::Error::Merge(MergeError::NameConflict {
            id: 1,
            existing: "A".into(),
            incoming: "B".into(),
        }));
        assert_eq!(f.kind(), "MergeError:NameConflict");
    }

    #[test]
    fn test_messages() {
        let f = Failure::from(ValidationError::EmptyHostname);
        assert_eq!(f.to_string(), "invalid input: hostname must not be empty");
    }
}
