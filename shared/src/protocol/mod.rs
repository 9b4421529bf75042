//! Block protocol spoken with coverage agents
//!
//! Every unit of information is a block: a one-byte tag followed by a body.
//! The same encoding is used on the TCP connection and in persisted store
//! files, so a store can be re-read exactly like a replayed network stream.

pub mod codec;
pub mod wire;

pub use codec::BlockCodec;
pub use wire::{Block, BlockKind, Command, Header, FORMAT_VERSION, MAGIC};

use crate::types::coverage::{UnitConflict, UnitId};
use std::io;

/// Errors raised while decoding or validating blocks
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown block tag {tag:#04x}")]
    UnknownBlock { tag: u8 },

    #[error("unexpected {found} block, expected {expected}")]
    UnexpectedBlock {
        expected: &'static str,
        found: BlockKind,
    },

    #[error("unsupported format version {found:#06x} (supported: {supported:#06x})")]
    VersionMismatch { found: u16, supported: u16 },

    #[error("unit {id:#x} declares {declared} probes but {found} were supplied")]
    ProbeCountMismatch {
        id: UnitId,
        declared: usize,
        found: usize,
    },

    #[error("unit {id:#x} reported both as {first:?} and as {second:?}")]
    UnitNameMismatch {
        id: UnitId,
        first: String,
        second: String,
    },

    #[error("malformed {block} block: {reason}")]
    Malformed { block: BlockKind, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Short, stable name of the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::UnknownBlock { .. } => "UnknownBlock",
            ProtocolError::UnexpectedBlock { .. } => "UnexpectedBlock",
            ProtocolError::VersionMismatch { .. } => "VersionMismatch",
            ProtocolError::ProbeCountMismatch { .. } => "ProbeCountMismatch",
            ProtocolError::UnitNameMismatch { .. } => "UnitNameMismatch",
            ProtocolError::Malformed { .. } => "Malformed",
            ProtocolError::Io(_) => "Io",
        }
    }
}

/// Duplicate units inside one stream must agree with each other.
impl From<UnitConflict> for ProtocolError {
    fn from(conflict: UnitConflict) -> Self {
        match conflict {
            UnitConflict::ProbeCount {
                id,
                existing,
                incoming,
            } => ProtocolError::ProbeCountMismatch {
                id,
                declared: existing,
                found: incoming,
            },
            UnitConflict::Name {
                id,
                existing,
                incoming,
            } => ProtocolError::UnitNameMismatch {
                id,
                first: existing,
                second: incoming,
            },
        }
    }
}
