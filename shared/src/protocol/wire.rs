//! Block definitions for the agent protocol and store format.
//!
//! | block   | tag    | body                                         |
//! |---------|--------|----------------------------------------------|
//! | HEADER  | `0x01` | magic `u16`, format version `u16`            |
//! | SESSION | `0x10` | id string, start `u64`, dump `u64`           |
//! | UNIT    | `0x11` | id `u64`, name string, probe bit vector      |
//! | ACK     | `0x20` | (empty)                                      |
//! | COMMAND | `0x40` | dump flag `u8`, reset flag `u8`              |
//!
//! Integers are big-endian. Strings and probe vectors are prefixed with a
//! LEB128 varint length.

use super::ProtocolError;
use crate::types::coverage::{SessionInfo, UnitRecord};
use std::fmt;

/// Magic number opening every HEADER block
pub const MAGIC: u16 = 0xC0C0;

/// Format version written by this crate
pub const FORMAT_VERSION: u16 = 0x1007;

/// Format versions this crate can decode
pub const SUPPORTED_VERSIONS: &[u16] = &[FORMAT_VERSION];

/// Block tags
pub mod tag {
    pub const HEADER: u8 = 0x01;
    pub const SESSION: u8 = 0x10;
    pub const UNIT: u8 = 0x11;
    pub const ACK: u8 = 0x20;
    pub const COMMAND: u8 = 0x40;
}

/// Kind of a block, as identified by its tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Header,
    Session,
    Unit,
    Ack,
    Command,
}

impl BlockKind {
    pub fn tag(self) -> u8 {
        match self {
            BlockKind::Header => tag::HEADER,
            BlockKind::Session => tag::SESSION,
            BlockKind::Unit => tag::UNIT,
            BlockKind::Ack => tag::ACK,
            BlockKind::Command => tag::COMMAND,
        }
    }

    pub fn from_tag(value: u8) -> Option<Self> {
        match value {
            tag::HEADER => Some(BlockKind::Header),
            tag::SESSION => Some(BlockKind::Session),
            tag::UNIT => Some(BlockKind::Unit),
            tag::ACK => Some(BlockKind::Ack),
            tag::COMMAND => Some(BlockKind::Command),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockKind::Header => "HEADER",
            BlockKind::Session => "SESSION",
            BlockKind::Unit => "UNIT",
            BlockKind::Ack => "ACK",
            BlockKind::Command => "COMMAND",
        };
        f.write_str(name)
    }
}

/// Version announcement exchanged at the start of a connection and stored at
/// the start of every store file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
}

impl Header {
    /// Header announcing the version written by this crate
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION,
        }
    }

    pub fn is_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.version)
    }

    /// Fail closed on any version this crate was not built for.
    pub fn check(&self) -> Result<(), ProtocolError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(ProtocolError::VersionMismatch {
                found: self.version,
                supported: FORMAT_VERSION,
            })
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::current()
    }
}

/// Request sent to the agent after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Ask the agent to send its execution data
    pub dump: bool,
    /// Ask the agent to clear its probes after dumping
    pub reset: bool,
}

impl Command {
    /// Request a dump, optionally resetting the agent's probes afterwards
    pub fn dump(reset: bool) -> Self {
        Self { dump: true, reset }
    }
}

/// A single decoded block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(Header),
    Session(SessionInfo),
    Unit(UnitRecord),
    Ack,
    Command(Command),
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Header(_) => BlockKind::Header,
            Block::Session(_) => BlockKind::Session,
            Block::Unit(_) => BlockKind::Unit,
            Block::Ack => BlockKind::Ack,
            Block::Command(_) => BlockKind::Command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip() {
        for kind in [
            BlockKind::Header,
            BlockKind::Session,
            BlockKind::Unit,
            BlockKind::Ack,
            BlockKind::Command,
        ] {
            assert_eq!(BlockKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(BlockKind::from_tag(0x7f), None);
    }

    #[test]
    fn test_header_version_check() {
        assert!(Header::current().check().is_ok());
        let err = Header { version: 0x1006 }.check().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::VersionMismatch {
                found: 0x1006,
                supported: FORMAT_VERSION
            }
        ));
    }

    #[test]
    fn test_dump_command() {
        assert_eq!(
            Command::dump(true),
            Command {
                dump: true,
                reset: true
            }
        );
        assert!(!Command::dump(false).reset);
    }
}
