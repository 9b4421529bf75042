//! Incremental encoder/decoder for protocol blocks.
//!
//! `BlockCodec` implements the `tokio_util` codec traits so the same code
//! decodes a socket buffer that is still filling up and a store file that was
//! read in one go. A partial block at the end of the buffer yields `Ok(None)`
//! and consumes nothing.

use super::wire::{tag, Block, BlockKind, Command, Header, MAGIC};
use super::ProtocolError;
use crate::types::coverage::{SessionInfo, UnitId, UnitRecord};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest string accepted in a block
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Largest probe vector accepted in a UNIT block
pub const MAX_PROBES: usize = 1 << 24;

const MAX_VARINT_LEN: usize = 5;

/// Codec for protocol blocks
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockCodec;

impl BlockCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for BlockCodec {
    type Item = Block;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Block>, ProtocolError> {
        if src.is_empty() {
            return Ok(None);
        }
        let mut cursor = ByteCursor::new(&src[..]);
        match read_block(&mut cursor) {
            Ok(block) => {
                let used = cursor.pos;
                src.advance(used);
                Ok(Some(block))
            }
            Err(Step::Incomplete) => Ok(None),
            Err(Step::Invalid(err)) => Err(err),
        }
    }
}

impl Encoder<Block> for BlockCodec {
    type Error = ProtocolError;

    fn encode(&mut self, block: Block, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match &block {
            Block::Header(header) => encode_header(header, dst),
            Block::Session(session) => encode_session(session, dst)?,
            Block::Unit(unit) => encode_unit(unit, dst)?,
            Block::Ack => dst.put_u8(tag::ACK),
            Block::Command(command) => encode_command(command, dst),
        }
        Ok(())
    }
}

pub fn encode_header(header: &Header, dst: &mut BytesMut) {
    dst.reserve(5);
    dst.put_u8(tag::HEADER);
    dst.put_u16(MAGIC);
    dst.put_u16(header.version);
}

pub fn encode_command(command: &Command, dst: &mut BytesMut) {
    dst.reserve(3);
    dst.put_u8(tag::COMMAND);
    dst.put_u8(u8::from(command.dump));
    dst.put_u8(u8::from(command.reset));
}

pub fn encode_session(session: &SessionInfo, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    dst.put_u8(tag::SESSION);
    put_string(BlockKind::Session, &session.id, dst)?;
    dst.put_u64(session.start_millis);
    dst.put_u64(session.dump_millis);
    Ok(())
}

pub fn encode_unit(unit: &UnitRecord, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    dst.put_u8(tag::UNIT);
    dst.put_u64(unit.id);
    put_string(BlockKind::Unit, &unit.name, dst)?;
    put_probes(&unit.probes, dst)
}

/// Write an unsigned LEB128 varint
pub fn put_varint(mut value: u32, dst: &mut BytesMut) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

fn put_string(block: BlockKind, value: &str, dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if value.len() > MAX_STRING_LEN {
        return Err(ProtocolError::Malformed {
            block,
            reason: format!("string of {} bytes exceeds {MAX_STRING_LEN}", value.len()),
        });
    }
    put_varint(value.len() as u32, dst);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn put_probes(probes: &[bool], dst: &mut BytesMut) -> Result<(), ProtocolError> {
    if probes.len() > MAX_PROBES {
        return Err(ProtocolError::Malformed {
            block: BlockKind::Unit,
            reason: format!("{} probes exceed {MAX_PROBES}", probes.len()),
        });
    }
    put_varint(probes.len() as u32, dst);
    let mut packed = vec![0u8; probes.len().div_ceil(8)];
    for (i, &hit) in probes.iter().enumerate() {
        if hit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    dst.put_slice(&packed);
    Ok(())
}

/// Why a block could not be produced from the bytes at hand
enum Step {
    /// More bytes are needed
    Incomplete,
    Invalid(ProtocolError),
}

impl From<ProtocolError> for Step {
    fn from(err: ProtocolError) -> Self {
        Step::Invalid(err)
    }
}

struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    block: BlockKind,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            block: BlockKind::Header,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> Step {
        Step::Invalid(ProtocolError::Malformed {
            block: self.block,
            reason: reason.into(),
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Step> {
        let end = self.pos.checked_add(n).ok_or(Step::Incomplete)?;
        let slice = self.buf.get(self.pos..end).ok_or(Step::Incomplete)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Step> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Step> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u64(&mut self) -> Result<u64, Step> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    fn bool(&mut self) -> Result<bool, Step> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(self.malformed(format!("invalid boolean byte {other:#04x}"))),
        }
    }

    fn varint(&mut self) -> Result<u32, Step> {
        let mut value = 0u32;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.u8()?;
            // The fifth byte may only carry the top four bits of a u32.
            if i == MAX_VARINT_LEN - 1 && byte & 0xf0 != 0 {
                break;
            }
            value |= u32::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.malformed("varint does not fit in 32 bits"))
    }

    fn string(&mut self) -> Result<String, Step> {
        let len = self.varint()? as usize;
        if len > MAX_STRING_LEN {
            return Err(self.malformed(format!("string of {len} bytes exceeds {MAX_STRING_LEN}")));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| self.malformed(format!("invalid UTF-8: {e}")))
    }

    fn probes(&mut self, id: UnitId) -> Result<Vec<bool>, Step> {
        let count = self.varint()? as usize;
        if count > MAX_PROBES {
            return Err(self.malformed(format!("{count} probes exceed {MAX_PROBES}")));
        }
        let packed = self.take(count.div_ceil(8))?;

        // Bits past the declared count mean the vector is longer than declared.
        if let Some(&last) = packed.last() {
            let used_bits = count - (packed.len() - 1) * 8;
            if used_bits < 8 && last >> used_bits != 0 {
                let found = (packed.len() - 1) * 8 + (8 - last.leading_zeros() as usize);
                return Err(Step::Invalid(ProtocolError::ProbeCountMismatch {
                    id,
                    declared: count,
                    found,
                }));
            }
        }

        Ok((0..count)
            .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }
}

fn read_block(cursor: &mut ByteCursor<'_>) -> Result<Block, Step> {
    let raw_tag = cursor.u8()?;
    let kind = BlockKind::from_tag(raw_tag).ok_or(ProtocolError::UnknownBlock { tag: raw_tag })?;
    cursor.block = kind;

    match kind {
        BlockKind::Header => {
            let magic = cursor.u16()?;
            if magic != MAGIC {
                return Err(cursor.malformed(format!("bad magic {magic:#06x}")));
            }
            let header = Header {
                version: cursor.u16()?,
            };
            header.check()?;
            Ok(Block::Header(header))
        }
        BlockKind::Session => {
            let id = cursor.string()?;
            let start_millis = cursor.u64()?;
            let dump_millis = cursor.u64()?;
            Ok(Block::Session(SessionInfo {
                id,
                start_millis,
                dump_millis,
            }))
        }
        BlockKind::Unit => {
            let id = cursor.u64()?;
            let name = cursor.string()?;
            let probes = cursor.probes(id)?;
            Ok(Block::Unit(UnitRecord { id, name, probes }))
        }
        BlockKind::Ack => Ok(Block::Ack),
        BlockKind::Command => {
            let dump = cursor.bool()?;
            let reset = cursor.bool()?;
            Ok(Block::Command(Command { dump, reset }))
        }
    }
}
