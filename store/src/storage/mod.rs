//! Persisted store files
//!
//! A store is a HEADER block followed by SESSION and UNIT blocks, encoded with
//! the same codec as the agent protocol. Writes go to a temporary file in the
//! destination directory which is renamed over the destination only once it
//! is complete and synced.

pub mod lock;

pub use lock::StoreLock;

use crate::config::{CorruptStorePolicy, StoreConfig};
use crate::error::{Error, MergeError, Result, StoreError};
use bytes::BytesMut;
use covfetch_shared::protocol::codec::{encode_header, encode_session, encode_unit};
use covfetch_shared::protocol::{Block, BlockCodec, BlockKind, Header, ProtocolError};
use covfetch_shared::types::coverage::CoverageDataset;
use covfetch_shared::utils::bytes_to_hex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

/// Encode a dataset as a store image
pub fn encode_store(dataset: &CoverageDataset) -> Result<BytesMut, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_header(&Header::current(), &mut buf);
    for session in dataset.sessions() {
        encode_session(session, &mut buf)?;
    }
    for unit in dataset.units() {
        encode_unit(unit, &mut buf)?;
    }
    Ok(buf)
}

/// Decode a store image.
///
/// Units repeated within the image are OR-ed together, exactly as when the
/// image is received from an agent.
pub fn decode_store(bytes: &[u8]) -> Result<CoverageDataset, ProtocolError> {
    let mut buf = BytesMut::from(bytes);
    let mut codec = BlockCodec::new();

    match codec.decode(&mut buf)? {
        Some(Block::Header(_)) => {}
        Some(other) => {
            return Err(ProtocolError::UnexpectedBlock {
                expected: "HEADER",
                found: other.kind(),
            })
        }
        None => {
            return Err(ProtocolError::Malformed {
                block: BlockKind::Header,
                reason: "store ends inside the header".to_string(),
            })
        }
    }

    let mut dataset = CoverageDataset::new();
    while let Some(block) = codec.decode(&mut buf)? {
        match block {
            Block::Session(session) => {
                dataset.add_session(session);
            }
            Block::Unit(unit) => {
                dataset.add_unit(unit)?;
            }
            other => {
                return Err(ProtocolError::UnexpectedBlock {
                    expected: "SESSION or UNIT",
                    found: other.kind(),
                })
            }
        }
    }

    if !buf.is_empty() {
        return Err(ProtocolError::Malformed {
            block: BlockKind::from_tag(buf[0]).unwrap_or(BlockKind::Unit),
            reason: format!("store ends inside a block ({} bytes left)", buf.len()),
        });
    }
    Ok(dataset)
}

/// Read the store at `path`.
///
/// Returns `Ok(None)` when there is no file. A zero-length file is an empty
/// store. A file that cannot be decoded is `MergeError::CorruptExistingStore`,
/// except for an unsupported version, which is reported as such: the file
/// may be perfectly valid for another release.
pub fn read_store(path: &Path) -> Result<Option<CoverageDataset>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path)(e).into()),
    };
    if bytes.is_empty() {
        debug!(path = %path.display(), "existing store is empty");
        return Ok(Some(CoverageDataset::new()));
    }

    match decode_store(&bytes) {
        Ok(dataset) => Ok(Some(dataset)),
        Err(e @ ProtocolError::VersionMismatch { .. }) => Err(e.into()),
        Err(source) => {
            debug!(
                path = %path.display(),
                head = %bytes_to_hex(&bytes[..bytes.len().min(16)]),
                "store failed to decode"
            );
            Err(MergeError::CorruptExistingStore {
                path: path.to_path_buf(),
                source,
            }
            .into())
        }
    }
}

/// Load the store that new data will be merged into, applying the corrupt
/// store policy. A missing file is an empty store.
pub fn load_existing(path: &Path, config: &StoreConfig) -> Result<CoverageDataset> {
    match read_store(path) {
        Ok(existing) => Ok(existing.unwrap_or_default()),
        Err(Error::Merge(MergeError::CorruptExistingStore { path, source }))
            if config.on_corrupt == CorruptStorePolicy::Discard =>
        {
            warn!(
                path = %path.display(),
                error = %source,
                "discarding unreadable store"
            );
            Ok(CoverageDataset::new())
        }
        Err(e) => Err(e),
    }
}

/// Atomically replace the store at `path` with `dataset`.
///
/// The parent directory must already exist. On failure the previous content
/// of `path` is left as it was.
pub fn write_store(path: &Path, dataset: &CoverageDataset) -> Result<()> {
    let dir = parent_dir(path);
    if !dir.is_dir() {
        return Err(StoreError::DirectoryMissing(dir).into());
    }

    let image = encode_store(dataset)?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(StoreError::io(&dir))?;
    tmp.write_all(&image).map_err(StoreError::io(tmp.path()))?;
    tmp.as_file().sync_all().map_err(StoreError::io(tmp.path()))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path)(e.error))?;

    // Make the rename itself durable
    #[cfg(unix)]
    if let Err(e) = std::fs::File::open(&dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), "failed to sync directory: {}", e);
    }

    debug!(
        path = %path.display(),
        bytes = image.len(),
        units = dataset.unit_count(),
        sessions = dataset.session_count(),
        "store written"
    );
    Ok(())
}

/// Directory a store file lives in; a bare file name lives in `.`
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
