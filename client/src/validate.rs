//! Pre-flight checks on caller input
//!
//! Nothing here touches the network. Destination checks only inspect
//! filesystem metadata.

use crate::error::ValidationError;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Accept an IP literal or an RFC 1123 host name
pub fn hostname(host: &str) -> Result<(), ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::EmptyHostname);
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if bare.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    let invalid = || ValidationError::InvalidHostname(host.to_string());
    let name = host.strip_suffix('.').unwrap_or(host);
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return Err(invalid());
    }
    for label in name.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid {
            return Err(invalid());
        }
    }
    Ok(())
}

/// Narrow a caller-supplied port to the TCP range, excluding 0
pub fn port(port: u32) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ValidationError::InvalidPort(port)),
    }
}

/// Check that `destination` names a file that can be created or replaced.
///
/// The parent directory must already exist; creating it is the caller's job.
pub fn destination(destination: &Path) -> Result<(), ValidationError> {
    if destination.as_os_str().is_empty() {
        return Err(ValidationError::EmptyDestination);
    }
    if destination.is_dir() {
        return Err(ValidationError::DestinationIsDirectory(
            destination.to_path_buf(),
        ));
    }

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent_meta = match std::fs::metadata(&parent) {
        Ok(meta) if meta.is_dir() => meta,
        _ => return Err(ValidationError::ParentDirectoryMissing(parent)),
    };
    // The store is replaced by renaming a sibling temp file, so the
    // directory must be writable even when the file itself is.
    if parent_meta.permissions().readonly() {
        return Err(ValidationError::DestinationReadOnly(parent));
    }
    if let Ok(meta) = std::fs::metadata(destination) {
        if meta.permissions().readonly() {
            return Err(ValidationError::DestinationReadOnly(
                destination.to_path_buf(),
            ));
        }
    }
    Ok(())
}
