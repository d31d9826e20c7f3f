//! Content guards shared by every file tool: binary detection, size caps,
//! single-handle reads and IO error classification.

use std::io;
use std::path::Path;

use tokio::io::AsyncReadExt;
use warden_types::ErrorCode;

use crate::ToolError;

/// Bytes sampled from the start of a file when checking for binary content.
pub const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// A `NUL` in the first [`BINARY_SNIFF_BYTES`] marks content as binary.
#[must_use]
pub fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    sample.contains(&0)
}

/// Text file content read through one open handle.
#[derive(Debug)]
pub struct GuardedFile {
    pub bytes: Vec<u8>,
    /// Unix permission bits of the file, for preserving them on rewrite.
    pub mode: Option<u32>,
}

/// Read a regular text file through one handle.
///
/// The path is stat'ed before opening so a FIFO or device node is rejected
/// without blocking in `open`. On unix the open also carries `O_NONBLOCK` for
/// the case where the path is swapped in between; the handle's own metadata
/// then decides.
pub async fn read_guarded(path: &Path, max_bytes: usize) -> Result<GuardedFile, ToolError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", path.display()), e))?;
    ensure_regular_file(&meta, path)?;

    let mut options = tokio::fs::OpenOptions::new();
    options.read(true);
    #[cfg(unix)]
    options.custom_flags(libc::O_NONBLOCK);
    let file = options
        .open(path)
        .await
        .map_err(|e| ToolError::io(format!("failed to open {}", path.display()), e))?;
    let meta = file
        .metadata()
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", path.display()), e))?;
    ensure_regular_file(&meta, path)?;

    let len = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    ensure_within_cap(len, max_bytes, "file", path)?;

    let mut bytes = Vec::with_capacity(len);
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    file.take(limit)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| ToolError::io(format!("failed to read {}", path.display()), e))?;
    // The file may have grown between stat and read.
    ensure_within_cap(bytes.len(), max_bytes, "file", path)?;

    if looks_binary(&bytes) {
        return Err(ToolError::validation(format!(
            "{} appears to be a binary file",
            path.display()
        )));
    }

    Ok(GuardedFile {
        bytes,
        mode: unix_mode(&meta),
    })
}

fn ensure_regular_file(meta: &std::fs::Metadata, path: &Path) -> Result<(), ToolError> {
    if meta.is_dir() {
        return Err(ToolError::validation(format!(
            "{} is a directory",
            path.display()
        )));
    }
    if !meta.is_file() {
        return Err(ToolError::validation(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(())
}

/// Reject `len` bytes of `what` when above `max_bytes`.
pub fn ensure_within_cap(
    len: usize,
    max_bytes: usize,
    what: &str,
    path: &Path,
) -> Result<(), ToolError> {
    if len > max_bytes {
        return Err(ToolError::validation(format!(
            "{what} too large for {} ({len} bytes, limit {max_bytes} bytes)",
            path.display()
        )));
    }
    Ok(())
}

/// Decode bytes as UTF-8, replacing invalid sequences, and count every
/// replacement character in the result, including ones already in the file.
#[must_use]
pub fn decode_lossy(bytes: &[u8]) -> (String, usize) {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let replacements = text
        .chars()
        .filter(|&c| c == char::REPLACEMENT_CHARACTER)
        .count();
    (text, replacements)
}

#[cfg(unix)]
pub(crate) fn unix_mode(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode())
}

#[cfg(not(unix))]
pub(crate) fn unix_mode(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Classify an IO failure into the tool error taxonomy.
#[must_use]
pub fn map_io_error(err: &io::Error) -> ErrorCode {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorCode::NotFound,
        io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
        io::ErrorKind::IsADirectory | io::ErrorKind::NotADirectory => ErrorCode::ValidationError,
        io::ErrorKind::StorageFull => ErrorCode::IoError,
        _ => map_raw_os_error(err),
    }
}

#[cfg(unix)]
fn map_raw_os_error(err: &io::Error) -> ErrorCode {
    match err.raw_os_error() {
        Some(libc::EPERM | libc::EACCES) => ErrorCode::PermissionDenied,
        Some(libc::EISDIR | libc::ENOTDIR) => ErrorCode::ValidationError,
        Some(libc::ENOENT) => ErrorCode::NotFound,
        _ => ErrorCode::IoError,
    }
}

#[cfg(not(unix))]
fn map_raw_os_error(_err: &io::Error) -> ErrorCode {
    ErrorCode::IoError
}
