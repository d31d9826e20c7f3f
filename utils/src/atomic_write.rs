//! Atomic file write helpers.
//!
//! Content is staged in a uniquely named temp file next to the target and then
//! renamed over it, so readers observe either the old or the new file, never a
//! partial write. When the rename fails the temp file is removed.

use std::fs;
#[cfg(unix)]
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile, PersistError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Allow the file to inherit the default umask.
    #[default]
    Default,
    /// Preserve an existing Unix mode from the file being replaced.
    ///
    /// Ignored on non-Unix platforms.
    Preserve(u32),
}

impl PersistMode {
    #[cfg(unix)]
    fn mode(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::Preserve(mode) => Some(mode),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AtomicWriteOptions {
    /// File sync policy for the temp file before persisting.
    pub file_sync: FileSyncPolicy,
    /// Parent directory sync policy after the file has been persisted.
    pub parent_dir_sync: ParentDirSyncPolicy,
    /// Permission policy for the committed file.
    pub mode: PersistMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSyncPolicy {
    SyncAll,
    SkipSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDirSyncPolicy {
    SyncBestEffort,
    SkipSync,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            file_sync: FileSyncPolicy::SyncAll,
            parent_dir_sync: ParentDirSyncPolicy::SyncBestEffort,
            mode: PersistMode::Default,
        }
    }
}

/// Atomically replace (or create) `path` with `bytes`.
pub fn atomic_write_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let tmp = stage(path, bytes, options)?;
    let result = tmp.persist(path).map(drop);
    finish(path, result, options)
}

/// Atomically create `path`, failing with `AlreadyExists` if it is present.
///
/// The existence check happens at rename time, so a file created by someone
/// else between the caller's own check and the commit is never clobbered.
pub fn atomic_write_new_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let tmp = stage(path, bytes, options)?;
    let result = tmp.persist_noclobber(path).map(drop);
    finish(path, result, options)
}

fn parent_of(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Write `bytes` into a fresh temp sibling of `path`.
fn stage(path: &Path, bytes: &[u8], options: AtomicWriteOptions) -> io::Result<NamedTempFile> {
    let parent = parent_of(path);
    let stem = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = Builder::new()
        .prefix(&format!(".{stem}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;

    #[cfg(unix)]
    if let Some(mode) = options.mode.mode() {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    }

    tmp.write_all(bytes)?;
    tmp.flush()?;
    if matches!(options.file_sync, FileSyncPolicy::SyncAll) {
        tmp.as_file().sync_all()?;
    }
    Ok(tmp)
}

fn finish(
    path: &Path,
    result: Result<(), PersistError>,
    options: AtomicWriteOptions,
) -> io::Result<()> {
    if let Err(err) = result {
        let PersistError { error, file } = err;
        let tmp_path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            warn!(
                path = %tmp_path.display(),
                "Failed to remove temp file after aborted atomic write: {e}"
            );
        } else {
            debug!(path = %path.display(), "Atomic write aborted; temp file removed");
        }
        return Err(error);
    }

    if matches!(options.parent_dir_sync, ParentDirSyncPolicy::SyncBestEffort) {
        best_effort_sync_parent_dir(parent_of(path));
    }
    Ok(())
}

#[cfg(unix)]
fn best_effort_sync_parent_dir(parent: &Path) {
    if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
        debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
    }
}

#[cfg(not(unix))]
fn best_effort_sync_parent_dir(_parent: &Path) {}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{
        AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode,
        atomic_write_new_with_options, atomic_write_with_options,
    };

    fn fast() -> AtomicWriteOptions {
        AtomicWriteOptions {
            file_sync: FileSyncPolicy::SkipSync,
            parent_dir_sync: ParentDirSyncPolicy::SkipSync,
            mode: PersistMode::Default,
        }
    }

    fn leftover_temps(dir: &std::path::Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn overwrites_existing_without_leaving_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.txt");

        atomic_write_with_options(&path, b"one", fast()).expect("write one");
        atomic_write_with_options(&path, b"two", fast()).expect("write two");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        assert_eq!(leftover_temps(dir.path()), 0);
    }

    #[test]
    fn create_new_refuses_to_clobber() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("exists.txt");
        fs::write(&path, "original").unwrap();

        let err = atomic_write_new_with_options(&path, b"replacement", fast()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(leftover_temps(dir.path()), 0);
    }

    #[test]
    fn rename_failure_removes_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Renaming a file over a non-empty directory fails on every platform.
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("child"), "x").unwrap();

        assert!(atomic_write_with_options(&target, b"data", fast()).is_err());
        assert_eq!(leftover_temps(dir.path()), 0);
        assert!(target.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn preserves_unix_mode_when_requested() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("script.sh");
        let opts = AtomicWriteOptions {
            mode: PersistMode::Preserve(0o750),
            ..fast()
        };

        atomic_write_with_options(&path, b"#!/bin/sh\n", opts).expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
    }
}
