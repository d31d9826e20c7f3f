//! Directory walking on top of `ignore::WalkBuilder`.
//!
//! Symlinks are reported but never followed, so a walk cannot leave the
//! directory it started in. Hidden and gitignored files are walked like any
//! other file; only `.git` directories are skipped.

use std::fs::FileType;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::Serialize;
use tracing::debug;

use crate::ToolError;

/// Directory names skipped together with their contents.
pub const SKIPPED_DIRS: &[&str] = &[".git"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl EntryKind {
    /// Classify without following symlinks.
    #[must_use]
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes for regular files, zero otherwise.
    pub size: u64,
    /// 1 for direct children of the start directory.
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct Walk {
    pub entries: Vec<WalkEntry>,
    /// More entries existed past `limit`.
    pub truncated: bool,
}

/// Walk `start` on the blocking pool.
///
/// `max_depth` counts levels below `start` (`None` is unbounded); `limit`
/// caps the number of entries collected.
pub async fn walk(
    start: PathBuf,
    max_depth: Option<usize>,
    limit: Option<usize>,
) -> Result<Walk, ToolError> {
    tokio::task::spawn_blocking(move || walk_blocking(&start, max_depth, limit))
        .await
        .map_err(|e| ToolError::Internal {
            message: format!("directory walk failed: {e}"),
        })?
}

/// Entries come out depth-first with siblings sorted by path. Failing to read
/// the start directory is an error; unreadable entries below it are skipped.
fn walk_blocking(
    start: &Path,
    max_depth: Option<usize>,
    limit: Option<usize>,
) -> Result<Walk, ToolError> {
    let meta = std::fs::metadata(start)
        .map_err(|e| ToolError::io(format!("failed to list {}", start.display()), e))?;
    if !meta.is_dir() {
        return Err(ToolError::validation(format!(
            "{} is not a directory",
            start.display()
        )));
    }
    // An unreadable start is an error, not a skipped entry.
    std::fs::read_dir(start)
        .map_err(|e| ToolError::io(format!("failed to list {}", start.display()), e))?;

    let mut builder = WalkBuilder::new(start);
    builder
        .follow_links(false)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .max_depth(max_depth);
    builder.filter_entry(|entry| !is_skipped_dir(&entry.file_name().to_string_lossy()));
    builder.sort_by_file_path(|a, b| a.cmp(b));

    let mut walk = Walk::default();
    for result in builder.build() {
        let dirent = match result {
            Ok(dirent) => dirent,
            Err(err) => {
                debug!(root = %start.display(), "Skipping unreadable entry: {err}");
                continue;
            }
        };
        let depth = dirent.depth();
        if depth == 0 {
            continue;
        }
        if limit.is_some_and(|limit| walk.entries.len() >= limit) {
            walk.truncated = true;
            break;
        }
        let kind = dirent
            .file_type()
            .map_or(EntryKind::Other, EntryKind::from_file_type);
        let size = if kind == EntryKind::File {
            dirent.metadata().map_or(0, |m| m.len())
        } else {
            0
        };
        walk.entries.push(WalkEntry {
            path: dirent.into_path(),
            kind,
            size,
            depth,
        });
    }
    Ok(walk)
}

fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(root: &Path, walk: &Walk) -> Vec<PathBuf> {
        walk.entries
            .iter()
            .map(|e| e.path.strip_prefix(root).unwrap().to_path_buf())
            .collect()
    }

    #[tokio::test]
    async fn respects_depth_and_skips_git() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::write(root.join("top.txt"), "1234").unwrap();
        std::fs::write(root.join("a/b/c/deep.txt"), "x").unwrap();

        let listed = walk(root.to_path_buf(), Some(1), None).await.unwrap();
        assert_eq!(names(root, &listed), vec![PathBuf::from("a"), PathBuf::from("top.txt")]);
        assert_eq!(listed.entries[1].size, 4);
        assert!(listed.entries.iter().all(|e| e.depth == 1));

        let listed = walk(root.to_path_buf(), None, None).await.unwrap();
        assert!(listed.entries.iter().any(|e| e.path.ends_with("a/b/c/deep.txt")));
        assert!(!listed.entries.iter().any(|e| e.path.starts_with(root.join(".git"))));
    }

    #[tokio::test]
    async fn hidden_and_gitignored_files_are_walked() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        std::fs::write(root.join(".gitignore"), "ignored.log\n").unwrap();
        std::fs::write(root.join("ignored.log"), "x").unwrap();
        std::fs::write(root.join(".env"), "x").unwrap();

        let listed = walk(root.to_path_buf(), Some(1), None).await.unwrap();
        assert_eq!(
            names(root, &listed),
            vec![PathBuf::from(".env"), PathBuf::from(".gitignore"), PathBuf::from("ignored.log")]
        );
    }

    #[tokio::test]
    async fn limit_marks_truncation() {
        let temp = tempdir().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(temp.path().join(name), "x").unwrap();
        }
        let listed = walk(temp.path().to_path_buf(), Some(1), Some(2)).await.unwrap();
        assert_eq!(listed.entries.len(), 2);
        assert!(listed.truncated);

        let listed = walk(temp.path().to_path_buf(), Some(1), Some(3)).await.unwrap();
        assert!(!listed.truncated);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_dirs_are_not_followed() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("out")).unwrap();

        let listed = walk(temp.path().to_path_buf(), Some(5), None).await.unwrap();
        assert_eq!(listed.entries.len(), 1);
        assert_eq!(listed.entries[0].kind, EntryKind::Symlink);
    }

    #[tokio::test]
    async fn missing_start_is_an_error() {
        let temp = tempdir().unwrap();
        assert!(walk(temp.path().join("nope"), Some(1), None).await.is_err());
    }
}
