//! Workspace path resolution.
//!
//! Two stages run on every request: a lexical pass ([`resolve_basic`]) that
//! rejects traversal and confines the joined path to the root, then a
//! filesystem pass ([`resolve_safe`]) that follows symlinks and checks the real
//! location again.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::debug;

use super::{DenialReason, ToolError};

/// Symlink hops followed through dangling leaf links before giving up.
const MAX_LINK_HOPS: usize = 8;

/// Lexically resolve `path` against `root`.
///
/// Relative paths are joined to `root`; absolute paths are taken as given.
/// `.` segments are dropped. The result must be `root` or a descendant.
pub fn resolve_basic(path: &str, root: &Path) -> Result<PathBuf, ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::bad_args("path must not be empty"));
    }
    if contains_unsafe_path_chars(path) {
        return Err(ToolError::bad_args(
            "path contains invalid control characters",
        ));
    }
    // Split on both separators so Windows-style input is caught on Unix too.
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(ToolError::SandboxViolation(DenialReason::ParentTraversal {
            attempted: path.to_string(),
        }));
    }

    let input = Path::new(path);
    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    };
    let normalized = lexical_normalize(&joined);
    if !normalized.starts_with(root) {
        return Err(ToolError::SandboxViolation(DenialReason::OutsideRoot {
            attempted: normalized,
            root: root.to_path_buf(),
        }));
    }
    Ok(normalized)
}

/// Resolve `path` against `root`, following symlinks.
///
/// Existing targets are returned as their real path. Missing targets fail with
/// `NotFound` when `require_exists`; otherwise the nearest existing ancestor
/// must live inside the root and the lexical path is returned.
pub async fn resolve_safe(
    path: &str,
    root: &Path,
    require_exists: bool,
) -> Result<PathBuf, ToolError> {
    let lexical = resolve_basic(path, root)?;
    let real_root = fs::canonicalize(root).await.map_err(|e| {
        ToolError::io(
            format!("failed to resolve workspace root {}", root.display()),
            e,
        )
    })?;
    verify_real(&lexical, &real_root, require_exists).await
}

/// Re-run the filesystem checks on an already resolved path.
///
/// Write tools call this after creating parent directories.
pub async fn revalidate(path: &Path, root: &Path) -> Result<PathBuf, ToolError> {
    let real_root = fs::canonicalize(root).await.map_err(|e| {
        ToolError::io(
            format!("failed to resolve workspace root {}", root.display()),
            e,
        )
    })?;
    verify_real(path, &real_root, false).await
}

async fn verify_real(
    lexical: &Path,
    real_root: &Path,
    require_exists: bool,
) -> Result<PathBuf, ToolError> {
    let mut current = lexical.to_path_buf();
    for _ in 0..=MAX_LINK_HOPS {
        match fs::canonicalize(&current).await {
            Ok(real) if real.starts_with(real_root) => return Ok(real),
            Ok(real) => {
                return Err(ToolError::SandboxViolation(DenialReason::SymlinkEscape {
                    attempted: lexical.to_path_buf(),
                    resolved: real,
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(ToolError::io(
                    format!("failed to resolve {}", lexical.display()),
                    err,
                ));
            }
        }

        let Some(target) = dangling_link_target(&current).await? else {
            if require_exists {
                return Err(ToolError::NotFound {
                    message: format!("{} does not exist", lexical.display()),
                });
            }
            return verify_creatable(&current, real_root).await;
        };
        if require_exists {
            return Err(ToolError::NotFound {
                message: format!(
                    "{} is a dangling symlink to {}",
                    lexical.display(),
                    target.display()
                ),
            });
        }
        if !target.starts_with(real_root) {
            return Err(ToolError::SandboxViolation(DenialReason::SymlinkEscape {
                attempted: lexical.to_path_buf(),
                resolved: target,
            }));
        }
        debug!(
            path = %lexical.display(),
            target = %target.display(),
            "Following dangling symlink to its target"
        );
        current = target;
    }
    Err(ToolError::SandboxViolation(DenialReason::DanglingSymlink {
        attempted: lexical.to_path_buf(),
    }))
}

/// If `path` is a symlink whose target does not exist, return the target as
/// an absolute, lexically normalized path.
async fn dangling_link_target(path: &Path) -> Result<Option<PathBuf>, ToolError> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(ToolError::io(
                format!("failed to stat {}", path.display()),
                err,
            ));
        }
    };
    if !meta.file_type().is_symlink() {
        return Ok(None);
    }
    let link = fs::read_link(path)
        .await
        .map_err(|e| ToolError::io(format!("failed to read link {}", path.display()), e))?;
    let base = match path.parent() {
        Some(parent) => fs::canonicalize(parent).await.map_err(|e| {
            ToolError::io(format!("failed to resolve {}", parent.display()), e)
        })?,
        None => PathBuf::from("/"),
    };
    Ok(Some(lexical_normalize(&base.join(link))))
}

/// Walk up from a missing path to its nearest existing ancestor and require
/// that ancestor's real path to sit inside the root.
async fn verify_creatable(lexical: &Path, real_root: &Path) -> Result<PathBuf, ToolError> {
    let mut ancestor = lexical.parent();
    while let Some(dir) = ancestor {
        match fs::canonicalize(dir).await {
            Ok(real) if real.starts_with(real_root) => return Ok(lexical.to_path_buf()),
            Ok(real) => {
                return Err(ToolError::SandboxViolation(
                    DenialReason::ParentSymlinkEscape {
                        attempted: lexical.to_path_buf(),
                        ancestor: dir.to_path_buf(),
                        resolved: real,
                    },
                ));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // A link on the chain whose target is missing cannot be verified.
                if fs::symlink_metadata(dir).await.is_ok() {
                    return Err(ToolError::SandboxViolation(
                        DenialReason::DanglingSymlink {
                            attempted: dir.to_path_buf(),
                        },
                    ));
                }
                ancestor = dir.parent();
            }
            Err(err) => {
                return Err(ToolError::io(
                    format!("failed to resolve {}", dir.display()),
                    err,
                ));
            }
        }
    }
    Err(ToolError::SandboxViolation(DenialReason::OutsideRoot {
        attempted: lexical.to_path_buf(),
        root: real_root.to_path_buf(),
    }))
}

/// Normalize without touching the filesystem: `.` is dropped and `..` pops
/// the previous component.
#[must_use]
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Workspace-relative, `/`-separated form of `path` for messages and results.
#[must_use]
pub fn display_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

fn contains_unsafe_path_chars(input: &str) -> bool {
    input.chars().any(is_unsafe_path_char)
}

/// C0/C1 control characters and DEL.
fn is_unsafe_path_char(c: char) -> bool {
    matches!(c, '\u{0000}'..='\u{001f}' | '\u{007f}' | '\u{0080}'..='\u{009f}')
}
