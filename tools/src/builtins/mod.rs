//! Built-in file tools.
//!
//! Every tool exposes a typed `run(ctx, args) -> ToolResponse<Output>` and a
//! JSON [`ToolExecutor`] wrapper around it for the registry.

mod edit;
mod info;
mod list;
mod patch;
mod read;
mod search;
mod write;

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use warden_types::{ErrorCode, ToolResponse};
use warden_utils::{
    AtomicWriteOptions, FileSyncPolicy, ParentDirSyncPolicy, PersistMode,
    atomic_write_new_with_options, atomic_write_with_options,
};

use crate::{ToolError, ToolRegistry, WorkspaceContext};

pub use edit::{ApplyTextEditTool, TextEditArgs, TextEditOutput};
pub use info::{FileInfoArgs, FileInfoOutput, FileInfoTool};
pub use list::{ListDirectoryArgs, ListDirectoryOutput, ListDirectoryTool, ListEntry};
pub use patch::{ApplyFilePatchTool, FilePatchArgs, PatchApplyResult};
pub use read::{ReadFileArgs, ReadFileOutput, ReadFileTool};
pub use search::{SearchFilesArgs, SearchFilesOutput, SearchFilesTool, SearchMatch};
pub use write::{WriteFileArgs, WriteFileOutput, WriteFileTool, WriteMode};

/// Register every built-in file tool.
pub fn register_builtins(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(Box::new(ReadFileTool))?;
    registry.register(Box::new(WriteFileTool))?;
    registry.register(Box::new(ApplyTextEditTool))?;
    registry.register(Box::new(ApplyFilePatchTool))?;
    registry.register(Box::new(FileInfoTool))?;
    registry.register(Box::new(ListDirectoryTool))?;
    registry.register(Box::new(SearchFilesTool))?;
    Ok(())
}

/// Fold a tool result into a response, summarizing successes.
fn respond<T>(
    tool: &'static str,
    result: Result<T, ToolError>,
    summarize: impl FnOnce(&T) -> String,
) -> ToolResponse<T> {
    match result {
        Ok(output) => {
            let message = summarize(&output);
            ToolResponse::success(output, message)
        }
        Err(err) => {
            debug!(tool, code = %err.code(), "Tool call failed: {err}");
            err.into()
        }
    }
}

/// Convert a typed response into the registry's JSON shape.
fn erase<T: Serialize>(response: ToolResponse<T>) -> ToolResponse<Value> {
    match response {
        ToolResponse::Success { result, message } => match serde_json::to_value(result) {
            Ok(value) => ToolResponse::success(value, message),
            Err(e) => ToolResponse::failure(
                ErrorCode::Unknown,
                format!("failed to serialize tool result: {e}"),
            ),
        },
        ToolResponse::Failure { error, message } => ToolResponse::failure(error, message),
    }
}

/// Make sure the parent of `path` exists, creating it when allowed, then
/// re-run the sandbox checks against the freshly created tree.
async fn prepare_parent(
    ctx: &WorkspaceContext,
    path: &Path,
    create_dirs: bool,
) -> Result<PathBuf, ToolError> {
    let Some(parent) = path.parent() else {
        return Ok(path.to_path_buf());
    };
    match tokio::fs::metadata(parent).await {
        Ok(meta) if meta.is_dir() => return Ok(path.to_path_buf()),
        Ok(_) => {
            return Err(ToolError::validation(format!(
                "{} is not a directory",
                ctx.relative(parent)
            )));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(ToolError::io(
                format!("failed to stat {}", parent.display()),
                err,
            ));
        }
    }
    if !create_dirs {
        return Err(ToolError::NotFound {
            message: format!(
                "parent directory {} does not exist (set createDirs to create it)",
                ctx.relative(parent)
            ),
        });
    }
    tokio::fs::create_dir_all(parent).await.map_err(|e| {
        ToolError::io(format!("failed to create {}", parent.display()), e)
    })?;
    debug!(path = %parent.display(), "Created parent directories");
    ctx.revalidate(path).await
}

/// Commit `bytes` to `path` through a temp sibling and rename.
///
/// With `create_new` the rename refuses to replace an existing file.
async fn commit_atomic(
    path: &Path,
    bytes: Vec<u8>,
    mode: Option<u32>,
    create_new: bool,
) -> Result<(), ToolError> {
    let options = AtomicWriteOptions {
        file_sync: FileSyncPolicy::SyncAll,
        parent_dir_sync: ParentDirSyncPolicy::SyncBestEffort,
        mode: mode.map_or(PersistMode::Default, PersistMode::Preserve),
    };
    let target = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || {
        if create_new {
            atomic_write_new_with_options(&target, &bytes, options)
        } else {
            atomic_write_with_options(&target, &bytes, options)
        }
    })
    .await;

    match joined {
        Ok(Ok(())) => {
            debug!(path = %path.display(), "Committed atomic write");
            Ok(())
        }
        Ok(Err(err)) if create_new && err.kind() == io::ErrorKind::AlreadyExists => {
            Err(ToolError::validation(format!(
                "{} already exists",
                path.display()
            )))
        }
        Ok(Err(source)) => Err(ToolError::CommitFailed {
            path: path.to_path_buf(),
            source,
        }),
        Err(join) => Err(ToolError::Internal {
            message: format!("write task failed: {join}"),
        }),
    }
}
