//! `write_file`: create, overwrite or append.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use warden_types::ToolResponse;
use warden_utils::sha256_hex;

use super::{commit_atomic, erase, prepare_parent, respond};
use crate::guards::{ensure_within_cap, unix_mode};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail if the target exists.
    Create,
    #[default]
    Overwrite,
    Append,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileArgs {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default = "default_true")]
    pub create_dirs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileOutput {
    pub path: String,
    pub mode: WriteMode,
    pub bytes_written: usize,
    pub created: bool,
    /// Digest of the file after the write.
    pub sha256: String,
}

#[derive(Debug, Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: WriteFileArgs) -> ToolResponse<WriteFileOutput> {
        respond(self.name(), write(ctx, args).await, |out| match out.mode {
            WriteMode::Append => format!("Appended {} bytes to {}", out.bytes_written, out.path),
            _ if out.created => format!("Created {} ({} bytes)", out.path, out.bytes_written),
            _ => format!("Overwrote {} ({} bytes)", out.path, out.bytes_written),
        })
    }
}

async fn write(ctx: &WorkspaceContext, args: WriteFileArgs) -> Result<WriteFileOutput, ToolError> {
    ctx.ensure_writable("write_file")?;
    let max_write = ctx.limits().max_write_bytes;
    let resolved = ctx.resolve_for_write(&args.path).await?;
    ensure_within_cap(args.content.len(), max_write, "content", &resolved)?;

    let existing = match tokio::fs::metadata(&resolved).await {
        Ok(meta) if meta.is_dir() => {
            return Err(ToolError::validation(format!(
                "{} is a directory",
                ctx.relative(&resolved)
            )));
        }
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(ToolError::io(
                format!("failed to stat {}", resolved.display()),
                err,
            ));
        }
    };
    if args.mode == WriteMode::Create && existing.is_some() {
        return Err(ToolError::validation(format!(
            "{} already exists; use mode \"overwrite\" or \"append\"",
            ctx.relative(&resolved)
        )));
    }

    let target = prepare_parent(ctx, &resolved, args.create_dirs).await?;
    let path = ctx.relative(&target);
    let created = existing.is_none();

    let bytes_written = args.content.len();
    let sha256 = match args.mode {
        WriteMode::Create | WriteMode::Overwrite => {
            let mode = existing.as_ref().and_then(unix_mode);
            let bytes = args.content.into_bytes();
            let digest = sha256_hex(&bytes);
            commit_atomic(&target, bytes, mode, args.mode == WriteMode::Create).await?;
            digest
        }
        WriteMode::Append => {
            let current = existing.as_ref().map_or(0, std::fs::Metadata::len);
            let total = usize::try_from(current)
                .unwrap_or(usize::MAX)
                .saturating_add(bytes_written);
            ensure_within_cap(total, max_write, "appended file", &target)?;
            append(&target, args.content.as_bytes()).await?;
            let after = tokio::fs::read(&target).await.map_err(|e| {
                ToolError::io(format!("failed to re-read {}", target.display()), e)
            })?;
            sha256_hex(&after)
        }
    };

    Ok(WriteFileOutput {
        path,
        mode: args.mode,
        bytes_written,
        created,
        sha256,
    })
}

async fn append(path: &std::path::Path, bytes: &[u8]) -> Result<(), ToolError> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| ToolError::io(format!("failed to open {}", path.display()), e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ToolError::io(format!("failed to append to {}", path.display()), e))?;
    file.flush()
        .await
        .map_err(|e| ToolError::io(format!("failed to flush {}", path.display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| ToolError::io(format!("failed to sync {}", path.display()), e))?;
    Ok(())
}

impl ToolExecutor for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create, overwrite or append to a text file in the workspace"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative or absolute file path" },
                "content": { "type": "string", "description": "Text to write" },
                "mode": { "type": "string", "enum": ["create", "overwrite", "append"], "default": "overwrite" },
                "createDirs": { "type": "boolean", "default": true, "description": "Create missing parent directories" }
            },
            "required": ["path", "content"]
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<WriteFileArgs>(&args) {
                Ok(typed) => erase(self.run(ctx, typed).await),
                Err(err) => err.into(),
            }
        })
    }
}
