//! `file_info`: metadata for one path.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::ToolResponse;

use super::{erase, respond};
use crate::guards::looks_binary;
use crate::walk::EntryKind;
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoOutput {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    /// Last modification time, RFC 3339.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    pub readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_binary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
}

#[derive(Debug, Default)]
pub struct FileInfoTool;

impl FileInfoTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: FileInfoArgs) -> ToolResponse<FileInfoOutput> {
        respond(self.name(), info(ctx, args).await, |out| {
            format!("{} is a {} of {} bytes", out.path, out.kind.as_str(), out.size)
        })
    }
}

async fn info(ctx: &WorkspaceContext, args: FileInfoArgs) -> Result<FileInfoOutput, ToolError> {
    let lexical = ctx.resolve_lexical(&args.path)?;
    let resolved = ctx.resolve_existing(&args.path).await?;

    // Kind reflects the entry as named, so links report as links.
    let link_meta = tokio::fs::symlink_metadata(&lexical)
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", lexical.display()), e))?;
    let meta = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", resolved.display()), e))?;
    let kind = EntryKind::from_file_type(link_meta.file_type());

    let (is_binary, line_count) = if meta.is_file()
        && usize::try_from(meta.len()).is_ok_and(|len| len <= ctx.limits().max_read_bytes)
    {
        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| ToolError::io(format!("failed to read {}", resolved.display()), e))?;
        if looks_binary(&bytes) {
            (Some(true), None)
        } else {
            (Some(false), Some(count_lines(&bytes)))
        }
    } else {
        (None, None)
    };

    Ok(FileInfoOutput {
        path: ctx.relative(&lexical),
        kind,
        size: meta.len(),
        modified: meta.modified().ok().map(rfc3339),
        readonly: meta.permissions().readonly(),
        is_binary,
        line_count,
    })
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lines as `str::lines` would count them.
fn count_lines(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    let newlines = bytes.iter().filter(|&&b| b == b'\n').count();
    if bytes.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

impl ToolExecutor for FileInfoTool {
    fn name(&self) -> &'static str {
        "file_info"
    }

    fn description(&self) -> &'static str {
        "Report kind, size, modification time and line count for a workspace path"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative or absolute path" }
            },
            "required": ["path"]
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<FileInfoArgs>(&args) {
                Ok(typed) => erase(self.run(ctx, typed).await),
                Err(err) => err.into(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use tempfile::tempdir;
    use warden_types::ErrorCode;

    fn args(path: &str) -> FileInfoArgs {
        FileInfoArgs {
            path: path.to_string(),
        }
    }

    #[test]
    fn line_counting_matches_str_lines() {
        for text in ["", "a", "a\n", "a\nb", "a\n\n"] {
            assert_eq!(count_lines(text.as_bytes()), text.lines().count(), "{text:?}");
        }
    }

    #[tokio::test]
    async fn reports_text_file() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "one\ntwo\n").unwrap();
        let ctx = context(temp.path(), true);

        let out = FileInfoTool.run(&ctx, args("a.txt")).await.into_result().unwrap();
        assert_eq!(out.kind, EntryKind::File);
        assert_eq!(out.size, 8);
        assert_eq!(out.is_binary, Some(false));
        assert_eq!(out.line_count, Some(2));
        let modified = out.modified.unwrap();
        assert!(DateTime::parse_from_rfc3339(&modified).is_ok());
    }

    #[tokio::test]
    async fn reports_directory_and_binary() {
        let temp = tempdir().unwrap();
        std::fs::create_dir(temp.path().join("dir")).unwrap();
        std::fs::write(temp.path().join("b.bin"), b"\0\0").unwrap();
        let ctx = context(temp.path(), true);

        let out = FileInfoTool.run(&ctx, args("dir")).await.into_result().unwrap();
        assert_eq!(out.kind, EntryKind::Directory);
        assert_eq!(out.line_count, None);

        let out = FileInfoTool.run(&ctx, args("b.bin")).await.into_result().unwrap();
        assert_eq!(out.is_binary, Some(true));
        assert_eq!(out.line_count, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_kind_and_escape() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(temp.path().join("real.txt"), "x").unwrap();
        std::fs::write(outside.path().join("secret"), "s").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real.txt"), temp.path().join("alias")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), temp.path().join("leak")).unwrap();
        let ctx = context(temp.path(), true);

        let out = FileInfoTool.run(&ctx, args("alias")).await.into_result().unwrap();
        assert_eq!(out.kind, EntryKind::Symlink);
        assert_eq!(out.path, "alias");

        let resp = FileInfoTool.run(&ctx, args("leak")).await;
        assert_eq!(resp.error(), Some(ErrorCode::PermissionDenied));
    }
}
