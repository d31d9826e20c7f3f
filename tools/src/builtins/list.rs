//! `list_directory`: bounded directory listing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::ToolResponse;

use super::{erase, respond};
use crate::walk::{EntryKind, walk};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

const DEFAULT_MAX_DEPTH: usize = 3;

fn default_path() -> String {
    ".".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryArgs {
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
    /// Levels below `path` to descend when `recursive`; defaults to 3.
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryOutput {
    pub path: String,
    pub entries: Vec<ListEntry>,
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct ListDirectoryTool;

impl ListDirectoryTool {
    pub async fn run(
        &self,
        ctx: &WorkspaceContext,
        args: ListDirectoryArgs,
    ) -> ToolResponse<ListDirectoryOutput> {
        respond(self.name(), list(ctx, args).await, |out| {
            let suffix = if out.truncated { " (truncated)" } else { "" };
            format!("Listed {} entries under {}{suffix}", out.entries.len(), out.path)
        })
    }
}

async fn list(ctx: &WorkspaceContext, args: ListDirectoryArgs) -> Result<ListDirectoryOutput, ToolError> {
    let cap = ctx.limits().max_list_entries;
    let max_entries = args.max_entries.unwrap_or(cap);
    if max_entries == 0 || max_entries > cap {
        return Err(ToolError::bad_args(format!(
            "maxEntries must be between 1 and {cap}"
        )));
    }
    let max_depth = if args.recursive {
        args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    } else {
        1
    };
    if max_depth == 0 {
        return Err(ToolError::bad_args("maxDepth must be >= 1"));
    }

    let dir = ctx.resolve_existing(&args.path).await?;
    let meta = tokio::fs::metadata(&dir)
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", dir.display()), e))?;
    if !meta.is_dir() {
        return Err(ToolError::validation(format!(
            "{} is not a directory",
            ctx.relative(&dir)
        )));
    }

    let walked = walk(dir.clone(), Some(max_depth), Some(max_entries)).await?;
    let truncated = walked.truncated;
    let mut entries: Vec<ListEntry> = walked
        .entries
        .into_iter()
        .map(|entry| ListEntry {
            path: ctx.relative(&entry.path),
            kind: entry.kind,
            size: entry.size,
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ListDirectoryOutput {
        path: ctx.relative(&dir),
        entries,
        truncated,
    })
}

impl ToolExecutor for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List entries of a workspace directory, optionally recursing a few levels"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "default": ".", "description": "Directory to list" },
                "recursive": { "type": "boolean", "default": false },
                "maxDepth": { "type": "integer", "minimum": 1, "default": DEFAULT_MAX_DEPTH, "description": "Levels to descend when recursive" },
                "maxEntries": { "type": "integer", "minimum": 1, "maximum": 1000, "description": "Maximum entries to return" }
            }
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<ListDirectoryArgs>(&args) {
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

    fn args() -> ListDirectoryArgs {
        ListDirectoryArgs {
            path: ".".to_string(),
            recursive: false,
            max_depth: None,
            max_entries: None,
        }
    }

    fn tree() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src/nested")).unwrap();
        std::fs::write(temp.path().join("Cargo.toml"), "[package]\n").unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(temp.path().join("src/nested/deep.rs"), "").unwrap();
        temp
    }

    #[tokio::test]
    async fn flat_listing_is_sorted() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = ListDirectoryTool.run(&ctx, args()).await.into_result().unwrap();
        let paths: Vec<_> = out.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.toml", "src"]);
        assert_eq!(out.entries[0].size, 10);
        assert_eq!(out.entries[1].kind, EntryKind::Directory);
        assert_eq!(out.path, ".");
    }

    #[tokio::test]
    async fn recursive_listing_honours_depth() {
        let temp = tree();
        let ctx = context(temp.path(), true);

        let out = ListDirectoryTool
            .run(&ctx, ListDirectoryArgs { recursive: true, ..args() })
            .await
            .into_result()
            .unwrap();
        assert!(out.entries.iter().any(|e| e.path == "src/nested/deep.rs"));

        let out = ListDirectoryTool
            .run(
                &ctx,
                ListDirectoryArgs {
                    recursive: true,
                    max_depth: Some(2),
                    ..args()
                },
            )
            .await
            .into_result()
            .unwrap();
        assert!(out.entries.iter().any(|e| e.path == "src/nested"));
        assert!(!out.entries.iter().any(|e| e.path == "src/nested/deep.rs"));
    }

    #[tokio::test]
    async fn max_entries_truncates() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = ListDirectoryTool
            .run(
                &ctx,
                ListDirectoryArgs {
                    recursive: true,
                    max_entries: Some(2),
                    ..args()
                },
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.entries.len(), 2);
        assert!(out.truncated);
    }

    #[tokio::test]
    async fn file_path_is_rejected() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let resp = ListDirectoryTool
            .run(
                &ctx,
                ListDirectoryArgs {
                    path: "Cargo.toml".to_string(),
                    ..args()
                },
            )
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }
}
