//! `read_file`: windowed text reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::ToolResponse;

use super::{erase, respond};
use crate::guards::{decode_lossy, read_guarded};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileArgs {
    pub path: String,
    /// First line to return, 1-based.
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub max_lines: Option<usize>,
    /// Prefix each returned line with its number.
    #[serde(default)]
    pub line_numbers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileOutput {
    pub path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_start_line: Option<usize>,
    /// U+FFFD occurrences after lossy UTF-8 decoding, whether decoding
    /// introduced them or the file already contained them.
    pub encoding_errors: usize,
}

#[derive(Debug, Default)]
pub struct ReadFileTool;

impl ReadFileTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: ReadFileArgs) -> ToolResponse<ReadFileOutput> {
        respond(self.name(), read(ctx, args).await, |out| {
            if out.total_lines == 0 {
                format!("{} is empty", out.path)
            } else {
                format!(
                    "Read lines {}-{} of {} from {}",
                    out.start_line, out.end_line, out.total_lines, out.path
                )
            }
        })
    }
}

async fn read(ctx: &WorkspaceContext, args: ReadFileArgs) -> Result<ReadFileOutput, ToolError> {
    let limits = ctx.limits();
    let start_line = args.start_line.unwrap_or(1);
    if start_line == 0 {
        return Err(ToolError::bad_args("startLine must be >= 1"));
    }
    let max_lines = args.max_lines.unwrap_or(limits.default_read_lines);
    if max_lines == 0 {
        return Err(ToolError::bad_args("maxLines must be >= 1"));
    }
    if max_lines > limits.max_read_lines {
        return Err(ToolError::bad_args(format!(
            "maxLines must be <= {}",
            limits.max_read_lines
        )));
    }

    let resolved = ctx.resolve_existing(&args.path).await?;
    let file = read_guarded(&resolved, limits.max_read_bytes).await?;
    let (text, encoding_errors) = decode_lossy(&file.bytes);
    let lines: Vec<&str> = text.lines().collect();
    let total_lines = lines.len();
    let path = ctx.relative(&resolved);

    if total_lines == 0 {
        if start_line != 1 {
            return Err(ToolError::bad_args(format!(
                "startLine {start_line} is past the end of {path}, which is empty"
            )));
        }
        return Ok(ReadFileOutput {
            path,
            content: String::new(),
            start_line: 1,
            end_line: 0,
            total_lines: 0,
            truncated: false,
            next_start_line: None,
            encoding_errors,
        });
    }
    if start_line > total_lines {
        return Err(ToolError::bad_args(format!(
            "startLine {start_line} exceeds the {total_lines} lines in {path}"
        )));
    }

    let end_line = (start_line - 1 + max_lines).min(total_lines);
    let window = &lines[start_line - 1..end_line];
    let content = if args.line_numbers {
        format_with_line_numbers(window, start_line)
    } else {
        window.join("\n")
    };
    let truncated = end_line < total_lines;

    Ok(ReadFileOutput {
        path,
        content,
        start_line,
        end_line,
        total_lines,
        truncated,
        next_start_line: truncated.then_some(end_line + 1),
        encoding_errors,
    })
}

fn format_with_line_numbers(lines: &[&str], start_line: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let width = (start_line + lines.len() - 1).to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}| {line}", start_line + i))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ToolExecutor for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a window of lines from a text file in the workspace"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative or absolute file path" },
                "startLine": { "type": "integer", "minimum": 1, "default": 1, "description": "First line to read (1-indexed)" },
                "maxLines": { "type": "integer", "minimum": 1, "maximum": 1000, "default": 200, "description": "Maximum number of lines to return" },
                "lineNumbers": { "type": "boolean", "default": false, "description": "Prefix each line with its line number" }
            },
            "required": ["path"]
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<ReadFileArgs>(&args) {
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

    fn args(path: &str) -> ReadFileArgs {
        ReadFileArgs {
            path: path.to_string(),
            start_line: None,
            max_lines: None,
            line_numbers: false,
        }
    }

    #[test]
    fn line_numbers_are_right_aligned() {
        assert_eq!(format_with_line_numbers(&["a", "b"], 99), " 99| a\n100| b");
        assert_eq!(format_with_line_numbers(&[], 1), "");
    }

    #[tokio::test]
    async fn reads_whole_small_file() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "one\ntwo\nthree\n").unwrap();
        let ctx = context(temp.path(), true);

        let out = ReadFileTool.run(&ctx, args("a.txt")).await.into_result().unwrap();
        assert_eq!(out.content, "one\ntwo\nthree");
        assert_eq!((out.start_line, out.end_line, out.total_lines), (1, 3, 3));
        assert!(!out.truncated);
        assert_eq!(out.next_start_line, None);
        assert_eq!(out.path, "a.txt");
    }

    #[tokio::test]
    async fn window_reports_continuation() {
        let temp = tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("l{i}\n")).collect();
        std::fs::write(temp.path().join("a.txt"), body).unwrap();
        let ctx = context(temp.path(), true);

        let out = ReadFileTool
            .run(
                &ctx,
                ReadFileArgs {
                    start_line: Some(4),
                    max_lines: Some(3),
                    ..args("a.txt")
                },
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.content, "l4\nl5\nl6");
        assert!(out.truncated);
        assert_eq!(out.next_start_line, Some(7));
    }

    #[tokio::test]
    async fn start_line_bounds() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "x\n").unwrap();
        std::fs::write(temp.path().join("empty.txt"), "").unwrap();
        let ctx = context(temp.path(), true);

        let resp = ReadFileTool
            .run(&ctx, ReadFileArgs { start_line: Some(5), ..args("a.txt") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));

        let resp = ReadFileTool
            .run(&ctx, ReadFileArgs { start_line: Some(0), ..args("a.txt") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));

        let out = ReadFileTool.run(&ctx, args("empty.txt")).await.into_result().unwrap();
        assert_eq!(out.total_lines, 0);
        let resp = ReadFileTool
            .run(&ctx, ReadFileArgs { start_line: Some(2), ..args("empty.txt") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn max_lines_above_cap_is_rejected() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "x\n").unwrap();
        let ctx = context(temp.path(), true);
        let resp = ReadFileTool
            .run(&ctx, ReadFileArgs { max_lines: Some(1001), ..args("a.txt") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn counts_encoding_errors() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("latin1.txt"), b"caf\xe9\n").unwrap();
        let ctx = context(temp.path(), true);
        let out = ReadFileTool.run(&ctx, args("latin1.txt")).await.into_result().unwrap();
        assert_eq!(out.encoding_errors, 1);
        assert!(out.content.contains('\u{FFFD}'));

        // A literal U+FFFD plus one invalid byte.
        std::fs::write(temp.path().join("mixed.txt"), b"ok \xef\xbf\xbd \xff\n").unwrap();
        let out = ReadFileTool.run(&ctx, args("mixed.txt")).await.into_result().unwrap();
        assert_eq!(out.encoding_errors, 2);
    }

    #[tokio::test]
    async fn binary_and_missing_files_fail() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("b.bin"), b"\0\x01\x02").unwrap();
        let ctx = context(temp.path(), true);

        let resp = ReadFileTool.run(&ctx, args("b.bin")).await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
        let resp = ReadFileTool.run(&ctx, args("nope.txt")).await;
        assert_eq!(resp.error(), Some(ErrorCode::NotFound));
        let resp = ReadFileTool.run(&ctx, args("../etc/passwd")).await;
        assert_eq!(resp.error(), Some(ErrorCode::PermissionDenied));
    }

    #[tokio::test]
    async fn execute_decodes_camel_case_args() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.txt"), "1\n2\n3\n").unwrap();
        let ctx = context(temp.path(), true);

        let resp = ReadFileTool
            .execute(serde_json::json!({"path": "a.txt", "startLine": 2, "maxLines": 1}), &ctx)
            .await;
        let value = resp.into_result().unwrap();
        assert_eq!(value["content"], "2");
        assert_eq!(value["nextStartLine"], 3);

        let resp = ReadFileTool.execute(serde_json::json!({"startLine": 2}), &ctx).await;
        assert_eq!(resp.error(), Some(warden_types::ErrorCode::ValidationError));
    }
}
