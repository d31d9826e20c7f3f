//! `apply_text_edit`: exact-text replacement.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::ToolResponse;
use warden_utils::sha256_hex;

use super::{commit_atomic, erase, respond};
use crate::guards::{ensure_within_cap, read_guarded};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEditArgs {
    pub path: String,
    pub expected_text: String,
    pub replacement_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEditOutput {
    pub path: String,
    pub replacements: usize,
    pub original_size: usize,
    pub new_size: usize,
    pub sha256_before: String,
    pub sha256_after: String,
}

#[derive(Debug, Default)]
pub struct ApplyTextEditTool;

impl ApplyTextEditTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: TextEditArgs) -> ToolResponse<TextEditOutput> {
        respond(self.name(), edit(ctx, args).await, |out| {
            let noun = if out.replacements == 1 { "occurrence" } else { "occurrences" };
            format!("Replaced {} {noun} in {}", out.replacements, out.path)
        })
    }
}

async fn edit(ctx: &WorkspaceContext, args: TextEditArgs) -> Result<TextEditOutput, ToolError> {
    ctx.ensure_writable("apply_text_edit")?;
    if args.expected_text.is_empty() {
        return Err(ToolError::bad_args("expectedText must not be empty"));
    }
    let limits = ctx.limits();
    let resolved = ctx.resolve_existing(&args.path).await?;
    let path = ctx.relative(&resolved);
    let file = read_guarded(&resolved, limits.max_read_bytes).await?;
    let sha256_before = sha256_hex(&file.bytes);
    let original_size = file.bytes.len();
    let original = String::from_utf8(file.bytes).map_err(|_| {
        ToolError::validation(format!(
            "{path} is not valid UTF-8; exact-text edits need text content"
        ))
    })?;

    let replacements = original.matches(args.expected_text.as_str()).count();
    if replacements == 0 {
        return Err(ToolError::NotFound {
            message: format!("expectedText not found in {path}"),
        });
    }
    if replacements > 1 && !args.replace_all {
        return Err(ToolError::validation(format!(
            "expectedText found {replacements} times in {path}; include more surrounding context or set replaceAll"
        )));
    }

    let updated = if args.replace_all {
        original.replace(&args.expected_text, &args.replacement_text)
    } else {
        original.replacen(&args.expected_text, &args.replacement_text, 1)
    };
    ensure_within_cap(updated.len(), limits.max_write_bytes, "edited content", &resolved)?;

    let bytes = updated.into_bytes();
    let new_size = bytes.len();
    let sha256_after = sha256_hex(&bytes);
    commit_atomic(&resolved, bytes, file.mode, false).await?;

    Ok(TextEditOutput {
        path,
        replacements,
        original_size,
        new_size,
        sha256_before,
        sha256_after,
    })
}

impl ToolExecutor for ApplyTextEditTool {
    fn name(&self) -> &'static str {
        "apply_text_edit"
    }

    fn description(&self) -> &'static str {
        "Replace an exact span of text in a file; the span must occur once unless replaceAll is set"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative or absolute file path" },
                "expectedText": { "type": "string", "minLength": 1, "description": "Exact text to find, including whitespace" },
                "replacementText": { "type": "string", "description": "Text to put in its place" },
                "replaceAll": { "type": "boolean", "default": false, "description": "Replace every occurrence" }
            },
            "required": ["path", "expectedText", "replacementText"]
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        true
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<TextEditArgs>(&args) {
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

    fn args(expected: &str, replacement: &str, replace_all: bool) -> TextEditArgs {
        TextEditArgs {
            path: "a.rs".to_string(),
            expected_text: expected.to_string(),
            replacement_text: replacement.to_string(),
            replace_all,
        }
    }

    #[tokio::test]
    async fn replaces_single_occurrence() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "let x = 1;\nlet y = 2;\n").unwrap();
        let ctx = context(temp.path(), true);

        let out = ApplyTextEditTool
            .run(&ctx, args("let y = 2;", "let y = 3;", false))
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.replacements, 1);
        assert_eq!(out.sha256_before, sha256_hex(b"let x = 1;\nlet y = 2;\n"));
        let on_disk = std::fs::read(temp.path().join("a.rs")).unwrap();
        assert_eq!(on_disk, b"let x = 1;\nlet y = 3;\n");
        assert_eq!(out.sha256_after, sha256_hex(&on_disk));
    }

    #[tokio::test]
    async fn ambiguous_match_names_count() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "foo\nfoo\n").unwrap();
        let ctx = context(temp.path(), true);

        let resp = ApplyTextEditTool.run(&ctx, args("foo", "bar", false)).await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
        assert!(resp.message().contains("2 times"));
        assert_eq!(std::fs::read_to_string(temp.path().join("a.rs")).unwrap(), "foo\nfoo\n");

        let out = ApplyTextEditTool
            .run(&ctx, args("foo", "bar", true))
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.replacements, 2);
        assert_eq!(std::fs::read_to_string(temp.path().join("a.rs")).unwrap(), "bar\nbar\n");
    }

    #[tokio::test]
    async fn missing_and_empty_expected_text() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "abc").unwrap();
        let ctx = context(temp.path(), true);

        let resp = ApplyTextEditTool.run(&ctx, args("zzz", "y", false)).await;
        assert_eq!(resp.error(), Some(ErrorCode::NotFound));
        let resp = ApplyTextEditTool.run(&ctx, args("", "y", false)).await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn writes_disabled_is_permission_denied() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("a.rs"), "abc").unwrap();
        let ctx = context(temp.path(), false);
        let resp = ApplyTextEditTool.run(&ctx, args("abc", "x", false)).await;
        assert_eq!(resp.error(), Some(ErrorCode::PermissionDenied));
        assert_eq!(std::fs::read_to_string(temp.path().join("a.rs")).unwrap(), "abc");
    }
}
