//! `apply_file_patch`: apply a single-file unified diff.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_types::ToolResponse;
use warden_utils::{digests_match, sha256_hex};

use super::{commit_atomic, erase, respond};
use crate::guards::{ensure_within_cap, read_guarded};
use crate::unified_diff::{ParsedPatch, apply_hunks, parse_patch};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePatchArgs {
    pub path: String,
    pub patch: String,
    /// Compute the result without touching the file.
    #[serde(default)]
    pub dry_run: bool,
    /// Refuse to patch unless the current content has this digest.
    #[serde(default)]
    pub expected_sha256: Option<String>,
    /// Require `---`/`+++` header paths to name the target file.
    #[serde(default)]
    pub require_exact_file_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchApplyResult {
    pub path: String,
    pub dry_run: bool,
    pub hunks_applied: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
    pub original_size: usize,
    pub new_size: usize,
    pub sha256_before: String,
    pub sha256_after: String,
}

#[derive(Debug, Default)]
pub struct ApplyFilePatchTool;

impl ApplyFilePatchTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: FilePatchArgs) -> ToolResponse<PatchApplyResult> {
        respond(self.name(), apply_patch(ctx, args).await, |out| {
            let verb = if out.dry_run { "Dry run: would apply" } else { "Applied" };
            format!(
                "{verb} {} hunk(s) to {} (+{} -{})",
                out.hunks_applied, out.path, out.lines_added, out.lines_removed
            )
        })
    }
}

async fn apply_patch(ctx: &WorkspaceContext, args: FilePatchArgs) -> Result<PatchApplyResult, ToolError> {
    if !args.dry_run {
        ctx.ensure_writable("apply_file_patch")?;
    }
    let limits = ctx.limits();
    if args.patch.len() > limits.max_patch_bytes {
        return Err(ToolError::validation(format!(
            "patch too large ({} bytes, limit {} bytes)",
            args.patch.len(),
            limits.max_patch_bytes
        )));
    }

    let requested = ctx.resolve_lexical(&args.path)?;
    let resolved = ctx.resolve_existing(&args.path).await?;
    let path = ctx.relative(&resolved);
    let file = read_guarded(&resolved, limits.max_read_bytes).await?;

    let sha256_before = sha256_hex(&file.bytes);
    if let Some(expected) = args.expected_sha256.as_deref()
        && !digests_match(expected, &sha256_before)
    {
        return Err(ToolError::validation(format!(
            "{path} has changed: expected sha256 {}, found {sha256_before}",
            expected.trim()
        )));
    }
    let original_size = file.bytes.len();
    let original = String::from_utf8(file.bytes).map_err(|_| {
        ToolError::validation(format!("{path} is not valid UTF-8; patches need text content"))
    })?;

    let parsed = parse_patch(&args.patch)?;
    if args.require_exact_file_match {
        ensure_patch_targets(&parsed, &[ctx.relative(&requested), path.clone()])?;
    }
    let updated = apply_hunks(&original, &parsed.hunks)?;
    ensure_within_cap(updated.len(), limits.max_write_bytes, "patched content", &resolved)?;

    let bytes = updated.into_bytes();
    let new_size = bytes.len();
    let sha256_after = sha256_hex(&bytes);
    if !args.dry_run {
        commit_atomic(&resolved, bytes, file.mode, false).await?;
    }

    Ok(PatchApplyResult {
        path,
        dry_run: args.dry_run,
        hunks_applied: parsed.hunks.len(),
        lines_added: parsed.lines_added(),
        lines_removed: parsed.lines_removed(),
        original_size,
        new_size,
        sha256_before,
        sha256_after,
    })
}

/// Every header path must name one of `targets`. Patches without headers pass.
fn ensure_patch_targets(parsed: &ParsedPatch, targets: &[String]) -> Result<(), ToolError> {
    for embedded in parsed.paths() {
        if !targets.iter().any(|target| patch_path_matches(embedded, target)) {
            return Err(ToolError::validation(format!(
                "patch header names '{embedded}' but the target is '{}'",
                targets.first().map_or("", String::as_str)
            )));
        }
    }
    Ok(())
}

/// Equal, or one is a component-wise suffix of the other.
fn patch_path_matches(embedded: &str, target: &str) -> bool {
    let embedded = Path::new(embedded.trim_start_matches("./"));
    let target = Path::new(target);
    embedded == target || target.ends_with(embedded) || embedded.ends_with(target)
}

impl ToolExecutor for ApplyFilePatchTool {
    fn name(&self) -> &'static str {
        "apply_file_patch"
    }

    fn description(&self) -> &'static str {
        "Apply a unified diff to one file; supports dry runs and a SHA-256 precondition"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative or absolute path of the file to patch" },
                "patch": { "type": "string", "description": "Unified diff with one or more @@ hunks for this file" },
                "dryRun": { "type": "boolean", "default": false, "description": "Validate and report without writing" },
                "expectedSha256": { "type": "string", "description": "Hex SHA-256 the current file must match" },
                "requireExactFileMatch": { "type": "boolean", "default": false, "description": "Reject patches whose ---/+++ paths name another file" }
            },
            "required": ["path", "patch"]
        })
    }

    fn is_side_effecting(&self, args: &Value) -> bool {
        !args
            .get("dryRun")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<FilePatchArgs>(&args) {
                Ok(typed) => erase(self.run(ctx, typed).await),
                Err(err) => err.into(),
            }
        })
    }
}
