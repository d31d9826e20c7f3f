//! `search_files`: line search across workspace text files.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use warden_types::{ToolResponse, truncate_to_fit};

use super::{erase, respond};
use crate::guards::{decode_lossy, looks_binary};
use crate::walk::{EntryKind, walk};
use crate::{ToolError, ToolExecutor, ToolFut, WorkspaceContext, parse_args};

const MAX_MATCH_TEXT_CHARS: usize = 200;

fn default_path() -> String {
    ".".to_string()
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesArgs {
    pub pattern: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Treat `pattern` as a regular expression instead of literal text.
    #[serde(default)]
    pub regex: bool,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
    /// Glob over workspace-relative paths. `*` stays within one directory;
    /// `**/*.rs` matches nested files.
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    pub path: String,
    /// 1-based line number.
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesOutput {
    pub matches: Vec<SearchMatch>,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub truncated: bool,
}

#[derive(Debug, Default)]
pub struct SearchFilesTool;

impl SearchFilesTool {
    pub async fn run(&self, ctx: &WorkspaceContext, args: SearchFilesArgs) -> ToolResponse<SearchFilesOutput> {
        respond(self.name(), search(ctx, args).await, |out| {
            let suffix = if out.truncated { " (truncated)" } else { "" };
            format!(
                "Found {} match(es) in {} file(s){suffix}",
                out.matches.len(),
                out.files_scanned
            )
        })
    }
}

struct Scan<'a> {
    ctx: &'a WorkspaceContext,
    matcher: Regex,
    include: Option<GlobMatcher>,
    max_results: usize,
    out: SearchFilesOutput,
}

impl Scan<'_> {
    fn full(&self) -> bool {
        self.out.matches.len() >= self.max_results
    }

    async fn scan_file(&mut self, path: &Path, size: u64) {
        let relative = self.ctx.relative(path);
        if let Some(include) = &self.include
            && !include.is_match(&relative)
        {
            return;
        }
        let within_cap =
            usize::try_from(size).is_ok_and(|len| len <= self.ctx.limits().max_read_bytes);
        if !within_cap {
            self.out.files_skipped += 1;
            return;
        }
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), "Skipping unreadable file: {err}");
                self.out.files_skipped += 1;
                return;
            }
        };
        if looks_binary(&bytes) {
            self.out.files_skipped += 1;
            return;
        }
        self.out.files_scanned += 1;

        let (text, _) = decode_lossy(&bytes);
        for (index, line) in text.lines().enumerate() {
            if !self.matcher.is_match(line) {
                continue;
            }
            if self.full() {
                self.out.truncated = true;
                return;
            }
            self.out.matches.push(SearchMatch {
                path: relative.clone(),
                line: index + 1,
                text: truncate_to_fit(line, MAX_MATCH_TEXT_CHARS, "..."),
            });
        }
    }
}

async fn search(ctx: &WorkspaceContext, args: SearchFilesArgs) -> Result<SearchFilesOutput, ToolError> {
    let matcher = build_matcher(&args.pattern, args.regex, args.case_sensitive)?;
    let include = args.include.as_deref().map(build_include).transpose()?;
    let cap = ctx.limits().max_search_results;
    let max_results = args.max_results.unwrap_or(cap);
    if max_results == 0 || max_results > cap {
        return Err(ToolError::bad_args(format!(
            "maxResults must be between 1 and {cap}"
        )));
    }

    let start = ctx.resolve_existing(&args.path).await?;
    let meta = tokio::fs::metadata(&start)
        .await
        .map_err(|e| ToolError::io(format!("failed to stat {}", start.display()), e))?;

    let mut scan = Scan {
        ctx,
        matcher,
        include,
        max_results,
        out: SearchFilesOutput {
            matches: Vec::new(),
            files_scanned: 0,
            files_skipped: 0,
            truncated: false,
        },
    };

    if meta.is_file() {
        scan.scan_file(&start, meta.len()).await;
        return Ok(scan.out);
    }

    let walked = walk(start, None, None).await?;
    for entry in walked.entries.iter().filter(|e| e.kind == EntryKind::File) {
        if scan.out.truncated {
            break;
        }
        scan.scan_file(&entry.path, entry.size).await;
    }
    Ok(scan.out)
}

fn build_matcher(pattern: &str, regex: bool, case_sensitive: bool) -> Result<Regex, ToolError> {
    if pattern.is_empty() {
        return Err(ToolError::bad_args("pattern must not be empty"));
    }
    let source = if regex {
        pattern.to_string()
    } else {
        regex::escape(pattern)
    };
    RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| ToolError::bad_args(format!("Invalid pattern '{pattern}': {e}")))
}

fn build_include(raw: &str) -> Result<GlobMatcher, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::bad_args("include glob must not be empty"));
    }
    // `*` stops at `/`; nested matches need `**/`.
    GlobBuilder::new(trimmed)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ToolError::bad_args(format!("Invalid glob '{trimmed}': {e}")))
}

impl ToolExecutor for SearchFilesTool {
    fn name(&self) -> &'static str {
        "search_files"
    }

    fn description(&self) -> &'static str {
        "Search workspace text files for a literal string or regular expression"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "minLength": 1, "description": "Text or regex to find" },
                "path": { "type": "string", "default": ".", "description": "File or directory to search" },
                "regex": { "type": "boolean", "default": false },
                "caseSensitive": { "type": "boolean", "default": true },
                "include": { "type": "string", "description": "Glob over workspace-relative paths; `*` does not cross `/`, use **/*.rs for nested files" },
                "maxResults": { "type": "integer", "minimum": 1, "maximum": 200 }
            },
            "required": ["pattern"]
        })
    }

    fn is_side_effecting(&self, _args: &Value) -> bool {
        false
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a> {
        Box::pin(async move {
            match parse_args::<SearchFilesArgs>(&args) {
                Ok(typed) => erase(self.run(ctx, typed).await),
                Err(err) => err.into(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, context_with_limits};
    use super::*;
    use crate::config::FileLimits;
    use tempfile::tempdir;
    use warden_types::ErrorCode;

    fn args(pattern: &str) -> SearchFilesArgs {
        SearchFilesArgs {
            pattern: pattern.to_string(),
            path: ".".to_string(),
            regex: false,
            case_sensitive: true,
            include: None,
            max_results: None,
        }
    }

    fn tree() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::create_dir_all(temp.path().join(".git")).unwrap();
        std::fs::write(temp.path().join("src/lib.rs"), "pub fn alpha() {}\nfn beta() {}\n").unwrap();
        std::fs::write(temp.path().join("notes.md"), "Alpha release\n").unwrap();
        std::fs::write(temp.path().join(".git/config"), "alpha\n").unwrap();
        std::fs::write(temp.path().join("blob.bin"), b"alpha\0\0").unwrap();
        temp
    }

    #[tokio::test]
    async fn literal_search_skips_git_and_binaries() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = SearchFilesTool.run(&ctx, args("alpha")).await.into_result().unwrap();
        assert_eq!(
            out.matches,
            vec![SearchMatch {
                path: "src/lib.rs".to_string(),
                line: 1,
                text: "pub fn alpha() {}".to_string(),
            }]
        );
        assert_eq!(out.files_skipped, 1);
        assert_eq!(out.files_scanned, 2);
        assert!(!out.truncated);
    }

    #[tokio::test]
    async fn case_insensitive_regex_with_include() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = SearchFilesTool
            .run(
                &ctx,
                SearchFilesArgs {
                    regex: true,
                    case_sensitive: false,
                    include: Some("*.md".to_string()),
                    ..args("^alpha")
                },
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].path, "notes.md");
    }

    #[tokio::test]
    async fn include_star_does_not_cross_directories() {
        let temp = tree();
        std::fs::create_dir_all(temp.path().join("docs")).unwrap();
        std::fs::write(temp.path().join("docs/guide.md"), "alpha guide\n").unwrap();
        let ctx = context(temp.path(), true);
        let search = |include: &str| SearchFilesArgs {
            case_sensitive: false,
            include: Some(include.to_string()),
            ..args("alpha")
        };

        let out = SearchFilesTool.run(&ctx, search("*.md")).await.into_result().unwrap();
        let paths: Vec<_> = out.matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["notes.md"]);

        let out = SearchFilesTool.run(&ctx, search("**/*.md")).await.into_result().unwrap();
        let paths: Vec<_> = out.matches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/guide.md", "notes.md"]);
    }

    #[tokio::test]
    async fn literal_mode_escapes_metacharacters() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = SearchFilesTool.run(&ctx, args("beta()")).await.into_result().unwrap();
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].line, 2);
    }

    #[tokio::test]
    async fn results_are_capped() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("many.txt"), "x\n".repeat(10)).unwrap();
        let limits = FileLimits {
            max_search_results: 3,
            ..FileLimits::default()
        };
        let ctx = context_with_limits(temp.path(), true, limits);
        let out = SearchFilesTool.run(&ctx, args("x")).await.into_result().unwrap();
        assert_eq!(out.matches.len(), 3);
        assert!(out.truncated);

        let resp = SearchFilesTool
            .run(&ctx, SearchFilesArgs { max_results: Some(4), ..args("x") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }

    #[tokio::test]
    async fn single_file_and_bad_patterns() {
        let temp = tree();
        let ctx = context(temp.path(), true);
        let out = SearchFilesTool
            .run(
                &ctx,
                SearchFilesArgs {
                    path: "notes.md".to_string(),
                    ..args("release")
                },
            )
            .await
            .into_result()
            .unwrap();
        assert_eq!(out.files_scanned, 1);
        assert_eq!(out.matches.len(), 1);

        let resp = SearchFilesTool.run(&ctx, args("")).await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
        let resp = SearchFilesTool
            .run(&ctx, SearchFilesArgs { regex: true, ..args("(") })
            .await;
        assert_eq!(resp.error(), Some(ErrorCode::ValidationError));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_not_followed() {
        let temp = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "needle\n").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("out")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), temp.path().join("s.txt")).unwrap();
        let ctx = context(temp.path(), true);
        let out = SearchFilesTool.run(&ctx, args("needle")).await.into_result().unwrap();
        assert!(out.matches.is_empty());
        assert_eq!(out.files_scanned, 0);
    }
}
