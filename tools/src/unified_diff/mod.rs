//! Unified diff parsing and in-memory hunk application for a single file.

mod apply;
mod parse;

use std::fmt;

use serde::Serialize;

pub use apply::{TextLines, apply_hunks};
pub use parse::parse_patch;

/// One parsed `@@` hunk.
///
/// `context_before + removals + context_after` is the old side and
/// `context_before + additions + context_after` the new side; their lengths
/// equal `old_count` and `new_count`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub context_before: Vec<String>,
    pub removals: Vec<String>,
    pub additions: Vec<String>,
    pub context_after: Vec<String>,
    /// `\ No newline at end of file` followed an old-side line.
    pub old_missing_newline: bool,
    /// `\ No newline at end of file` followed a new-side line.
    pub new_missing_newline: bool,
}

impl ParsedHunk {
    pub fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.context_before
            .iter()
            .chain(&self.removals)
            .chain(&self.context_after)
            .map(String::as_str)
    }

    #[must_use]
    pub fn old_len(&self) -> usize {
        self.context_before.len() + self.removals.len() + self.context_after.len()
    }
}

/// Parser output: optional header paths and the hunks in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPatch {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<ParsedHunk>,
}

impl ParsedPatch {
    /// Header paths present in the patch.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.old_path
            .as_deref()
            .into_iter()
            .chain(self.new_path.as_deref())
    }

    #[must_use]
    pub fn lines_added(&self) -> usize {
        self.hunks.iter().map(|h| h.additions.len()).sum()
    }

    #[must_use]
    pub fn lines_removed(&self) -> usize {
        self.hunks.iter().map(|h| h.removals.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchErrorKind {
    ParseError,
    ContextMismatch,
}

impl fmt::Display for PatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatchErrorKind::ParseError => "parse error",
            PatchErrorKind::ContextMismatch => "context mismatch",
        })
    }
}

/// Structured failure from parsing or applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct PatchParseError {
    pub kind: PatchErrorKind,
    /// Zero-based index of the hunk involved, if any.
    pub hunk_index: Option<usize>,
    pub message: String,
    /// Short quoted excerpt of the offending patch line.
    pub excerpt: Option<String>,
}

impl PatchParseError {
    pub(crate) fn parse(hunk_index: Option<usize>, message: impl Into<String>, line: Option<&str>) -> Self {
        Self {
            kind: PatchErrorKind::ParseError,
            hunk_index,
            message: message.into(),
            excerpt: line.map(|l| warden_types::truncate_snippet(l, 50)),
        }
    }
}

impl fmt::Display for PatchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(index) = self.hunk_index {
            write!(f, " in hunk {}", index + 1)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(excerpt) = &self.excerpt {
            write!(f, " (near {excerpt})")?;
        }
        Ok(())
    }
}
