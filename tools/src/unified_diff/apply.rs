//! Apply parsed hunks to in-memory text.

use warden_types::truncate_snippet;

use super::{ParsedHunk, PatchErrorKind, PatchParseError};

const SNIPPET_CHARS: usize = 50;

/// Line ending style detected in file content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eol {
    Lf,
    CrLf,
}

impl Eol {
    /// A patch line as it should appear in this file's line list. CRLF files
    /// store lines without `\r`; LF files keep whatever the patch carried.
    fn patch_line(self, line: &str) -> &str {
        match self {
            Self::CrLf => line.strip_suffix('\r').unwrap_or(line),
            Self::Lf => line,
        }
    }
}

/// File content as lines plus whether it ended with a newline.
///
/// `TextLines::parse(s).render() == s` for every input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLines {
    pub lines: Vec<String>,
    pub final_newline: bool,
    eol: Eol,
}

impl TextLines {
    #[must_use]
    pub fn parse(content: &str) -> Self {
        if content.is_empty() {
            return Self {
                lines: Vec::new(),
                final_newline: false,
                eol: Eol::Lf,
            };
        }
        let (body, final_newline) = match content.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (content, false),
        };
        let newlines = content.matches('\n').count();
        let eol = if newlines > 0 && content.matches("\r\n").count() == newlines {
            Eol::CrLf
        } else {
            Eol::Lf
        };
        let lines = body
            .split('\n')
            .map(|line| match eol {
                Eol::CrLf => line.strip_suffix('\r').unwrap_or(line).to_string(),
                Eol::Lf => line.to_string(),
            })
            .collect();
        Self {
            lines,
            final_newline,
            eol,
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return String::new();
        }
        let sep = match self.eol {
            Eol::Lf => "\n",
            Eol::CrLf => "\r\n",
        };
        let mut out = self.lines.join(sep);
        if self.final_newline {
            out.push_str(sep);
        }
        out
    }
}

/// Apply `hunks` in order to `original`, returning the new content.
///
/// Each hunk's old side must match exactly at its declared start, shifted by
/// the net line delta of the hunks applied before it. The first mismatch
/// aborts the whole apply.
pub fn apply_hunks(original: &str, hunks: &[ParsedHunk]) -> Result<String, PatchParseError> {
    let mut text = TextLines::parse(original);
    let mut offset: isize = 0;

    for (index, hunk) in hunks.iter().enumerate() {
        let old_len = hunk.old_len();
        // A pure insertion anchors after line `old_start`.
        let anchor = if old_len == 0 {
            to_isize(hunk.old_start)
        } else {
            to_isize(hunk.old_start) - 1
        };
        let target = usize::try_from(anchor + offset).map_err(|_| {
            mismatch(
                index,
                format!(
                    "hunk starts before line 1 (header line {}, offset {offset})",
                    hunk.old_start
                ),
            )
        })?;
        if target > text.lines.len() {
            return Err(mismatch(
                index,
                format!(
                    "hunk starts at line {} but the file has {} lines",
                    target + 1,
                    text.lines.len()
                ),
            ));
        }

        let eol = text.eol;
        for (k, expected) in hunk.old_lines().enumerate() {
            let line_no = target + k + 1;
            let expected = eol.patch_line(expected);
            match text.lines.get(target + k) {
                Some(actual) if same_line(actual, expected) => {}
                Some(actual) => {
                    return Err(mismatch(
                        index,
                        format!(
                            "expected {} at line {line_no}, found {}",
                            truncate_snippet(expected, SNIPPET_CHARS),
                            truncate_snippet(actual, SNIPPET_CHARS)
                        ),
                    ));
                }
                None => {
                    return Err(mismatch(
                        index,
                        format!(
                            "expected {} at line {line_no}, found <end of file>",
                            truncate_snippet(expected, SNIPPET_CHARS)
                        ),
                    ));
                }
            }
        }

        let was_empty = text.lines.is_empty();
        let touches_eof = target + old_len == text.lines.len();
        // Context keeps the file's own text; only additions come from the patch.
        let before = hunk.context_before.len();
        let after = target + before + hunk.removals.len();
        let mut replacement = text.lines[target..target + before].to_vec();
        replacement.extend(hunk.additions.iter().map(|line| eol.patch_line(line).to_string()));
        replacement.extend_from_slice(&text.lines[after..target + old_len]);
        text.lines.splice(target..target + old_len, replacement);
        offset += to_isize(hunk.additions.len()) - to_isize(hunk.removals.len());

        if touches_eof {
            if hunk.new_missing_newline {
                text.final_newline = false;
            } else if hunk.old_missing_newline || was_empty {
                text.final_newline = true;
            }
        }
    }

    Ok(text.render())
}

// Lines are equal up to one trailing `\r` on either side.
fn same_line(actual: &str, expected: &str) -> bool {
    actual == expected || trim_cr(actual) == trim_cr(expected)
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn to_isize(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

fn mismatch(index: usize, message: String) -> PatchParseError {
    PatchParseError {
        kind: PatchErrorKind::ContextMismatch,
        hunk_index: Some(index),
        message,
        excerpt: None,
    }
}
