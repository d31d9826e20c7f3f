//! Unified diff text to [`ParsedPatch`].

use super::{ParsedHunk, ParsedPatch, PatchParseError};

/// Position inside a hunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ContextBefore,
    Changes,
    ContextAfter,
}

/// Side(s) of the last counted body line, for `\` marker attribution.
#[derive(Debug, Clone, Copy)]
enum LastLine {
    Context,
    Removal,
    Addition,
}

struct HunkHeader {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
}

/// Parse a single-file unified diff.
///
/// Lines before the first `@@` other than `---`/`+++` headers and diff body
/// lines are ignored (`diff --git`, `index ...`, free text).
///
/// Lines split on `\n` only. A `\r` before it stays on body lines so a diff of
/// a file with mixed line endings still matches that file; the applier decides
/// whether to drop it.
pub fn parse_patch(text: &str) -> Result<ParsedPatch, PatchParseError> {
    let lines = split_lines(text);
    let mut patch = ParsedPatch::default();
    let mut i = 0;

    while i < lines.len() {
        let line = without_cr(lines[i]);
        if line.starts_with("@@") {
            let index = patch.hunks.len();
            let header = parse_hunk_header(line)
                .map_err(|msg| PatchParseError::parse(Some(index), msg, Some(line)))?;
            let (hunk, next) = parse_body(&lines, i + 1, &header, index)?;
            patch.hunks.push(hunk);
            i = next;
            continue;
        }

        if patch.hunks.is_empty() {
            if let Some(rest) = line.strip_prefix("--- ") {
                patch.old_path = header_path(rest);
            } else if let Some(rest) = line.strip_prefix("+++ ") {
                patch.new_path = header_path(rest);
            } else if is_body_line(line) {
                return Err(PatchParseError::parse(
                    None,
                    "diff body line before the first @@ hunk header",
                    Some(line),
                ));
            }
        } else if line.starts_with("--- ") || line.starts_with("+++ ") {
            return Err(PatchParseError::parse(
                None,
                "patch touches more than one file; send one file per call",
                Some(line),
            ));
        } else if is_body_line(line) || line.starts_with('\\') {
            return Err(PatchParseError::parse(
                Some(patch.hunks.len() - 1),
                "hunk has more lines than its header declares",
                Some(line),
            ));
        }
        i += 1;
    }

    if patch.hunks.is_empty() {
        return Err(PatchParseError::parse(
            None,
            "no @@ -a,b +c,d @@ hunk header found",
            lines.first().copied(),
        ));
    }
    Ok(patch)
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}

fn without_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn is_body_line(line: &str) -> bool {
    line.starts_with([' ', '+', '-'])
}

/// Path from a `---`/`+++` header: timestamps dropped, `a/`/`b/` stripped,
/// `/dev/null` meaning no file.
fn header_path(rest: &str) -> Option<String> {
    let raw = rest.split('\t').next().unwrap_or_default().trim();
    if raw.is_empty() || raw == "/dev/null" {
        return None;
    }
    let stripped = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(stripped.to_string())
}

// Format: @@ -L[,N] +L[,N] @@[ section]
fn parse_hunk_header(header: &str) -> Result<HunkHeader, String> {
    let inner = header
        .strip_prefix("@@ ")
        .and_then(|rest| rest.split_once(" @@"))
        .map(|(ranges, _section)| ranges)
        .ok_or_else(|| "malformed hunk header".to_string())?;

    let mut parts = inner.split_whitespace();
    let (Some(old), Some(new), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("expected two ranges in hunk header, got '{inner}'"));
    };
    let old = old
        .strip_prefix('-')
        .ok_or_else(|| format!("old range must start with '-': '{old}'"))?;
    let new = new
        .strip_prefix('+')
        .ok_or_else(|| format!("new range must start with '+': '{new}'"))?;
    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;
    Ok(HunkHeader {
        old_start,
        old_count,
        new_start,
        new_count,
    })
}

fn parse_range(s: &str) -> Result<(usize, usize), String> {
    if let Some((start, count)) = s.split_once(',') {
        let start = start
            .parse::<usize>()
            .map_err(|e| format!("bad line number '{start}': {e}"))?;
        let count = count
            .parse::<usize>()
            .map_err(|e| format!("bad count '{count}': {e}"))?;
        Ok((start, count))
    } else {
        let start = s
            .parse::<usize>()
            .map_err(|e| format!("bad line number '{s}': {e}"))?;
        Ok((start, 1))
    }
}

/// Consume one hunk body starting at `start`; returns the hunk and the index
/// of the first line after it.
fn parse_body(
    lines: &[&str],
    start: usize,
    header: &HunkHeader,
    index: usize,
) -> Result<(ParsedHunk, usize), PatchParseError> {
    let mut hunk = ParsedHunk {
        old_start: header.old_start,
        old_count: header.old_count,
        new_start: header.new_start,
        new_count: header.new_count,
        ..ParsedHunk::default()
    };
    let mut phase = Phase::ContextBefore;
    let mut old_seen = 0;
    let mut new_seen = 0;
    let mut last: Option<LastLine> = None;
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];
        let old_left = header.old_count - old_seen;
        let new_left = header.new_count - new_seen;

        if let Some(marker) = line.strip_prefix('\\') {
            tracing::debug!(hunk = index, marker = marker.trim(), "No-newline marker");
            match last {
                Some(LastLine::Context) => {
                    hunk.old_missing_newline = true;
                    hunk.new_missing_newline = true;
                }
                Some(LastLine::Removal) => hunk.old_missing_newline = true,
                Some(LastLine::Addition) => hunk.new_missing_newline = true,
                None => {}
            }
            i += 1;
            continue;
        }
        if old_left == 0 && new_left == 0 {
            break;
        }
        if line.starts_with("@@") {
            break;
        }

        let malformed =
            |msg: &str| PatchParseError::parse(Some(index), msg, Some(without_cr(line)));
        match without_cr(line).chars().next() {
            // Blank line: context when both sides still expect lines,
            // otherwise an editor or generator artifact.
            None => {
                if old_left > 0 && new_left > 0 {
                    push_context(&mut hunk, &mut phase, String::new());
                    old_seen += 1;
                    new_seen += 1;
                    last = Some(LastLine::Context);
                }
            }
            Some(' ') => {
                if old_left == 0 || new_left == 0 {
                    return Err(malformed("context line exceeds the counts in the hunk header"));
                }
                push_context(&mut hunk, &mut phase, line[1..].to_string());
                old_seen += 1;
                new_seen += 1;
                last = Some(LastLine::Context);
            }
            Some('-') => {
                if old_left == 0 {
                    return Err(malformed("removal exceeds the old line count in the hunk header"));
                }
                if phase == Phase::ContextAfter {
                    return Err(malformed(
                        "change after trailing context; split separate changes into separate hunks",
                    ));
                }
                phase = Phase::Changes;
                hunk.removals.push(line[1..].to_string());
                old_seen += 1;
                last = Some(LastLine::Removal);
            }
            Some('+') => {
                if new_left == 0 {
                    return Err(malformed("addition exceeds the new line count in the hunk header"));
                }
                if phase == Phase::ContextAfter {
                    return Err(malformed(
                        "change after trailing context; split separate changes into separate hunks",
                    ));
                }
                phase = Phase::Changes;
                hunk.additions.push(line[1..].to_string());
                new_seen += 1;
                last = Some(LastLine::Addition);
            }
            Some(_) => return Err(malformed("unexpected line in hunk body")),
        }
        i += 1;
    }

    if old_seen != header.old_count || new_seen != header.new_count {
        return Err(PatchParseError::parse(
            Some(index),
            format!(
                "hunk body ended early: read {old_seen} of {} old and {new_seen} of {} new lines",
                header.old_count, header.new_count
            ),
            lines.get(start.saturating_sub(1)).copied(),
        ));
    }
    Ok((hunk, i))
}

fn push_context(hunk: &mut ParsedHunk, phase: &mut Phase, text: String) {
    match phase {
        Phase::ContextBefore => hunk.context_before.push(text),
        Phase::Changes | Phase::ContextAfter => {
            *phase = Phase::ContextAfter;
            hunk.context_after.push(text);
        }
    }
}
