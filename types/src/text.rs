//! Small pure text helpers.

/// Truncate a string to fit within `max_total` characters, appending `suffix` if truncated.
///
/// The suffix counts toward the budget: the returned string is at most `max_total` characters.
#[must_use]
pub fn truncate_to_fit(raw: &str, max_total: usize, suffix: &str) -> String {
    if raw.chars().count() <= max_total {
        return raw.to_string();
    }
    let take = max_total.saturating_sub(suffix.chars().count());
    let head: String = raw.chars().take(take).collect();
    format!("{head}{suffix}")
}

/// Render a line of file or patch text for a diagnostic message.
///
/// Whitespace is preserved (indentation is usually what differs), the result
/// is quoted so trailing spaces stay visible, and long lines are cut to `max`
/// characters with `...`.
#[must_use]
pub fn truncate_snippet(raw: &str, max: usize) -> String {
    let max = max.max(3);
    format!("{:?}", truncate_to_fit(raw, max, "..."))
}
