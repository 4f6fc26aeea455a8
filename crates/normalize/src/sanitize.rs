const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_CHARS: usize = 200;
const PLACEHOLDER: &str = "untitled";

/// Turn an arbitrary title into a safe single path component.
///
/// - Characters that are illegal in file names on common filesystems, and
///   control characters, become `_`.
/// - Whitespace runs collapse to a single space and the ends are trimmed.
/// - The result is capped at 200 characters (not bytes).
/// - An empty result, or one made only of dots (`.`, `..`), becomes
///   `untitled`, so the output is never empty and never navigates upwards.
///
/// Deterministic: the same input always yields the same name. Distinct
/// titles may collide.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) || (c.is_control() && !c.is_whitespace()) { '_' } else { c })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_CHARS).collect();
    let trimmed = truncated.trim_end();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return PLACEHOLDER.to_string();
    }
    trimmed.to_string()
}
