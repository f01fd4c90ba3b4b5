//! Shared string helpers for the reqflow crate.

/// Lowercase ASCII slug: runs of anything outside `[a-z0-9]` become a single
/// `-`, leading/trailing dashes are trimmed, and the result is capped at
/// `max_len` bytes. Returns `"na"` when nothing survives.
pub fn slugify(text: &str, max_len: usize) -> String {
    let slug = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    // slug is pure ASCII here, so byte slicing is safe
    let slug = if slug.len() > max_len {
        slug[..max_len].trim_end_matches('-').to_string()
    } else {
        slug
    };

    if slug.is_empty() { "na".to_string() } else { slug }
}

/// Keep at most `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Collapse every run of whitespace (newlines included) into a single space.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Positive", 60), "positive");
        assert_eq!(slugify("Happy Path / Edge", 60), "happy-path-edge");
    }

    #[test]
    fn test_slugify_trims_and_caps() {
        assert_eq!(slugify("--Hello__World--", 60), "hello-world");
        assert_eq!(slugify("abcdef-ghij", 7), "abcdef");
    }

    #[test]
    fn test_slugify_empty_is_na() {
        assert_eq!(slugify("", 60), "na");
        assert_eq!(slugify("!!!", 60), "na");
        assert_eq!(slugify("été", 60), "t");
    }

    #[test]
    fn test_truncate_chars_unicode_does_not_panic() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(
            collapse_whitespace("Scenario: x\n    Given a\n\tWhen b  Then c\n"),
            "Scenario: x Given a When b Then c"
        );
    }
}
