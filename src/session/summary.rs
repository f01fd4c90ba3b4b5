//! Rolling, newest-first, character-capped session summary.

use crate::util::truncate_chars;

/// Default character budget for a rolling summary.
pub const DEFAULT_SUMMARY_CHAR_LIMIT: usize = 1800;

/// Default character budget for a single bullet before it is folded in.
pub const DEFAULT_BULLET_CHAR_LIMIT: usize = 220;

const BULLET: &str = "• ";

/// Bulleted digest of recent activity. New bullets are prepended and the
/// tail is cut at `limit` characters, not at a sentence or bullet boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingSummary {
    text: String,
    limit: usize,
    bullet_limit: usize,
}

impl RollingSummary {
    pub fn new(limit: usize, bullet_limit: usize) -> Self {
        Self::from_text("", limit, bullet_limit)
    }

    /// Wrap an existing summary, re-applying the budget in case it shrank.
    pub fn from_text(text: &str, limit: usize, bullet_limit: usize) -> Self {
        Self {
            text: truncate_chars(text, limit).to_string(),
            limit,
            bullet_limit,
        }
    }

    /// Prepend `• {bullet}` and truncate to the budget. Blank bullets are ignored.
    pub fn fold(&mut self, bullet: &str) {
        let bullet = bullet.trim();
        if bullet.is_empty() {
            return;
        }
        let bullet = truncate_chars(bullet, self.bullet_limit);
        let combined = format!("{}{}\n{}", BULLET, bullet, self.text);
        self.text = truncate_chars(&combined, self.limit).to_string();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Default for RollingSummary {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_CHAR_LIMIT, DEFAULT_BULLET_CHAR_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_bullet_first() {
        let mut summary = RollingSummary::default();
        summary.fold("first");
        summary.fold("second");
        assert_eq!(summary.as_str(), "• second\n• first\n");
    }

    #[test]
    fn test_length_never_exceeds_budget() {
        let mut summary = RollingSummary::new(100, 40);
        for i in 0..500 {
            summary.fold(&format!("action number {} with some padding text", i));
            assert!(summary.as_str().chars().count() <= 100);
            assert!(summary.as_str().starts_with(&format!("• action number {} ", i)));
        }
    }

    #[test]
    fn test_long_bullet_is_capped() {
        let mut summary = RollingSummary::new(1000, 10);
        summary.fold(&"x".repeat(50));
        assert_eq!(summary.as_str(), format!("• {}\n", "x".repeat(10)));
    }

    #[test]
    fn test_blank_bullet_ignored() {
        let mut summary = RollingSummary::default();
        summary.fold("   ");
        assert!(summary.is_empty());
    }

    #[test]
    fn test_multibyte_truncation_is_safe() {
        let mut summary = RollingSummary::new(7, 220);
        summary.fold("ééééééééé");
        assert_eq!(summary.as_str().chars().count(), 7);
    }

    #[test]
    fn test_from_text_reapplies_budget() {
        let summary = RollingSummary::from_text("abcdef", 3, 220);
        assert_eq!(summary.as_str(), "abc");
    }
}
