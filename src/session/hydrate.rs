//! Deterministic instruction preamble built from the three memory tiers.
//!
//! Directives (`tone`, `format`, `story_prefix`) resolve scope over global.
//! Session entries are additive notes only: a session can never set or
//! override a directive.

use std::collections::BTreeMap;

pub const DEFAULT_TONE: &str = "British English";

pub const DIRECTIVE_KEYS: [&str; 3] = ["tone", "format", "story_prefix"];

/// Memory entries for each tier, as read from the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationTiers {
    pub global: BTreeMap<String, String>,
    pub scope: BTreeMap<String, String>,
    pub session: BTreeMap<String, String>,
}

impl HydrationTiers {
    fn directive(&self, key: &str) -> Option<&str> {
        self.scope
            .get(key)
            .or_else(|| self.global.get(key))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Compose `preamble + [Context] + base`, blocks separated by a blank line.
/// The same inputs always produce the same text.
pub fn compose(base: &str, tiers: &HydrationTiers, extra_context: Option<&str>) -> String {
    let mut blocks: Vec<String> = Vec::new();

    let tone = tiers.directive("tone").unwrap_or(DEFAULT_TONE);
    blocks.push(format!("[Tone] Use {}.", tone.trim_end_matches('.')));

    if let Some(format) = tiers.directive("format") {
        blocks.push(format!("[Format] {}", format));
    }
    if let Some(prefix) = tiers.directive("story_prefix") {
        blocks.push(format!("[Story prefix] {}", prefix));
    }

    let notes: Vec<String> = tiers
        .session
        .iter()
        .filter(|(k, v)| !DIRECTIVE_KEYS.contains(&k.as_str()) && !v.trim().is_empty())
        .map(|(k, v)| format!("[Session] {}: {}", k, v.trim()))
        .collect();
    if !notes.is_empty() {
        blocks.push(notes.join("\n"));
    }

    if let Some(extra) = extra_context.map(str::trim).filter(|e| !e.is_empty()) {
        blocks.push(format!("[Context]\n{}", extra));
    }

    blocks.push(base.to_string());
    blocks.join("\n\n")
}

/// Wrap `base` with the session's compact summary so the model can carry
/// context forward without replaying history. Empty summaries leave `base`
/// untouched.
pub fn continuation_prompt(base: &str, compact_summary: &str) -> String {
    let compact = compact_summary.trim();
    if compact.is_empty() {
        return base.to_string();
    }
    format!(
        "You are continuing an ongoing session. Use the compact context below.\n\
         Context (bulleted, newest first):\n{}\n\nTask:\n{}",
        compact, base
    )
}
