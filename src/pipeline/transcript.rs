//! WebVTT reading and the small-talk filter.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::llm::{ChatMessage, GenerativeBackend};

static HEADER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^WEBVTT\b").unwrap());

static TIMING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{2}:\d{2}:\d{2}\.\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}\.\d{3}").unwrap()
});

static CUE_NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

/// Chit-chat phrases. A line containing one is small talk unless it also
/// carries an [`ACTION_HINTS`] phrase.
pub const SMALLTALK_KEYWORDS: &[&str] = &[
    // greetings
    "good morning",
    "good afternoon",
    "good evening",
    "hello everyone",
    "hi everyone",
    "how are you",
    "how’s everyone",
    "weekend",
    "coffee",
    "weather",
    "lunch",
    "breakfast",
    "dinner",
    "holiday",
    "vacation",
    "birthday",
    "congrats",
    "congratulations",
    "nice to meet you",
    // meeting admin
    "can you hear me",
    "i'm on mute",
    "you are on mute",
    "let me share my screen",
    "next slide",
    "previous slide",
    "quick check",
    "small talk",
    // casual
    "the game last night",
    "did you watch the game",
    "netflix",
];

pub const ACTION_HINTS: &[&str] = &[
    "acceptance criteria",
    "jira",
    "story",
    "epic",
    "priority",
    "owner",
    "deadline",
    "timeline",
    "bug",
    "fix",
    "release",
    "sprint",
    "backlog",
    "mttr",
    "sla",
    "uat",
    "qa",
    "test",
    "scenario",
    "deploy",
    "environment",
    "api",
    "endpoint",
    "rate limit",
    "error",
    "logging",
    "monitoring",
    "security",
    "authentication",
    "authorization",
    "mfa",
    "otp",
    "rollback",
    "risk",
    "given",
    "when",
    "then",
    "gherkin",
    "requirement",
    "spec",
    "specification",
    "design",
];

/// Strip the header, cue timings and cue numbers from WebVTT text and
/// return the remaining non-empty, trimmed lines.
pub fn parse_vtt(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !HEADER_REGEX.is_match(line))
        .filter(|line| !TIMING_REGEX.is_match(line))
        .filter(|line| !CUE_NUMBER_REGEX.is_match(line))
        .map(str::to_string)
        .collect()
}

/// Read and parse a transcript. A missing file is [`PipelineError::InputMissing`].
pub fn read_vtt(path: &Path) -> Result<Vec<String>, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::InputMissing {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::SourceReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_vtt(&text))
}

/// Conservative rule: chit-chat keyword without an action hint, or a very
/// short purely alphabetic line.
pub fn is_small_talk(line: &str) -> bool {
    let lower = line.to_lowercase();
    let chatty = SMALLTALK_KEYWORDS.iter().any(|kw| lower.contains(kw));
    let actionable = ACTION_HINTS.iter().any(|hint| lower.contains(hint));
    if chatty && !actionable {
        return true;
    }
    !lower.is_empty() && lower.chars().count() < 8 && lower.chars().all(char::is_alphabetic)
}

const CLASSIFIER_INSTRUCTIONS: &str =
    "Classify meeting transcript lines. Reply exactly: business OR small talk.";

/// Ask the classifier model whether a rule-flagged line is business content.
/// Returns `None` if the call failed.
pub async fn classify_is_business(
    backend: &dyn GenerativeBackend,
    model: &str,
    line: &str,
) -> Option<bool> {
    let messages = [
        ChatMessage::system(CLASSIFIER_INSTRUCTIONS),
        ChatMessage::user(line),
    ];
    match backend.request(&messages, model, 0.0).await {
        Ok(label) => Some(label.to_lowercase().contains("business")),
        Err(error) => {
            warn!(error = %error, "small-talk classifier failed");
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: Vec<String>,
    pub dropped: Vec<String>,
}

/// Split `lines` into kept and dropped. Rule-flagged lines are dropped
/// unless a classifier is supplied and rescues them as business content.
pub async fn filter_lines(
    lines: &[String],
    classifier: Option<(&dyn GenerativeBackend, &str)>,
) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();
    for line in lines {
        if !is_small_talk(line) {
            outcome.kept.push(line.clone());
            continue;
        }
        let rescued = match classifier {
            Some((backend, model)) => classify_is_business(backend, model, line)
                .await
                .unwrap_or(false),
            None => false,
        };
        if rescued {
            debug!(line = %line, "classifier kept rule-flagged line");
            outcome.kept.push(line.clone());
        } else {
            outcome.dropped.push(line.clone());
        }
    }
    outcome
}
