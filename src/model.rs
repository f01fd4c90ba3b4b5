use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filler used when a requirement arrives with fewer than three criteria.
pub const CRITERIA_PLACEHOLDER: &str = "TBD";

/// Structural markers every Gherkin test body must contain.
pub const GHERKIN_MARKERS: [&str; 4] = ["Scenario:", "Given", "When", "Then"];

/// Exactly three acceptance criteria, never more, never fewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcceptanceCriteria([String; 3]);

impl AcceptanceCriteria {
    /// Trim every item, drop blanks, keep the first three and pad the rest
    /// with [`CRITERIA_PLACEHOLDER`].
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = items
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .take(3);
        let mut next = || {
            kept.next()
                .unwrap_or_else(|| CRITERIA_PLACEHOLDER.to_string())
        };
        Self([next(), next(), next()])
    }

    /// Rebuild from the newline-joined form used by the artifact store.
    pub fn from_text(text: &str) -> Self {
        Self::from_items(text.lines())
    }

    pub fn items(&self) -> &[String; 3] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Newline-joined form used by the artifact store.
    pub fn to_text(&self) -> String {
        self.0.join("\n")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
    #[default]
    #[serde(rename = "")]
    Unset,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unset => "",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "" => Ok(Self::Unset),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    Positive,
    Negative,
    Regression,
}

impl ScenarioType {
    pub const ALL: [ScenarioType; 3] = [Self::Positive, Self::Negative, Self::Regression];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Regression => "regression",
        }
    }

    /// Capitalised form used in issue summaries and scenario titles.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Regression => "Regression",
        }
    }

    pub fn tag(&self) -> String {
        format!("@{}", self.as_str())
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "regression" => Ok(Self::Regression),
            _ => Err(format!("Invalid scenario type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: AcceptanceCriteria,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub epic: String,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub requirement_id: String,
    pub scenario_type: ScenarioType,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_key: Option<String>,
}

impl TestCase {
    /// Markers from [`GHERKIN_MARKERS`] that `body` does not contain.
    pub fn missing_markers(body: &str) -> Vec<&'static str> {
        GHERKIN_MARKERS
            .iter()
            .copied()
            .filter(|marker| !body.contains(marker))
            .collect()
    }
}

/// One entry in a session's action log. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub verb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl Action {
    pub fn new(actor: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            actor: actor.into(),
            verb: verb.into(),
            step: None,
            mode: None,
            status: None,
            item_id: None,
            attrs: BTreeMap::new(),
        }
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn item(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = Some(item_id.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.insert(key.into(), value.to_string());
        self
    }

    /// Single-line rendering used for summary bullets and snapshots:
    /// `actor verb step|mode|status|item k=v ...`.
    pub fn describe(&self) -> String {
        let mut parts = vec![self.actor.clone(), self.verb.clone()];
        let qualifiers: Vec<&str> = [&self.step, &self.mode, &self.status, &self.item_id]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if !qualifiers.is_empty() {
            parts.push(qualifiers.join("|"));
        }
        for (k, v) in &self.attrs {
            parts.push(format!("{}={}", k, v));
        }
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_pads_with_placeholder() {
        let ac = AcceptanceCriteria::from_items(["Given a cart"]);
        assert_eq!(ac.items()[0], "Given a cart");
        assert_eq!(ac.items()[1], CRITERIA_PLACEHOLDER);
        assert_eq!(ac.items()[2], CRITERIA_PLACEHOLDER);
    }

    #[test]
    fn test_criteria_truncates_extras_and_drops_blanks() {
        let ac = AcceptanceCriteria::from_items(["a", "  ", "b", "c", "d"]);
        assert_eq!(ac.items(), &["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_criteria_text_roundtrip_keeps_three() {
        let ac = AcceptanceCriteria::from_items(["one", "two"]);
        let back = AcceptanceCriteria::from_text(&ac.to_text());
        assert_eq!(back, ac);
    }

    #[test]
    fn test_criteria_serializes_as_array() {
        let ac = AcceptanceCriteria::from_items(["x", "y", "z"]);
        let json = serde_json::to_string(&ac).unwrap();
        assert_eq!(json, r#"["x","y","z"]"#);
    }

    #[test]
    fn test_priority_roundtrip() {
        for p in [Priority::High, Priority::Medium, Priority::Low, Priority::Unset] {
            assert_eq!(p.as_str().parse::<Priority>().unwrap(), p);
        }
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_priority_unset_serializes_empty() {
        assert_eq!(serde_json::to_string(&Priority::Unset).unwrap(), r#""""#);
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), r#""high""#);
    }

    #[test]
    fn test_scenario_type_parse_and_tag() {
        assert_eq!("negative".parse::<ScenarioType>().unwrap(), ScenarioType::Negative);
        assert!("pos".parse::<ScenarioType>().is_err());
        assert_eq!(ScenarioType::Regression.tag(), "@regression");
        assert_eq!(ScenarioType::Positive.title(), "Positive");
    }

    #[test]
    fn test_missing_markers() {
        assert!(TestCase::missing_markers("Scenario: a Given b When c Then d").is_empty());
        assert_eq!(
            TestCase::missing_markers("Scenario: a Given b"),
            vec!["When", "Then"]
        );
    }

    #[test]
    fn test_action_describe() {
        let action = Action::new("pipeline", "stage_completed")
            .step("ingest")
            .status("ok")
            .attr("kept", 2);
        assert_eq!(action.describe(), "pipeline stage_completed ingest|ok kept=2");
        assert_eq!(Action::new("cli", "approve").describe(), "cli approve");
    }
}
