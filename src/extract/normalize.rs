//! Normalization of parsed generative output into validated entities.
//!
//! Requirements are always kept (with their ids rewritten and criteria
//! coerced); test cases are validated one by one and rejects are returned
//! alongside the survivors so callers can count them.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::errors::ValidationError;
use crate::model::{AcceptanceCriteria, Priority, Requirement, ScenarioType, TestCase};
use crate::util::collapse_whitespace;

static REQ_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^REQ-\d{3,}$").unwrap());

static LOOSE_REQ_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^REQ-?(\d+)$").unwrap());

static TAG_SPLIT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,\s]+").unwrap());

/// Sequential requirement id for a 1-based list position.
pub fn requirement_id(position: usize) -> String {
    format!("REQ-{:03}", position)
}

/// True if `id` already has the canonical `REQ-NNN` shape.
pub fn is_canonical_req_id(id: &str) -> bool {
    REQ_ID_REGEX.is_match(id)
}

/// Map `req-7`, `REQ7`, `REQ-0007` and friends onto the canonical form.
/// Returns `None` when the input does not look like a requirement id.
pub fn normalize_req_id(raw: &str) -> Option<String> {
    let upper = raw.trim().to_uppercase();
    let caps = LOOSE_REQ_ID_REGEX.captures(&upper)?;
    let n: u64 = caps[1].parse().ok()?;
    Some(format!("REQ-{:03}", n))
}

pub fn parse_priority(raw: &str) -> Priority {
    match raw.trim().to_lowercase().as_str() {
        "high" | "hi" | "h" => Priority::High,
        "medium" | "med" | "m" => Priority::Medium,
        "low" | "lo" | "l" => Priority::Low,
        _ => Priority::Unset,
    }
}

/// Canonical scenario name, with near-miss aliases mapped. Anything
/// unrecognized comes back lowercased so validation can reject it.
pub fn normalize_scenario(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match lowered.as_str() {
        "pos" => "positive".to_string(),
        "neg" => "negative".to_string(),
        "reg" | "regress" => "regression".to_string(),
        _ => lowered,
    }
}

/// Coerce whatever the model produced into exactly three criteria.
///
/// Arrays contribute one criterion per element. A single string is split on
/// newlines with list bullets stripped.
pub fn coerce_criteria(value: Option<&Value>) -> AcceptanceCriteria {
    match value {
        Some(Value::Array(items)) => AcceptanceCriteria::from_items(items.iter().map(scalar_text)),
        Some(Value::String(text)) => AcceptanceCriteria::from_items(
            text.lines()
                .map(|line| line.trim_matches(|c: char| matches!(c, '-' | '•' | ' ' | '\t'))),
        ),
        _ => AcceptanceCriteria::from_items(std::iter::empty::<&str>()),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .map(scalar_text)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Build requirements from parsed items, rewriting ids by list position.
///
/// Non-object items are skipped before numbering, so ids are always
/// `REQ-001..REQ-00n` in order for the `n` objects kept.
pub fn normalize_requirements(items: &[Value]) -> Vec<Requirement> {
    items
        .iter()
        .filter_map(Value::as_object)
        .enumerate()
        .map(|(i, obj)| {
            let criteria = obj
                .get("acceptance_criteria")
                .or_else(|| obj.get("acceptance_riteria"));
            Requirement {
                id: requirement_id(i + 1),
                title: text_field(obj, &["title", "name"]),
                description: text_field(obj, &["description"]),
                acceptance_criteria: coerce_criteria(criteria),
                priority: parse_priority(&text_field(obj, &["priority"])),
                epic: text_field(obj, &["epic"]),
                approved: obj.get("approved").and_then(Value::as_bool).unwrap_or(false),
                external_key: None,
            }
        })
        .collect()
}

fn canonical_id(req: &Requirement) -> Option<String> {
    normalize_req_id(&req.id).filter(|id| is_canonical_req_id(id))
}

/// Drop later duplicates, first occurrence wins, order preserved.
///
/// Two requirements are the same if their ids normalize to the same
/// canonical id, or if their lowercased title and description match.
/// Returns the survivors and the number removed.
pub fn dedupe_requirements(reqs: Vec<Requirement>) -> (Vec<Requirement>, usize) {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_content: HashSet<(String, String)> = HashSet::new();
    let before = reqs.len();

    let kept: Vec<Requirement> = reqs
        .into_iter()
        .filter(|req| {
            let id = canonical_id(req);
            let content = (req.title.to_lowercase(), req.description.to_lowercase());
            let duplicate = id.as_ref().is_some_and(|id| seen_ids.contains(id))
                || seen_content.contains(&content);
            if duplicate {
                return false;
            }
            if let Some(id) = id {
                seen_ids.insert(id);
            }
            seen_content.insert(content);
            true
        })
        .collect();

    let removed = before - kept.len();
    (kept, removed)
}

/// Re-validate a requirement that came from somewhere other than the parser:
/// canonical id if possible, trimmed text, criteria coerced to three.
pub fn revalidate_requirement(mut req: Requirement) -> Requirement {
    if let Some(id) = normalize_req_id(&req.id) {
        req.id = id;
    }
    req.title = req.title.trim().to_string();
    req.description = req.description.trim().to_string();
    req.epic = req.epic.trim().to_string();
    req.acceptance_criteria = AcceptanceCriteria::from_items(req.acceptance_criteria.iter());
    req
}

/// `@`-prefixed, lowercased, deduplicated tags with the scenario tag last
/// if it was not already present.
pub fn normalize_tags(raw: Option<&Value>, scenario: ScenarioType) -> Vec<String> {
    let pieces: Vec<String> = match raw {
        Some(Value::Array(items)) => items.iter().map(scalar_text).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::new();
    for piece in &pieces {
        for token in TAG_SPLIT_REGEX.split(piece) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let tag = if token.starts_with('@') {
                token.to_lowercase()
            } else {
                format!("@{}", token.to_lowercase())
            };
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    let scenario_tag = scenario.tag();
    if !tags.contains(&scenario_tag) {
        tags.push(scenario_tag);
    }
    tags
}

/// A test case that failed validation, kept only for counting and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTestCase {
    pub requirement_id: String,
    pub scenario: String,
    pub reason: ValidationError,
}

/// Validate one parsed test case against the set of known requirement ids.
pub fn validate_test_case(
    value: &Value,
    known_ids: &HashSet<String>,
) -> Result<TestCase, RejectedTestCase> {
    let empty = serde_json::Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let raw_id = text_field(obj, &["requirement_id", "req_id"]);
    let requirement_id = normalize_req_id(&raw_id).unwrap_or_else(|| raw_id.to_uppercase());
    let scenario = normalize_scenario(&text_field(obj, &["scenario_type", "type", "scenario"]));
    let reject = |reason| RejectedTestCase {
        requirement_id: requirement_id.clone(),
        scenario: scenario.clone(),
        reason,
    };

    if requirement_id.is_empty() {
        return Err(reject(ValidationError::MissingIdentity));
    }
    let scenario_type: ScenarioType = scenario
        .parse()
        .map_err(|_| reject(ValidationError::UnknownScenario(scenario.clone())))?;

    let body = collapse_whitespace(&text_field(obj, &["gherkin", "body"]));
    let missing = TestCase::missing_markers(&body);
    if !missing.is_empty() {
        return Err(reject(ValidationError::MissingMarkers {
            requirement_id: requirement_id.clone(),
            scenario: scenario.clone(),
            missing,
        }));
    }

    if !known_ids.contains(&requirement_id) {
        return Err(reject(ValidationError::UnknownRequirement(
            requirement_id.clone(),
        )));
    }

    Ok(TestCase {
        tags: normalize_tags(obj.get("tags"), scenario_type),
        requirement_id,
        scenario_type,
        body,
        external_key: None,
    })
}

/// Validate a batch, splitting survivors from rejects. Never fails.
pub fn normalize_test_cases(
    items: &[Value],
    known_ids: &HashSet<String>,
) -> (Vec<TestCase>, Vec<RejectedTestCase>) {
    let mut kept = Vec::new();
    let mut rejected = Vec::new();
    for item in items {
        match validate_test_case(item, known_ids) {
            Ok(tc) => kept.push(tc),
            Err(rej) => rejected.push(rej),
        }
    }
    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CRITERIA_PLACEHOLDER;
    use serde_json::json;

    fn req(id: &str, title: &str, description: &str) -> Requirement {
        Requirement {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            acceptance_criteria: AcceptanceCriteria::from_items(["a", "b", "c"]),
            priority: Priority::Unset,
            epic: String::new(),
            approved: false,
            external_key: None,
        }
    }

    fn ids(set: &[&str]) -> HashSet<String> {
        set.iter().map(|s| s.to_string()).collect()
    }

    // ── requirement ids ──

    #[test]
    fn test_ids_are_rewritten_sequentially() {
        let items = vec![
            json!({"id": "REQ-900", "title": "a"}),
            json!({"id": "x", "title": "b"}),
            json!("not an object"),
            json!({"title": "c"}),
        ];
        let reqs = normalize_requirements(&items);
        let got: Vec<&str> = reqs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["REQ-001", "REQ-002", "REQ-003"]);
        assert_eq!(reqs[2].title, "c");
    }

    #[test]
    fn test_normalize_req_id_variants() {
        assert_eq!(normalize_req_id("req-7").as_deref(), Some("REQ-007"));
        assert_eq!(normalize_req_id("REQ12").as_deref(), Some("REQ-012"));
        assert_eq!(normalize_req_id(" REQ-0001 ").as_deref(), Some("REQ-001"));
        assert_eq!(normalize_req_id("REQ-1234").as_deref(), Some("REQ-1234"));
        assert_eq!(normalize_req_id("story-1"), None);
        assert!(is_canonical_req_id("REQ-001"));
        assert!(!is_canonical_req_id("REQ-01"));
    }

    // ── acceptance criteria ──

    #[test]
    fn test_criteria_from_array_pads_and_truncates() {
        let short = coerce_criteria(Some(&json!(["one"])));
        assert_eq!(short.items()[0], "one");
        assert_eq!(short.items()[2], CRITERIA_PLACEHOLDER);

        let long = coerce_criteria(Some(&json!(["1", "2", "3", "4", "5"])));
        assert_eq!(long.items(), &["1".to_string(), "2".to_string(), "3".to_string()]);
    }

    #[test]
    fn test_criteria_from_bulleted_string() {
        let ac = coerce_criteria(Some(&json!("- Given a\n• When b\n\n  - Then c")));
        assert_eq!(ac.items(), &["Given a".to_string(), "When b".to_string(), "Then c".to_string()]);
    }

    #[test]
    fn test_criteria_missing_is_all_placeholders() {
        let ac = coerce_criteria(None);
        assert!(ac.iter().all(|c| c == CRITERIA_PLACEHOLDER));
    }

    #[test]
    fn test_legacy_criteria_key_is_accepted() {
        let reqs = normalize_requirements(&[json!({
            "title": "t",
            "acceptance_riteria": ["x", "y", "z"]
        })]);
        assert_eq!(reqs[0].acceptance_criteria.items()[0], "x");
    }

    #[test]
    fn test_priority_aliases() {
        assert_eq!(parse_priority("H"), Priority::High);
        assert_eq!(parse_priority("med"), Priority::Medium);
        assert_eq!(parse_priority("lo"), Priority::Low);
        assert_eq!(parse_priority("critical"), Priority::Unset);
    }

    // ── dedupe ──

    #[test]
    fn test_dedupe_same_normalized_id() {
        let reqs = vec![req("REQ-1", "first", "d1"), req("REQ-001", "second", "d2")];
        let (kept, removed) = dedupe_requirements(reqs);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "first");
    }

    #[test]
    fn test_dedupe_same_content_different_ids() {
        let reqs = vec![
            req("REQ-001", "Checkout", "Totals"),
            req("REQ-002", "checkout", "TOTALS"),
            req("REQ-003", "Other", "Totals"),
        ];
        let (kept, removed) = dedupe_requirements(reqs);
        assert_eq!(removed, 1);
        let got: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(got, vec!["REQ-001", "REQ-003"]);
    }

    #[test]
    fn test_dedupe_without_ids_uses_content() {
        let reqs = vec![req("", "A", "b"), req("", "a", "B"), req("", "c", "d")];
        let (kept, removed) = dedupe_requirements(reqs);
        assert_eq!(removed, 1);
        assert_eq!(kept.len(), 2);
    }

    // ── scenarios and tags ──

    #[test]
    fn test_scenario_aliases() {
        assert_eq!(normalize_scenario("POS"), "positive");
        assert_eq!(normalize_scenario("neg"), "negative");
        assert_eq!(normalize_scenario("regress"), "regression");
        assert_eq!(normalize_scenario("Edge"), "edge");
    }

    #[test]
    fn test_tags_normalized_and_scenario_tag_added() {
        let tags = normalize_tags(Some(&json!(["Smoke, @UI", "smoke"])), ScenarioType::Negative);
        assert_eq!(tags, vec!["@smoke", "@ui", "@negative"]);

        let tags = normalize_tags(Some(&json!("@positive checkout")), ScenarioType::Positive);
        assert_eq!(tags, vec!["@positive", "@checkout"]);
    }

    // ── test case validation ──

    #[test]
    fn test_valid_test_case_is_collapsed_and_kept() {
        let item = json!({
            "requirement_id": "req-1",
            "scenario_type": "pos",
            "gherkin": "Scenario: ok\n  Given a\n  When b\n  Then c",
        });
        let tc = validate_test_case(&item, &ids(&["REQ-001"])).unwrap();
        assert_eq!(tc.requirement_id, "REQ-001");
        assert_eq!(tc.scenario_type, ScenarioType::Positive);
        assert_eq!(tc.body, "Scenario: ok Given a When b Then c");
        assert_eq!(tc.tags, vec!["@positive"]);
    }

    #[test]
    fn test_rejects_are_counted_not_raised() {
        let items = vec![
            json!({"requirement_id": "REQ-001", "scenario_type": "edge",
                   "gherkin": "Scenario: x Given a When b Then c"}),
            json!({"requirement_id": "REQ-001", "scenario_type": "negative",
                   "gherkin": "Scenario: x Given a"}),
            json!({"requirement_id": "REQ-009", "scenario_type": "regression",
                   "gherkin": "Scenario: x Given a When b Then c"}),
            json!({"scenario_type": "positive"}),
            json!({"requirement_id": "REQ-001", "scenario_type": "positive",
                   "gherkin": "Scenario: x Given a When b Then c"}),
        ];
        let (kept, rejected) = normalize_test_cases(&items, &ids(&["REQ-001"]));
        assert_eq!(kept.len(), 1);
        assert_eq!(rejected.len(), 4);
        assert_eq!(
            rejected[0].reason,
            ValidationError::UnknownScenario("edge".into())
        );
        assert!(matches!(
            rejected[1].reason,
            ValidationError::MissingMarkers { .. }
        ));
        assert_eq!(
            rejected[2].reason,
            ValidationError::UnknownRequirement("REQ-009".into())
        );
        assert_eq!(rejected[3].reason, ValidationError::MissingIdentity);
    }
}
