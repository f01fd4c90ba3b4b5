//! Atlassian document format builders for issue descriptions.

use serde_json::{Value, json};

use crate::model::Requirement;
use crate::store::StoredTestCase;

const SYNC_NOTE: &str = "Auto-synced by the reqflow pipeline.";

pub fn paragraph(text: &str) -> Value {
    json!({"type": "paragraph", "content": [{"type": "text", "text": text}]})
}

pub fn heading(text: &str, level: u8) -> Value {
    json!({
        "type": "heading",
        "attrs": {"level": level.clamp(1, 6)},
        "content": [{"type": "text", "text": text}]
    })
}

pub fn code_block(code: &str, language: &str) -> Value {
    json!({
        "type": "codeBlock",
        "attrs": {"language": language},
        "content": [{"type": "text", "text": code}]
    })
}

pub fn document(nodes: Vec<Value>) -> Value {
    json!({"type": "doc", "version": 1, "content": nodes})
}

pub fn requirement_description(req: &Requirement) -> Value {
    let title = if req.title.is_empty() { "-" } else { req.title.as_str() };
    let mut nodes = vec![
        heading("Requirement", 2),
        paragraph(&format!("ID: {}", req.id)),
        paragraph(&format!("Title: {}", title)),
    ];
    if !req.description.is_empty() {
        nodes.push(heading("Description", 3));
        nodes.push(paragraph(&req.description));
    }
    nodes.push(heading("Acceptance Criteria", 3));
    nodes.extend(req.acceptance_criteria.iter().map(|c| paragraph(c)));
    nodes.push(heading("Sync", 3));
    nodes.push(paragraph(SYNC_NOTE));
    document(nodes)
}

pub fn test_case_description(tc: &StoredTestCase) -> Value {
    document(vec![
        heading("Test Case", 2),
        paragraph(&format!("Requirement: {}", tc.requirement_id)),
        paragraph(&format!("Scenario type: {}", tc.scenario_type)),
        heading("Gherkin", 3),
        code_block(&tc.body, "gherkin"),
        heading("Sync", 3),
        paragraph(SYNC_NOTE),
    ])
}
