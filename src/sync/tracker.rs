use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::TrackerError;
use crate::util::slugify;

/// Label attached to every synced issue alongside its identity label.
pub const SYNC_LABEL: &str = "genai-sync";

/// Identity label for a requirement.
pub fn requirement_label(requirement_id: &str) -> String {
    format!("req-{}", requirement_id.to_lowercase())
}

/// Identity label for a test case.
pub fn test_case_label(requirement_id: &str, scenario_type: &str) -> String {
    format!(
        "tc-{}-{}",
        requirement_id.to_lowercase(),
        slugify(scenario_type, 60)
    )
}

/// Everything needed to create or update one remote issue.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueDraft {
    /// Deterministic identity label; also the search key.
    pub label: String,
    pub summary: String,
    /// Atlassian document.
    pub description: Value,
    pub issue_type: String,
}

impl IssueDraft {
    pub fn labels(&self) -> [&str; 2] {
        [self.label.as_str(), SYNC_LABEL]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub key: String,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
}

/// Remote issue tracker.
/// Real implementation: `JiraTracker`. Test double: `testing::MemoryTracker`.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn update_issue(&self, key: &str, draft: &IssueDraft) -> Result<(), TrackerError>;

    /// Create a new issue and return its key.
    async fn create_issue(&self, draft: &IssueDraft) -> Result<String, TrackerError>;

    async fn search_by_label(&self, label: &str) -> Result<Option<String>, TrackerError>;

    /// Relate two issues. A link that already exists is not an error.
    async fn link_issues(
        &self,
        inward: &str,
        outward: &str,
        link_type: &str,
    ) -> Result<LinkOutcome, TrackerError>;

    /// Whether `upsert_issue` may search by label.
    fn label_search_enabled(&self) -> bool {
        true
    }

    /// Remembered key first, then label search, then create.
    ///
    /// A failed update by key falls through to the search. A failed search
    /// counts as "not found". Only the final update or create can fail.
    async fn upsert_issue(
        &self,
        draft: &IssueDraft,
        existing_key: Option<&str>,
    ) -> Result<Upserted, TrackerError> {
        if let Some(key) = existing_key.filter(|k| !k.is_empty()) {
            match self.update_issue(key, draft).await {
                Ok(()) => {
                    return Ok(Upserted {
                        key: key.to_string(),
                        created: false,
                    });
                }
                Err(e) => {
                    warn!(label = %draft.label, key, error = %e, "stored key not updatable, searching by label");
                }
            }
        }

        if self.label_search_enabled() {
            let found = match self.search_by_label(&draft.label).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(label = %draft.label, error = %e, "label search unavailable");
                    None
                }
            };
            if let Some(key) = found {
                debug!(label = %draft.label, key = %key, "found issue by label");
                self.update_issue(&key, draft).await?;
                return Ok(Upserted { key, created: false });
            }
        }

        let key = self.create_issue(draft).await?;
        Ok(Upserted { key, created: true })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTracker;
    use super::*;

    fn draft(label: &str) -> IssueDraft {
        IssueDraft {
            label: label.into(),
            summary: "s".into(),
            description: Value::Null,
            issue_type: "Story".into(),
        }
    }

    #[test]
    fn test_labels_are_deterministic() {
        assert_eq!(requirement_label("REQ-001"), "req-req-001");
        assert_eq!(test_case_label("REQ-001", "positive"), "tc-req-001-positive");
        assert_eq!(test_case_label("REQ-001", "Edge Case!"), "tc-req-001-edge-case");
        assert_eq!(draft("x").labels(), ["x", SYNC_LABEL]);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_finds_by_label() {
        let tracker = MemoryTracker::new();
        let first = tracker.upsert_issue(&draft("req-req-001"), None).await.unwrap();
        assert!(first.created);
        let second = tracker.upsert_issue(&draft("req-req-001"), None).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.key, second.key);
        assert_eq!(tracker.creates(), 1);
    }

    #[tokio::test]
    async fn test_stale_key_falls_through_to_search() {
        let tracker = MemoryTracker::new();
        let created = tracker.upsert_issue(&draft("l"), None).await.unwrap();
        let out = tracker.upsert_issue(&draft("l"), Some("GONE-1")).await.unwrap();
        assert_eq!(out.key, created.key);
        assert!(!out.created);
    }

    #[tokio::test]
    async fn test_known_key_skips_search() {
        let tracker = MemoryTracker::new();
        let created = tracker.upsert_issue(&draft("l"), None).await.unwrap();
        let searches = tracker.state.lock().unwrap().searches;
        tracker
            .upsert_issue(&draft("l"), Some(&created.key))
            .await
            .unwrap();
        assert_eq!(tracker.state.lock().unwrap().searches, searches);
    }

    #[tokio::test]
    async fn test_broken_search_counts_as_not_found() {
        let tracker = MemoryTracker {
            search_broken: true,
            ..Default::default()
        };
        let out = tracker.upsert_issue(&draft("l"), None).await.unwrap();
        assert!(out.created);
    }

    #[tokio::test]
    async fn test_skip_search_creates_without_searching() {
        let tracker = MemoryTracker {
            skip_search: true,
            ..Default::default()
        };
        tracker.upsert_issue(&draft("l"), None).await.unwrap();
        assert_eq!(tracker.state.lock().unwrap().searches, 0);
    }
}
