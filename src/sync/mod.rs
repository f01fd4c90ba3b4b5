//! Idempotent reconciliation of stored entities with a remote issue tracker.
//!
//! Every entity maps to exactly one remote issue through its deterministic
//! label, so re-running a sync updates instead of duplicating. Entities are
//! reconciled one at a time: requirements first, then test cases, then the
//! links from each test case to its parent. A failure on one entity is
//! logged and counted and never stops the batch.
//!
//! The key → label → create decision for one label must have a single
//! writer. Running entities concurrently would need per-label serialization.

pub mod adf;
mod jira;
pub mod tracker;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::TrackerSection;
use crate::store::{ArtifactStore, StoredTestCase};

pub use jira::JiraTracker;
pub use tracker::{
    IssueDraft, IssueTracker, LinkOutcome, SYNC_LABEL, Upserted, requirement_label,
    test_case_label,
};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Only entities whose requirement is approved at query time.
    pub approved_only: bool,
    pub link_type: String,
    pub requirement_issue_type: String,
    pub test_issue_type: String,
}

impl ReconcileOptions {
    pub fn from_config(config: &TrackerSection) -> Self {
        Self {
            approved_only: config.approved_only,
            link_type: config.link_type.clone(),
            requirement_issue_type: config.requirement_issue_type.clone(),
            test_issue_type: config.test_issue_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl KindCounts {
    fn record(&mut self, upserted: &Upserted) {
        if upserted.created {
            self.created += 1;
        } else {
            self.updated += 1;
        }
    }
}

/// Partial-success outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub requirements: KindCounts,
    pub test_cases: KindCounts,
    pub linked: usize,
    pub link_failed: usize,
}

impl SyncReport {
    pub fn failures(&self) -> usize {
        self.requirements.failed + self.test_cases.failed + self.link_failed
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = [("Requirements", &self.requirements), ("Test cases", &self.test_cases)];
        for (name, c) in kinds {
            writeln!(
                f,
                "{:<13} created {}, updated {}, skipped {}, failed {}",
                format!("{}:", name),
                c.created,
                c.updated,
                c.skipped,
                c.failed
            )?;
        }
        write!(
            f,
            "{:<13} linked {}, failed {}",
            "Links:", self.linked, self.link_failed
        )
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct Reconciler {
    tracker: Arc<dyn IssueTracker>,
    store: Arc<ArtifactStore>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        store: Arc<ArtifactStore>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            tracker,
            store,
            options,
        }
    }

    /// Reconcile everything eligible. Only local store failures are errors;
    /// remote failures are counted in the report.
    pub async fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let requirements = self.store.list_requirements(self.options.approved_only)?;
        let test_cases = self.store.latest_test_cases(self.options.approved_only)?;
        info!(
            requirements = requirements.len(),
            test_cases = test_cases.len(),
            approved_only = self.options.approved_only,
            "reconciling with tracker"
        );

        // requirement id → remote key resolved during this run
        let mut parent_keys: HashMap<String, String> = HashMap::new();

        for req in &requirements {
            if req.id.trim().is_empty() {
                report.requirements.skipped += 1;
                continue;
            }
            let draft = IssueDraft {
                label: requirement_label(&req.id),
                summary: format!(
                    "[{}] {}",
                    req.id,
                    if req.title.is_empty() { "Untitled requirement" } else { &req.title }
                ),
                description: adf::requirement_description(req),
                issue_type: self.options.requirement_issue_type.clone(),
            };
            match self
                .tracker
                .upsert_issue(&draft, req.external_key.as_deref())
                .await
            {
                Ok(upserted) => {
                    info!(label = %draft.label, key = %upserted.key, created = upserted.created, "requirement synced");
                    if req.external_key.as_deref() != Some(upserted.key.as_str()) {
                        self.store
                            .set_requirement_external_key(&req.id, &upserted.key)?;
                    }
                    report.requirements.record(&upserted);
                    parent_keys.insert(req.id.clone(), upserted.key);
                }
                Err(e) => {
                    warn!(label = %draft.label, error = %e, "requirement sync failed");
                    report.requirements.failed += 1;
                }
            }
        }

        for tc in &test_cases {
            if tc.requirement_id.trim().is_empty() || tc.scenario_type.trim().is_empty() {
                report.test_cases.skipped += 1;
                continue;
            }
            let draft = self.test_case_draft(tc);
            let key = match self
                .tracker
                .upsert_issue(&draft, tc.external_key.as_deref())
                .await
            {
                Ok(upserted) => {
                    info!(label = %draft.label, key = %upserted.key, created = upserted.created, "test case synced");
                    if tc.external_key.as_deref() != Some(upserted.key.as_str()) {
                        self.store.set_test_case_external_key(tc.row_id, &upserted.key)?;
                    }
                    report.test_cases.record(&upserted);
                    upserted.key
                }
                Err(e) => {
                    warn!(label = %draft.label, error = %e, "test case sync failed");
                    report.test_cases.failed += 1;
                    continue;
                }
            };

            let parent = match parent_keys.get(&tc.requirement_id) {
                Some(k) => Some(k.clone()),
                None => self.store.requirement_external_key(&tc.requirement_id)?,
            };
            let Some(parent) = parent else {
                warn!(requirement_id = %tc.requirement_id, "parent requirement has no remote issue, not linking");
                continue;
            };
            match self
                .tracker
                .link_issues(&key, &parent, &self.options.link_type)
                .await
            {
                Ok(_) => report.linked += 1,
                Err(e) => {
                    warn!(key = %key, parent = %parent, error = %e, "link failed");
                    report.link_failed += 1;
                }
            }
        }

        Ok(report)
    }

    fn test_case_draft(&self, tc: &StoredTestCase) -> IssueDraft {
        IssueDraft {
            label: test_case_label(&tc.requirement_id, &tc.scenario_type),
            summary: format!(
                "[TC::{}::{}] {} for {}",
                tc.requirement_id,
                tc.scenario_type,
                capitalize(&tc.scenario_type),
                tc.requirement_id
            ),
            description: adf::test_case_description(tc),
            issue_type: self.options.test_issue_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::tracker::testing::MemoryTracker;
    use super::*;
    use crate::model::{AcceptanceCriteria, Priority, Requirement, ScenarioType, TestCase};

    fn options(approved_only: bool) -> ReconcileOptions {
        ReconcileOptions {
            approved_only,
            ..ReconcileOptions::from_config(&TrackerSection::default())
        }
    }

    fn seeded_store() -> Arc<ArtifactStore> {
        let store = ArtifactStore::new_in_memory().unwrap();
        let reqs: Vec<Requirement> = ["REQ-001", "REQ-002"]
            .iter()
            .map(|id| Requirement {
                id: id.to_string(),
                title: format!("Title {}", id),
                description: "d".into(),
                acceptance_criteria: AcceptanceCriteria::from_items(["a", "b", "c"]),
                priority: Priority::Medium,
                epic: String::new(),
                approved: false,
                external_key: None,
            })
            .collect();
        store.upsert_requirements(&reqs).unwrap();
        let cases: Vec<TestCase> = ScenarioType::ALL
            .iter()
            .map(|&s| TestCase {
                requirement_id: "REQ-001".into(),
                scenario_type: s,
                body: format!("Scenario: {} Given a When b Then c", s),
                tags: vec![s.tag()],
                external_key: None,
            })
            .collect();
        store.append_test_cases(&cases).unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let store = seeded_store();
        let tracker = Arc::new(MemoryTracker::new());
        let reconciler = Reconciler::new(tracker.clone(), store.clone(), options(false));

        let first = reconciler.run().await.unwrap();
        assert_eq!(first.requirements.created, 2);
        assert_eq!(first.test_cases.created, 3);
        assert_eq!(first.linked, 3);
        assert_eq!(tracker.creates(), 5);

        let second = reconciler.run().await.unwrap();
        assert_eq!(second.requirements.created, 0);
        assert_eq!(second.requirements.updated, 2);
        assert_eq!(second.test_cases.updated, 3);
        assert_eq!(tracker.creates(), 5);
        assert_eq!(tracker.state.lock().unwrap().links.len(), 3);
    }

    #[tokio::test]
    async fn test_keys_are_persisted_and_stable() {
        let store = seeded_store();
        let tracker = Arc::new(MemoryTracker::new());
        let reconciler = Reconciler::new(tracker.clone(), store.clone(), options(false));
        reconciler.run().await.unwrap();

        let key = store.requirement_external_key("REQ-001").unwrap().unwrap();
        reconciler.run().await.unwrap();
        assert_eq!(store.requirement_external_key("REQ-001").unwrap(), Some(key));
        assert!(store
            .latest_test_cases(false)
            .unwrap()
            .iter()
            .all(|tc| tc.external_key.is_some()));
    }

    #[tokio::test]
    async fn test_lost_keys_recover_via_label_search() {
        let store = seeded_store();
        let tracker = Arc::new(MemoryTracker::new());
        Reconciler::new(tracker.clone(), store.clone(), options(false))
            .run()
            .await
            .unwrap();

        // Fresh local database with the same content: keys are gone.
        let fresh = seeded_store();
        let report = Reconciler::new(tracker.clone(), fresh.clone(), options(false))
            .run()
            .await
            .unwrap();
        assert_eq!(report.requirements.created + report.test_cases.created, 0);
        assert_eq!(tracker.creates(), 5);
        assert!(fresh.requirement_external_key("REQ-002").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let store = seeded_store();
        let tracker = Arc::new(MemoryTracker::new());
        tracker.fail_on("req-req-001");
        let report = Reconciler::new(tracker.clone(), store.clone(), options(false))
            .run()
            .await
            .unwrap();

        assert_eq!(report.requirements.failed, 1);
        assert_eq!(report.requirements.created, 1);
        assert_eq!(report.test_cases.created, 3);
        // parent has no key, so nothing was linked
        assert_eq!(report.linked, 0);
        assert_eq!(report.failures(), 1);
    }

    #[tokio::test]
    async fn test_approved_only_is_evaluated_at_query_time() {
        let store = seeded_store();
        let tracker = Arc::new(MemoryTracker::new());
        let reconciler = Reconciler::new(tracker.clone(), store.clone(), options(true));

        let none = reconciler.run().await.unwrap();
        assert_eq!(none, SyncReport::default());

        store.set_approved(&["REQ-001".to_string()], true).unwrap();
        let some = reconciler.run().await.unwrap();
        assert_eq!(some.requirements.created, 1);
        assert_eq!(some.test_cases.created, 3);
    }

    #[tokio::test]
    async fn test_parent_key_from_store_when_not_synced_this_run() {
        let store = seeded_store();
        store.set_requirement_external_key("REQ-001", "EXT-1").unwrap();
        let tracker = Arc::new(MemoryTracker::new());
        // REQ-001 fails to sync, so links fall back to its stored key.
        tracker.fail_on("req-req-001");
        let reconciler = Reconciler::new(tracker.clone(), store.clone(), options(false));
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.linked, 3);
        assert!(tracker
            .state
            .lock()
            .unwrap()
            .links
            .iter()
            .all(|(_, parent)| parent == "EXT-1"));
    }

    #[test]
    fn test_report_display() {
        let report = SyncReport {
            requirements: KindCounts {
                created: 1,
                updated: 2,
                skipped: 0,
                failed: 1,
            },
            ..Default::default()
        };
        let text = report.to_string();
        assert!(text.contains("Requirements: created 1, updated 2, skipped 0, failed 1"));
        assert!(text.contains("Links:"));
    }

    #[test]
    fn test_test_case_summary_format() {
        let reconciler = Reconciler::new(
            Arc::new(MemoryTracker::new()),
            Arc::new(ArtifactStore::new_in_memory().unwrap()),
            options(false),
        );
        let draft = reconciler.test_case_draft(&StoredTestCase {
            row_id: 1,
            requirement_id: "REQ-001".into(),
            scenario_type: "positive".into(),
            body: String::new(),
            tags: vec![],
            external_key: None,
        });
        assert_eq!(draft.summary, "[TC::REQ-001::positive] Positive for REQ-001");
        assert_eq!(draft.label, "tc-req-001-positive");
        assert_eq!(draft.issue_type, "Task");
    }
}
