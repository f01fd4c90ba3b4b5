//! Relational persistence for requirements and test cases, plus the JSON
//! artifact written at the end of a run.
//!
//! Test cases are append-only; the latest row per (requirement, scenario
//! type) is authoritative. A new row is only appended when its content hash
//! differs from that latest row, so re-running on unchanged input adds
//! nothing.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::{AcceptanceCriteria, Requirement, TestCase};

/// A test case row as read back for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTestCase {
    pub row_id: i64,
    pub requirement_id: String,
    /// Raw stored value; rows with an empty scenario are skipped downstream.
    pub scenario_type: String,
    pub body: String,
    pub tags: Vec<String>,
    pub external_key: Option<String>,
}

/// What one persist call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistSummary {
    pub requirements_upserted: usize,
    pub test_cases_inserted: usize,
    pub test_cases_unchanged: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilteringReport {
    pub total_lines: usize,
    pub kept: usize,
    pub dropped: usize,
    pub use_llm_classifier: bool,
}

/// Shape of `output.json`.
#[derive(Debug, Clone, Serialize)]
pub struct OutputDocument<'a> {
    pub filtering: FilteringReport,
    pub requirements: &'a [Requirement],
    pub test_cases: &'a [TestCase],
}

pub fn write_output_json(path: &Path, doc: &OutputDocument<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(doc).context("Failed to serialize output document")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file: {}", path.display()))?;
    Ok(())
}

/// Stable fingerprint of a test case's content.
pub fn content_hash(tc: &TestCase) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tc.requirement_id.as_bytes());
    hasher.update([0]);
    hasher.update(tc.scenario_type.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(tc.body.as_bytes());
    hasher.update([0]);
    hasher.update(tc.tags.join(",").as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ArtifactStore {
    conn: Mutex<Connection>,
}

impl ArtifactStore {
    /// Open (or create) the artifact database at `path` and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open artifact database: {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory artifact database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        run_migrations(&conn).context("Failed to run migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Artifact store lock poisoned: {}", e))
    }

    // ── Requirements ──────────────────────────────────────────────────

    /// Insert or update requirements by id. Approval and external key are
    /// never touched by an upsert.
    pub fn upsert_requirements(&self, reqs: &[Requirement]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        for req in reqs {
            tx.execute(
                "INSERT INTO requirements (id, title, description, criteria, priority, epic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    criteria = excluded.criteria,
                    priority = excluded.priority,
                    epic = excluded.epic,
                    updated_at = datetime('now')",
                params![
                    req.id,
                    req.title,
                    req.description,
                    req.acceptance_criteria.to_text(),
                    req.priority.as_str(),
                    req.epic,
                ],
            )
            .with_context(|| format!("Failed to upsert requirement {}", req.id))?;
        }
        tx.commit().context("Failed to commit requirements")?;
        Ok(reqs.len())
    }

    pub fn list_requirements(&self, approved_only: bool) -> Result<Vec<Requirement>> {
        let conn = self.conn()?;
        let sql = if approved_only {
            "SELECT id, title, description, criteria, priority, epic, approved, external_key
             FROM requirements WHERE approved = 1 ORDER BY id"
        } else {
            "SELECT id, title, description, criteria, priority, epic, approved, external_key
             FROM requirements ORDER BY id"
        };
        let mut stmt = conn.prepare(sql).context("Failed to prepare list_requirements")?;
        let rows = stmt
            .query_map([], |row| {
                let criteria: String = row.get(3)?;
                let priority: String = row.get(4)?;
                Ok(Requirement {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    acceptance_criteria: AcceptanceCriteria::from_text(&criteria),
                    priority: priority.parse().unwrap_or_default(),
                    epic: row.get(5)?,
                    approved: row.get::<_, i64>(6)? != 0,
                    external_key: row.get(7)?,
                })
            })
            .context("Failed to query requirements")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read requirement row")
    }

    pub fn requirement_external_key(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let key: Option<Option<String>> = conn
            .query_row(
                "SELECT external_key FROM requirements WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read requirement external key")?;
        Ok(key.flatten())
    }

    pub fn set_requirement_external_key(&self, id: &str, key: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE requirements SET external_key = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, key],
            )
            .with_context(|| format!("Failed to store external key for {}", id))?;
        Ok(())
    }

    /// Set the approval flag on the given ids. Returns how many rows changed.
    pub fn set_approved(&self, ids: &[String], approved: bool) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let mut changed = 0;
        for id in ids {
            changed += tx
                .execute(
                    "UPDATE requirements SET approved = ?2, updated_at = datetime('now') WHERE id = ?1",
                    params![id, approved as i64],
                )
                .with_context(|| format!("Failed to update approval for {}", id))?;
        }
        tx.commit().context("Failed to commit approvals")?;
        Ok(changed)
    }

    // ── Test cases ────────────────────────────────────────────────────

    /// Append test cases whose content differs from the latest stored row
    /// for the same (requirement, scenario type). A new row inherits the
    /// previous row's external key. Returns `(inserted, unchanged)`.
    pub fn append_test_cases(&self, cases: &[TestCase]) -> Result<(usize, usize)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        let (mut inserted, mut unchanged) = (0, 0);

        for tc in cases {
            let hash = content_hash(tc);
            let latest: Option<(Option<String>, Option<String>)> = tx
                .query_row(
                    "SELECT content_hash, external_key FROM test_cases
                     WHERE requirement_id = ?1 AND scenario_type = ?2
                     ORDER BY id DESC LIMIT 1",
                    params![tc.requirement_id, tc.scenario_type.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("Failed to read latest test case")?;

            let (latest_hash, latest_key) = latest.unwrap_or((None, None));
            if latest_hash.as_deref() == Some(hash.as_str()) {
                unchanged += 1;
                continue;
            }

            let tags = serde_json::to_string(&tc.tags).context("Failed to serialize tags")?;
            tx.execute(
                "INSERT INTO test_cases (requirement_id, scenario_type, body, tags, content_hash, external_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tc.requirement_id,
                    tc.scenario_type.as_str(),
                    tc.body,
                    tags,
                    hash,
                    tc.external_key.clone().or(latest_key),
                ],
            )
            .with_context(|| {
                format!(
                    "Failed to insert test case {}/{}",
                    tc.requirement_id, tc.scenario_type
                )
            })?;
            inserted += 1;
        }

        tx.commit().context("Failed to commit test cases")?;
        Ok((inserted, unchanged))
    }

    /// Latest row per (requirement, scenario type), optionally restricted to
    /// test cases whose requirement is currently approved.
    pub fn latest_test_cases(&self, approved_only: bool) -> Result<Vec<StoredTestCase>> {
        let conn = self.conn()?;
        let approval_join = if approved_only {
            "JOIN requirements r ON r.id = t.requirement_id AND r.approved = 1"
        } else {
            ""
        };
        let sql = format!(
            "SELECT t.id, t.requirement_id, t.scenario_type, t.body, t.tags, t.external_key
             FROM test_cases t
             JOIN (
                SELECT MAX(id) AS max_id FROM test_cases
                GROUP BY requirement_id, scenario_type
             ) latest ON latest.max_id = t.id
             {}
             ORDER BY t.requirement_id, t.scenario_type",
            approval_join
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare latest_test_cases")?;
        let rows = stmt
            .query_map([], |row| {
                let tags: String = row.get(4)?;
                Ok(StoredTestCase {
                    row_id: row.get(0)?,
                    requirement_id: row.get(1)?,
                    scenario_type: row.get(2)?,
                    body: row.get(3)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                    external_key: row.get(5)?,
                })
            })
            .context("Failed to query test cases")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read test case row")
    }

    pub fn set_test_case_external_key(&self, row_id: i64, key: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE test_cases SET external_key = ?2 WHERE id = ?1",
                params![row_id, key],
            )
            .with_context(|| format!("Failed to store external key for test case {}", row_id))?;
        Ok(())
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS requirements (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            criteria TEXT NOT NULL DEFAULT '',
            priority TEXT NOT NULL DEFAULT '',
            epic TEXT NOT NULL DEFAULT '',
            approved INTEGER NOT NULL DEFAULT 0,
            external_key TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS test_cases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            requirement_id TEXT NOT NULL DEFAULT '',
            scenario_type TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            external_key TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_test_cases_identity
            ON test_cases(requirement_id, scenario_type, id);
        ",
    )
    .context("Failed to create tables")?;

    // Additive migration for databases created before content hashing.
    match conn.execute("ALTER TABLE test_cases ADD COLUMN content_hash TEXT", []) {
        Ok(_) => {}
        Err(e) if e.to_string().contains("duplicate column") => {}
        Err(e) => return Err(anyhow::anyhow!("Failed to add content_hash column: {}", e)),
    }
    Ok(())
}
