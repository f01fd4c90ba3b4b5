use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

/// Which hydration tier a memory entry belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryTier {
    Global,
    Scope(String),
    Session(String),
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Scope(_) => "scope",
            Self::Session(_) => "session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub scope_id: String,
    pub rolling_summary: String,
    pub actions_json: String,
    pub created_at: String,
    pub updated_at: String,
}

/// SQLite persistence for sessions, their scratch values, and the three
/// memory tiers used by instruction hydration.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the session tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open session database")?;
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    /// In-memory store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory session database")?;
        let store = Self { conn };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS sessions (
                    session_id TEXT PRIMARY KEY,
                    scope_id TEXT NOT NULL DEFAULT '',
                    rolling_summary TEXT NOT NULL DEFAULT '',
                    last_actions_json TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS session_state (
                    session_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (session_id, key)
                );

                CREATE TABLE IF NOT EXISTS memory_global (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS memory_scope (
                    scope_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (scope_id, key)
                );

                CREATE TABLE IF NOT EXISTS memory_session (
                    session_id TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (session_id, key)
                );
                ",
            )
            .context("Failed to create session tables")?;
        Ok(())
    }

    /// Insert the session row if missing. Returns true if it was created.
    pub fn ensure_session(&self, session_id: &str, scope_id: &str) -> Result<bool> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO sessions (session_id, scope_id) VALUES (?1, ?2)",
                params![session_id, scope_id],
            )
            .context("Failed to ensure session")?;
        Ok(inserted > 0)
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.conn
            .query_row(
                "SELECT session_id, scope_id, rolling_summary, last_actions_json, created_at, updated_at
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(SessionRecord {
                        session_id: row.get(0)?,
                        scope_id: row.get(1)?,
                        rolling_summary: row.get(2)?,
                        actions_json: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to load session")
    }

    pub fn save_session(&self, session_id: &str, summary: &str, actions_json: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sessions
                 SET rolling_summary = ?2, last_actions_json = ?3, updated_at = datetime('now')
                 WHERE session_id = ?1",
                params![session_id, summary, actions_json],
            )
            .context("Failed to save session")?;
        Ok(())
    }

    pub fn get_state(&self, session_id: &str, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM session_state WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read session state")
    }

    pub fn set_state(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO session_state (session_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value",
                params![session_id, key, value],
            )
            .context("Failed to write session state")?;
        Ok(())
    }

    pub fn set_memory(&self, tier: &MemoryTier, key: &str, value: &str) -> Result<()> {
        let result = match tier {
            MemoryTier::Global => self.conn.execute(
                "INSERT INTO memory_global (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            ),
            MemoryTier::Scope(scope_id) => self.conn.execute(
                "INSERT INTO memory_scope (scope_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value",
                params![scope_id, key, value],
            ),
            MemoryTier::Session(session_id) => self.conn.execute(
                "INSERT INTO memory_session (session_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id, key) DO UPDATE SET value = excluded.value",
                params![session_id, key, value],
            ),
        };
        result.with_context(|| format!("Failed to write {} memory", tier.as_str()))?;
        Ok(())
    }

    /// All entries of one tier, ordered by key.
    pub fn memory(&self, tier: &MemoryTier) -> Result<BTreeMap<String, String>> {
        let (sql, owner) = match tier {
            MemoryTier::Global => ("SELECT key, value FROM memory_global", None),
            MemoryTier::Scope(scope_id) => (
                "SELECT key, value FROM memory_scope WHERE scope_id = ?1",
                Some(scope_id.as_str()),
            ),
            MemoryTier::Session(session_id) => (
                "SELECT key, value FROM memory_session WHERE session_id = ?1",
                Some(session_id.as_str()),
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match owner {
            Some(owner) => stmt.query_map(params![owner], map_row)?,
            None => stmt.query_map([], map_row)?,
        };
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .with_context(|| format!("Failed to read {} memory", tier.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_session_is_idempotent() -> Result<()> {
        let store = SessionStore::new_in_memory()?;
        assert!(store.ensure_session("s1", "proj")?);
        assert!(!store.ensure_session("s1", "proj")?);

        let record = store.load_session("s1")?.expect("session row");
        assert_eq!(record.scope_id, "proj");
        assert_eq!(record.rolling_summary, "");
        assert_eq!(record.actions_json, "[]");
        Ok(())
    }

    #[test]
    fn test_load_missing_session() -> Result<()> {
        let store = SessionStore::new_in_memory()?;
        assert!(store.load_session("nope")?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_session() -> Result<()> {
        let store = SessionStore::new_in_memory()?;
        store.ensure_session("s1", "")?;
        store.save_session("s1", "• hello\n", "[]")?;
        let record = store.load_session("s1")?.expect("session row");
        assert_eq!(record.rolling_summary, "• hello\n");
        Ok(())
    }

    #[test]
    fn test_state_upsert() -> Result<()> {
        let store = SessionStore::new_in_memory()?;
        assert_eq!(store.get_state("s1", "k")?, None);
        store.set_state("s1", "k", "v1")?;
        store.set_state("s1", "k", "v2")?;
        assert_eq!(store.get_state("s1", "k")?.as_deref(), Some("v2"));
        Ok(())
    }

    #[test]
    fn test_memory_tiers_are_separate() -> Result<()> {
        let store = SessionStore::new_in_memory()?;
        store.set_memory(&MemoryTier::Global, "tone", "plain English")?;
        store.set_memory(&MemoryTier::Scope("p1".into()), "tone", "formal")?;
        store.set_memory(&MemoryTier::Session("s1".into()), "focus", "payments")?;

        assert_eq!(
            store.memory(&MemoryTier::Global)?.get("tone").map(String::as_str),
            Some("plain English")
        );
        assert_eq!(
            store.memory(&MemoryTier::Scope("p1".into()))?.get("tone").map(String::as_str),
            Some("formal")
        );
        assert!(store.memory(&MemoryTier::Scope("p2".into()))?.is_empty());
        assert_eq!(store.memory(&MemoryTier::Session("s1".into()))?.len(), 1);
        Ok(())
    }
}
