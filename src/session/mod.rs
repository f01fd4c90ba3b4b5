//! Per-session memory: a bounded action log, a rolling summary, scratch
//! key/values for resume flows, and instruction hydration.
//!
//! Every operation is best-effort. Store failures are logged at `warn` and
//! swallowed, and a memory without a store (or a call without a session id)
//! degrades to a stateless no-op. Callers never see a session error.

pub mod hydrate;
pub mod ring;
pub mod store;
pub mod summary;

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::model::Action;

pub use hydrate::{HydrationTiers, compose, continuation_prompt};
pub use ring::ActionRing;
pub use store::{MemoryTier, SessionRecord, SessionStore};
pub use summary::RollingSummary;

/// Scratch key remembering the last source document a session ingested.
pub const LAST_SOURCE_KEY: &str = "last_source_path";

/// Read-only view of a session for inspection.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub scope_id: String,
    pub summary: String,
    /// Newest first.
    pub actions: Vec<Action>,
    pub created_at: String,
    pub updated_at: String,
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session: {}", self.session_id)?;
        if !self.scope_id.is_empty() {
            writeln!(f, "Scope:   {}", self.scope_id)?;
        }
        writeln!(f, "Created: {}", self.created_at)?;
        writeln!(f, "Updated: {}", self.updated_at)?;
        writeln!(f)?;
        writeln!(f, "Summary:")?;
        if self.summary.trim().is_empty() {
            writeln!(f, "  (empty)")?;
        } else {
            for line in self.summary.lines() {
                writeln!(f, "  {}", line)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Recent actions:")?;
        for action in &self.actions {
            writeln!(
                f,
                "• {} {}",
                action.at.format("%Y-%m-%d %H:%M:%S"),
                action.describe()
            )?;
        }
        Ok(())
    }
}

pub struct SessionMemory {
    store: Option<Mutex<SessionStore>>,
    limits: MemoryConfig,
}

impl SessionMemory {
    /// Open the session store at `path`. If it cannot be opened the memory
    /// runs stateless for the rest of the process.
    pub fn open(path: &Path, limits: MemoryConfig) -> Self {
        match SessionStore::new(path) {
            Ok(store) => Self::with_store(store, limits),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "session store unavailable, continuing stateless");
                Self::stateless(limits)
            }
        }
    }

    pub fn with_store(store: SessionStore, limits: MemoryConfig) -> Self {
        Self {
            store: Some(Mutex::new(store)),
            limits,
        }
    }

    pub fn stateless(limits: MemoryConfig) -> Self {
        Self {
            store: None,
            limits,
        }
    }

    pub fn is_stateless(&self) -> bool {
        self.store.is_none()
    }

    pub fn limits(&self) -> &MemoryConfig {
        &self.limits
    }

    /// Run `f` against the store, logging and discarding any failure.
    fn with_store_op<R>(&self, op: &str, f: impl FnOnce(&SessionStore) -> anyhow::Result<R>) -> Option<R> {
        let store = self.store.as_ref()?;
        let guard = match store.lock() {
            Ok(guard) => guard,
            Err(error) => {
                warn!(op, error = %error, "session store lock poisoned");
                return None;
            }
        };
        match f(&guard) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(op, error = %error, "session memory operation failed");
                None
            }
        }
    }

    /// Return `session_id` if given, otherwise mint a new one. Either way a
    /// backing record is created if the store is reachable.
    pub fn ensure(&self, session_id: Option<&str>, scope_id: &str) -> String {
        let id = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(true) = self.with_store_op("ensure", |s| s.ensure_session(&id, scope_id)) {
            debug!(session_id = %id, scope_id, "created session");
        }
        id
    }

    /// Append `action` to the session's ring and fold a short bullet into
    /// its rolling summary.
    pub fn record_action(&self, session_id: Option<&str>, action: Action) {
        let Some(sid) = session_id else { return };
        let limits = &self.limits;
        self.with_store_op("record_action", |store| {
            let record = match store.load_session(sid)? {
                Some(record) => record,
                None => {
                    store.ensure_session(sid, "")?;
                    store
                        .load_session(sid)?
                        .ok_or_else(|| anyhow::anyhow!("session {} vanished after insert", sid))?
                }
            };

            let mut ring = ActionRing::from_json(&record.actions_json, limits.action_log_limit)
                .unwrap_or_else(|error| {
                    warn!(session_id = sid, error = %error, "discarding unreadable action log");
                    ActionRing::new(limits.action_log_limit)
                });
            let mut summary = RollingSummary::from_text(
                &record.rolling_summary,
                limits.summary_char_limit,
                limits.bullet_char_limit,
            );

            summary.fold(&action.describe());
            ring.push(action);

            store.save_session(sid, summary.as_str(), &ring.to_json()?)
        });
    }

    /// Fold a free-form bullet into the rolling summary without logging an action.
    pub fn note(&self, session_id: Option<&str>, bullet: &str) {
        let Some(sid) = session_id else { return };
        let limits = &self.limits;
        self.with_store_op("note", |store| {
            store.ensure_session(sid, "")?;
            let record = store
                .load_session(sid)?
                .ok_or_else(|| anyhow::anyhow!("session {} vanished after insert", sid))?;
            let mut summary = RollingSummary::from_text(
                &record.rolling_summary,
                limits.summary_char_limit,
                limits.bullet_char_limit,
            );
            summary.fold(bullet);
            store.save_session(sid, summary.as_str(), &record.actions_json)
        });
    }

    /// Newest-first, budget-capped summary. Empty when unavailable.
    pub fn compact_summary(&self, session_id: Option<&str>) -> String {
        let Some(sid) = session_id else {
            return String::new();
        };
        self.with_store_op("compact_summary", |s| s.load_session(sid))
            .flatten()
            .map(|r| r.rolling_summary)
            .unwrap_or_default()
    }

    pub fn get_kv(&self, session_id: Option<&str>, key: &str) -> Option<String> {
        let sid = session_id?;
        self.with_store_op("get_kv", |s| s.get_state(sid, key)).flatten()
    }

    pub fn set_kv(&self, session_id: Option<&str>, key: &str, value: &str) {
        let Some(sid) = session_id else { return };
        self.with_store_op("set_kv", |s| s.set_state(sid, key, value));
    }

    /// Compose the instruction preamble for `base`. Missing tiers contribute
    /// nothing, so a stateless memory still yields the default tone.
    pub fn hydrate(
        &self,
        base: &str,
        session_id: Option<&str>,
        scope_id: &str,
        extra_context: Option<&str>,
    ) -> String {
        let tiers = self
            .with_store_op("hydrate", |s| {
                Ok(HydrationTiers {
                    global: s.memory(&MemoryTier::Global)?,
                    scope: s.memory(&MemoryTier::Scope(scope_id.to_string()))?,
                    session: match session_id {
                        Some(sid) => s.memory(&MemoryTier::Session(sid.to_string()))?,
                        None => Default::default(),
                    },
                })
            })
            .unwrap_or_default();
        compose(base, &tiers, extra_context)
    }

    /// `base` wrapped with the session's compact summary, if any.
    pub fn continue_prompt(&self, base: &str, session_id: Option<&str>) -> String {
        continuation_prompt(base, &self.compact_summary(session_id))
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let record = self.with_store_op("snapshot", |s| s.load_session(session_id))??;
        let ring = ActionRing::from_json(&record.actions_json, self.limits.action_log_limit)
            .unwrap_or_default();
        Some(SessionSnapshot {
            session_id: record.session_id,
            scope_id: record.scope_id,
            summary: record.rolling_summary,
            actions: ring.newest_first().cloned().collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
