//! Bounded action log with an append-and-evict contract.

use std::collections::VecDeque;

use anyhow::{Context, Result};

use crate::model::Action;

/// Default number of actions retained per session.
pub const DEFAULT_ACTION_LOG_LIMIT: usize = 20;

/// Fixed-capacity ring of [`Action`]s. Appending beyond capacity evicts the
/// oldest entry, so `len() <= capacity()` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRing {
    entries: VecDeque<Action>,
    capacity: usize,
}

impl ActionRing {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a ring from its stored JSON array, keeping only the newest
    /// `capacity` entries. Blank input yields an empty ring.
    pub fn from_json(json: &str, capacity: usize) -> Result<Self> {
        let mut ring = Self::new(capacity);
        if json.trim().is_empty() {
            return Ok(ring);
        }
        let actions: Vec<Action> =
            serde_json::from_str(json).context("Failed to parse stored action log")?;
        for action in actions {
            ring.push(action);
        }
        Ok(ring)
    }

    /// Oldest first, matching append order.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.entries).context("Failed to serialize action log")
    }

    /// Append an action, returning the evicted entry if the ring was full.
    pub fn push(&mut self, action: Action) -> Option<Action> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(action);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &Action> {
        self.entries.iter().rev()
    }
}

impl Default for ActionRing {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_LOG_LIMIT)
    }
}
