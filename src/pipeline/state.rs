//! Typed state threaded through the pipeline.
//!
//! Each stage returns a [`StageOutput`] naming only the fields it produced;
//! [`PipelineState::merge`] overwrites whatever a stage sets and leaves the
//! rest untouched.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::model::{Requirement, TestCase};
use crate::store::PersistSummary;

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Session to carry memory across runs. `None` runs stateless.
    pub session_id: Option<String>,
    pub scope_id: String,

    pub source_path: Option<PathBuf>,
    pub all_lines: Vec<String>,
    pub filtered_lines: Vec<String>,
    pub dropped_lines: Vec<String>,

    pub requirements: Vec<Requirement>,
    pub duplicates_removed: usize,

    pub test_cases: Vec<TestCase>,
    pub rejected_test_cases: usize,

    pub output_json: Option<PathBuf>,
    pub persisted: Option<PersistSummary>,

    /// Stamped by the orchestrator once every stage has run.
    pub metrics: Option<RunMetrics>,
}

impl PipelineState {
    pub fn new(session_id: Option<String>, scope_id: impl Into<String>) -> Self {
        Self {
            session_id,
            scope_id: scope_id.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, path: Option<PathBuf>) -> Self {
        self.source_path = path;
        self
    }

    pub fn session(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn merge(&mut self, out: StageOutput) {
        if let Some(v) = out.source_path {
            self.source_path = Some(v);
        }
        if let Some(v) = out.all_lines {
            self.all_lines = v;
        }
        if let Some(v) = out.filtered_lines {
            self.filtered_lines = v;
        }
        if let Some(v) = out.dropped_lines {
            self.dropped_lines = v;
        }
        if let Some(v) = out.requirements {
            self.requirements = v;
        }
        if let Some(v) = out.duplicates_removed {
            self.duplicates_removed = v;
        }
        if let Some(v) = out.test_cases {
            self.test_cases = v;
        }
        if let Some(v) = out.rejected_test_cases {
            self.rejected_test_cases = v;
        }
        if let Some(v) = out.output_json {
            self.output_json = Some(v);
        }
        if let Some(v) = out.persisted {
            self.persisted = Some(v);
        }
    }
}

/// Fields a stage produced. Unset fields leave the state as it was.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub source_path: Option<PathBuf>,
    pub all_lines: Option<Vec<String>>,
    pub filtered_lines: Option<Vec<String>>,
    pub dropped_lines: Option<Vec<String>>,
    pub requirements: Option<Vec<Requirement>>,
    pub duplicates_removed: Option<usize>,
    pub test_cases: Option<Vec<TestCase>>,
    pub rejected_test_cases: Option<usize>,
    pub output_json: Option<PathBuf>,
    pub persisted: Option<PersistSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetrics {
    pub lines_kept: usize,
    pub lines_dropped: usize,
    pub requirements_count: usize,
    pub duplicates_removed: usize,
    pub test_cases_count: usize,
    pub rejected_test_cases: usize,
    pub runtime_sec: f64,
}

impl RunMetrics {
    pub fn from_state(state: &PipelineState, elapsed: Duration) -> Self {
        Self {
            lines_kept: state.filtered_lines.len(),
            lines_dropped: state.dropped_lines.len(),
            requirements_count: state.requirements.len(),
            duplicates_removed: state.duplicates_removed,
            test_cases_count: state.test_cases.len(),
            rejected_test_cases: state.rejected_test_cases,
            runtime_sec: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
        }
    }
}
