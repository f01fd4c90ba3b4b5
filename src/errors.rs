//! Typed error hierarchy for reqflow.
//!
//! One enum per failure class, each absorbed at a different scope:
//! - `PipelineError`: fatal for a run; the only class that leaves the orchestrator
//! - `ParseError`: generated text could not be turned into JSON; stage-local
//! - `ValidationError`: a single entity failed normalization; dropped and counted
//! - `BackendError`: the generative backend failed; becomes a fixture branch
//! - `TrackerError`: one remote tracker call failed; isolated per entity

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source document not found: {}", path.display())]
    InputMissing { path: PathBuf },

    #[error("Failed to read source document at {path}: {source}")]
    SourceReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Generated output that holds no parseable structured value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Could not extract valid JSON from model output")]
    NoJson,

    #[error("Unexpected JSON shape: {0}")]
    UnexpectedShape(String),
}

/// Reasons an individual entity is dropped during normalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown scenario type '{0}'")]
    UnknownScenario(String),

    #[error("Test case for {requirement_id} ({scenario}) is missing Gherkin markers: {missing:?}")]
    MissingMarkers {
        requirement_id: String,
        scenario: String,
        missing: Vec<&'static str>,
    },

    #[error("Test case references unknown requirement {0}")]
    UnknownRequirement(String),

    #[error("Entity has no usable identity")]
    MissingIdentity,
}

/// Failures of the generative backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Generative backend is not configured (offline mode)")]
    Offline,

    #[error("Generative backend request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Generative backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Generative backend returned an empty completion")]
    EmptyResponse,
}

/// Failures of a single issue tracker call.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Tracker request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Tracker returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Tracker response did not include an issue key")]
    MissingKey,

    #[error("Tracker is misconfigured: {0}")]
    Config(String),
}

impl TrackerError {
    /// HTTP status of the failed call, if the tracker answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Status { status, .. } => Some(*status),
            TrackerError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_missing_carries_path() {
        let err = PipelineError::InputMissing {
            path: PathBuf::from("/tmp/meeting.vtt"),
        };
        match &err {
            PipelineError::InputMissing { path } => {
                assert_eq!(path, &PathBuf::from("/tmp/meeting.vtt"));
            }
            _ => panic!("Expected InputMissing"),
        }
        assert!(err.to_string().contains("meeting.vtt"));
    }

    #[test]
    fn pipeline_error_converts_from_anyhow() {
        let err: PipelineError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, PipelineError::Other(_)));
    }

    #[test]
    fn missing_markers_lists_what_is_absent() {
        let err = ValidationError::MissingMarkers {
            requirement_id: "REQ-001".into(),
            scenario: "positive".into(),
            missing: vec!["When", "Then"],
        };
        let msg = err.to_string();
        assert!(msg.contains("REQ-001"));
        assert!(msg.contains("When"));
    }

    #[test]
    fn tracker_status_is_exposed() {
        let err = TrackerError::Status {
            status: 404,
            body: "Issue does not exist".into(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(TrackerError::MissingKey.status(), None);
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&PipelineError::InputMissing {
            path: PathBuf::from("x"),
        });
        assert_std_error(&ParseError::NoJson);
        assert_std_error(&ValidationError::MissingIdentity);
        assert_std_error(&BackendError::Offline);
        assert_std_error(&TrackerError::MissingKey);
    }
}
