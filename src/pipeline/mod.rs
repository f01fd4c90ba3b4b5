//! Stage sequencing over a typed [`PipelineState`].
//!
//! Stages run strictly in declaration order, one at a time. The first stage
//! error aborts the run; the orchestrator never retries. An optional
//! observer sees the state after every stage, but nothing it does can affect
//! the run.

pub mod fixtures;
pub mod stages;
pub mod state;
pub mod transcript;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::errors::PipelineError;
use crate::llm::{GenerativeBackend, RetryPolicy};
use crate::session::SessionMemory;
use crate::store::ArtifactStore;

pub use state::{PipelineState, RunMetrics, StageOutput};

/// One pipeline step.
/// Real implementations live in [`stages`]. Test doubles are local to tests.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce this stage's fields from the current state. Must not create
    /// duplicate persisted records when re-run on unchanged input.
    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError>;
}

/// Collaborators shared by every stage, built once per process.
#[derive(Clone)]
pub struct StageContext {
    pub settings: Arc<Settings>,
    pub memory: Arc<SessionMemory>,
    /// `None` in offline mode.
    pub backend: Option<Arc<dyn GenerativeBackend>>,
}

impl StageContext {
    pub fn backend(&self) -> Option<&dyn GenerativeBackend> {
        self.backend.as_deref()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.settings.llm().max_attempts,
            ..RetryPolicy::default()
        }
    }
}

/// Telemetry hook called with `(stage_name, state)` after each stage.
pub type Observer = Box<dyn Fn(&str, &PipelineState) -> anyhow::Result<()> + Send + Sync>;

pub struct Orchestrator {
    stages: Vec<Box<dyn Stage>>,
    observer: Option<Observer>,
}

impl Orchestrator {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, initial: PipelineState) -> Result<PipelineState, PipelineError> {
        let started = Instant::now();
        let mut state = initial;

        for stage in &self.stages {
            let name = stage.name();
            info!(stage = name, "stage started");
            let output = stage.execute(&state).await.map_err(|e| {
                error!(stage = name, error = %e, "stage failed");
                e
            })?;
            state.merge(output);
            self.notify(name, &state);
        }

        let metrics = RunMetrics::from_state(&state, started.elapsed());
        info!(
            requirements = metrics.requirements_count,
            test_cases = metrics.test_cases_count,
            runtime_sec = metrics.runtime_sec,
            "pipeline finished"
        );
        state.metrics = Some(metrics);
        Ok(state)
    }

    fn notify(&self, stage: &str, state: &PipelineState) {
        let Some(observer) = &self.observer else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| observer(stage, state))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(stage, error = %e, "observer failed"),
            Err(_) => warn!(stage, "observer panicked"),
        }
    }
}

/// ingest → requirements → review → tests → persist. Without a store the
/// persist stage is omitted (dry run).
pub fn standard_stages(ctx: &StageContext, store: Option<Arc<ArtifactStore>>) -> Vec<Box<dyn Stage>> {
    let mut list: Vec<Box<dyn Stage>> = vec![
        Box::new(stages::IngestStage::new(ctx.clone())),
        Box::new(stages::RequirementsStage::new(ctx.clone())),
        Box::new(stages::ReviewStage::new(ctx.clone())),
        Box::new(stages::TestsStage::new(ctx.clone())),
    ];
    if let Some(store) = store {
        list.push(Box::new(stages::PersistStage::new(ctx.clone(), store)));
    }
    list
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;
    use crate::config::MemoryConfig;
    use crate::session::SessionStore;

    /// Offline settings rooted at `dir`, with an in-memory session store.
    pub fn offline_context(dir: &Path) -> StageContext {
        context_with_env(dir, &[], None)
    }

    pub fn context_with_env(
        dir: &Path,
        pairs: &[(&str, &str)],
        backend: Option<Arc<dyn GenerativeBackend>>,
    ) -> StageContext {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let settings = Settings::with_env(dir.to_path_buf(), |k| env.get(k).cloned()).unwrap();
        let store = SessionStore::new_in_memory().unwrap();
        StageContext {
            settings: Arc::new(settings),
            memory: Arc::new(SessionMemory::with_store(store, MemoryConfig::default())),
            backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Emit {
        name: &'static str,
        lines: Vec<&'static str>,
    }

    #[async_trait]
    impl Stage for Emit {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
            let mut lines = state.filtered_lines.clone();
            lines.extend(self.lines.iter().map(|s| s.to_string()));
            Ok(StageOutput {
                filtered_lines: Some(lines),
                ..Default::default()
            })
        }
    }

    struct Boom;

    #[async_trait]
    impl Stage for Boom {
        fn name(&self) -> &'static str {
            "boom"
        }

        async fn execute(&self, _state: &PipelineState) -> Result<StageOutput, PipelineError> {
            Err(PipelineError::InputMissing {
                path: "missing.vtt".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_stages_run_in_order_and_merge() {
        let orch = Orchestrator::new(vec![
            Box::new(Emit { name: "a", lines: vec!["1"] }),
            Box::new(Emit { name: "b", lines: vec!["2", "3"] }),
        ]);
        assert_eq!(orch.stage_names(), vec!["a", "b"]);
        let state = orch.run(PipelineState::default()).await.unwrap();
        assert_eq!(state.filtered_lines, vec!["1", "2", "3"]);
        let metrics = state.metrics.unwrap();
        assert_eq!(metrics.lines_kept, 3);
        assert!(metrics.runtime_sec >= 0.0);
    }

    #[tokio::test]
    async fn test_fail_fast_stops_later_stages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let orch = Orchestrator::new(vec![
            Box::new(Emit { name: "a", lines: vec!["1"] }),
            Box::new(Boom),
            Box::new(Emit { name: "c", lines: vec!["never"] }),
        ])
        .with_observer(Box::new(move |name: &str, _: &PipelineState| {
            seen_clone.lock().unwrap().push(name.to_string());
            Ok(())
        }));

        let err = orch.run(PipelineState::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing { .. }));
        assert_eq!(*seen.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_observer_failures_do_not_affect_run() {
        let orch = Orchestrator::new(vec![
            Box::new(Emit { name: "a", lines: vec!["1"] }),
            Box::new(Emit { name: "b", lines: vec!["2"] }),
        ])
        .with_observer(Box::new(|name: &str, _: &PipelineState| {
            if name == "a" {
                anyhow::bail!("telemetry sink down");
            }
            panic!("observer exploded");
        }));

        let state = orch.run(PipelineState::default()).await.unwrap();
        assert_eq!(state.filtered_lines, vec!["1", "2"]);
        assert!(state.metrics.is_some());
    }

    #[test]
    fn test_standard_stages_dry_run_omits_persist() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::offline_context(dir.path());
        let names: Vec<_> = standard_stages(&ctx, None).iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["ingest", "requirements", "review", "tests"]);

        let store = Arc::new(ArtifactStore::new_in_memory().unwrap());
        let names: Vec<_> = standard_stages(&ctx, Some(store)).iter().map(|s| s.name()).collect();
        assert_eq!(names.last(), Some(&"persist"));
    }

    #[test]
    fn test_retry_policy_follows_settings() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = testing::context_with_env(dir.path(), &[], None);
        assert_eq!(ctx.retry_policy().max_attempts, 2);
        assert!(ctx.backend().is_none());
    }
}
