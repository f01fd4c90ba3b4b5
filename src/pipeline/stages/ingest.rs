use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::errors::PipelineError;
use crate::llm::GenerativeBackend;
use crate::model::Action;
use crate::pipeline::transcript::{FilterOutcome, filter_lines, read_vtt};
use crate::pipeline::{PipelineState, Stage, StageContext, StageOutput};
use crate::session::LAST_SOURCE_KEY;

/// Source used when nothing else names one.
pub const DEFAULT_SOURCE_FILE: &str = "meeting_transcript.vtt";

/// Reads the transcript and drops small talk.
pub struct IngestStage {
    ctx: StageContext,
}

impl IngestStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// State, then configuration, then the session's last source, then the default file.
    fn resolve_source(&self, state: &PipelineState) -> PathBuf {
        let settings = &self.ctx.settings;
        state
            .source_path
            .clone()
            .or_else(|| settings.source_path())
            .or_else(|| {
                self.ctx
                    .memory
                    .get_kv(state.session(), LAST_SOURCE_KEY)
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| settings.project_dir.join(DEFAULT_SOURCE_FILE))
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> &'static str {
        "ingest"
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let source = self.resolve_source(state);
        let sid = state.session();
        let lines = read_vtt(&source)?;
        self.ctx
            .memory
            .set_kv(sid, LAST_SOURCE_KEY, &source.display().to_string());

        let filter = self.ctx.settings.filter();
        let classifier: Option<(&dyn GenerativeBackend, &str)> = if filter.llm_classifier {
            self.ctx
                .backend()
                .map(|b| (b, self.ctx.settings.llm().classifier_model.as_str()))
        } else {
            None
        };

        let outcome = if filter.smalltalk {
            filter_lines(&lines, classifier).await
        } else {
            FilterOutcome {
                kept: lines.clone(),
                dropped: Vec::new(),
            }
        };

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        info!(
            source = %source.display(),
            total = lines.len(),
            kept = outcome.kept.len(),
            dropped = outcome.dropped.len(),
            "transcript ingested"
        );

        let mode = if classifier.is_some() { "rules+llm" } else { "rules" };
        self.ctx.memory.note(
            sid,
            &format!(
                "Ingested {}: kept {}/{} lines; dropped {} small-talk.",
                file_name,
                outcome.kept.len(),
                lines.len(),
                outcome.dropped.len()
            ),
        );
        self.ctx.memory.record_action(
            sid,
            Action::new("ingest", "filtered")
                .step("transcript")
                .mode(mode)
                .status("ok")
                .item(file_name)
                .attr("kept", outcome.kept.len())
                .attr("dropped", outcome.dropped.len()),
        );

        Ok(StageOutput {
            source_path: Some(source),
            all_lines: Some(lines),
            filtered_lines: Some(outcome.kept),
            dropped_lines: Some(outcome.dropped),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{context_with_env, offline_context};

    const VTT: &str = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nAlice: Good morning everyone!\n\n2\n00:00:02.000 --> 00:00:05.000\nBob: Checkout needs acceptance criteria for totals.\n\n3\n00:00:05.000 --> 00:00:08.000\nCarol: OTP expires in 10 minutes.\n";

    #[tokio::test]
    async fn test_ingest_filters_greeting_and_remembers_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("call.vtt");
        std::fs::write(&path, VTT).unwrap();
        let ctx = offline_context(dir.path());
        let stage = IngestStage::new(ctx.clone());

        let state = PipelineState::new(Some("s1".into()), "default").with_source(Some(path.clone()));
        let out = stage.execute(&state).await.unwrap();

        assert_eq!(out.all_lines.unwrap().len(), 3);
        assert_eq!(out.dropped_lines.unwrap(), vec!["Alice: Good morning everyone!"]);
        assert_eq!(out.filtered_lines.unwrap().len(), 2);
        assert_eq!(
            ctx.memory.get_kv(Some("s1"), LAST_SOURCE_KEY).as_deref(),
            Some(path.display().to_string().as_str())
        );
        assert!(ctx.memory.compact_summary(Some("s1")).contains("kept 2/3 lines"));
    }

    #[tokio::test]
    async fn test_ingest_resumes_from_session_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("earlier.vtt");
        std::fs::write(&path, VTT).unwrap();
        let ctx = offline_context(dir.path());
        ctx.memory.set_kv(Some("s2"), LAST_SOURCE_KEY, &path.display().to_string());

        let out = IngestStage::new(ctx)
            .execute(&PipelineState::new(Some("s2".into()), "default"))
            .await
            .unwrap();
        assert_eq!(out.source_path, Some(path));
    }

    #[tokio::test]
    async fn test_ingest_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = offline_context(dir.path());
        let err = IngestStage::new(ctx)
            .execute(&PipelineState::default())
            .await
            .unwrap_err();
        match err {
            PipelineError::InputMissing { path } => {
                assert!(path.ends_with(DEFAULT_SOURCE_FILE))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ingest_keeps_everything_when_filter_disabled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_SOURCE_FILE), VTT).unwrap();
        let ctx = context_with_env(dir.path(), &[("SMALLTALK_FILTER", "0")], None);
        let out = IngestStage::new(ctx)
            .execute(&PipelineState::default())
            .await
            .unwrap();
        assert_eq!(out.filtered_lines.unwrap().len(), 3);
        assert!(out.dropped_lines.unwrap().is_empty());
    }
}
