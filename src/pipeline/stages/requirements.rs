use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::AGENT_INSTRUCTIONS;
use crate::errors::PipelineError;
use crate::extract::normalize::normalize_requirements;
use crate::extract::{entity_list, extract_json};
use crate::llm::{ChatMessage, Generation, generate};
use crate::model::Action;
use crate::pipeline::{PipelineState, Stage, StageContext, StageOutput, fixtures};

fn extraction_prompt(transcript: &str) -> String {
    format!(
        "You are a senior business analyst. Extract 3-6 clear, testable business requirements \
from the meeting transcript below.\n\
Rules:\n\
- Each requirement has: id, title, description, acceptance_criteria (exactly 3 Given/When/Then strings), priority (High|Medium|Low), epic.\n\
- Ignore greetings, scheduling and other small talk.\n\
- Return a JSON array only.\n\n\
Transcript:\n{}",
        transcript
    )
}

/// Turns filtered transcript lines into requirements.
pub struct RequirementsStage {
    ctx: StageContext,
}

impl RequirementsStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// Raw requirement objects plus the mode that produced them.
    async fn raw_requirements(&self, state: &PipelineState) -> (Vec<Value>, &'static str) {
        let sid = state.session();
        let llm = self.ctx.settings.llm();
        let system = self
            .ctx
            .memory
            .hydrate(AGENT_INSTRUCTIONS, sid, &state.scope_id, None);
        let user = self
            .ctx
            .memory
            .continue_prompt(&extraction_prompt(&state.filtered_lines.join("\n")), sid);
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        match generate(
            self.ctx.backend(),
            &messages,
            &llm.model,
            llm.temperature,
            self.ctx.retry_policy(),
        )
        .await
        {
            Generation::Text(text) => {
                match extract_json(&text).and_then(|v| entity_list(v, "requirements")) {
                    Ok(items) => (items, "llm"),
                    Err(e) => {
                        warn!(error = %e, "requirements output unparsable, using fixtures");
                        (fixtures::offline_requirements(), "fixture")
                    }
                }
            }
            Generation::Offline => (fixtures::offline_requirements(), "offline"),
            Generation::Failed(e) => {
                warn!(error = %e, "requirements generation failed, using fixtures");
                (fixtures::offline_requirements(), "fixture")
            }
        }
    }
}

#[async_trait]
impl Stage for RequirementsStage {
    fn name(&self) -> &'static str {
        "requirements"
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let sid = state.session();
        if state.filtered_lines.is_empty() {
            info!("no business lines left after filtering, skipping extraction");
            self.ctx.memory.record_action(
                sid,
                Action::new("requirements", "skipped")
                    .step("extract")
                    .status("empty-input"),
            );
            return Ok(StageOutput {
                requirements: Some(Vec::new()),
                ..Default::default()
            });
        }

        let (raw, mode) = self.raw_requirements(state).await;
        let requirements = normalize_requirements(&raw);
        info!(count = requirements.len(), mode, "requirements extracted");

        self.ctx.memory.note(
            sid,
            &format!(
                "Extracted {} business requirements from transcript.",
                requirements.len()
            ),
        );
        self.ctx.memory.record_action(
            sid,
            Action::new("requirements", "extracted")
                .step("extract")
                .mode(mode)
                .status("ok")
                .attr("count", requirements.len()),
        );

        Ok(StageOutput {
            requirements: Some(requirements),
            ..Default::default()
        })
    }
}
