use async_trait::async_trait;
use tracing::info;

use crate::errors::PipelineError;
use crate::extract::normalize::{dedupe_requirements, revalidate_requirement};
use crate::model::Action;
use crate::pipeline::{PipelineState, Stage, StageContext, StageOutput};

/// Re-validates and deduplicates requirements.
pub struct ReviewStage {
    ctx: StageContext,
}

impl ReviewStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &'static str {
        "review"
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let before = state.requirements.len();
        let revalidated = state
            .requirements
            .iter()
            .cloned()
            .map(revalidate_requirement)
            .collect();
        let (requirements, removed) = dedupe_requirements(revalidated);
        let after = requirements.len();
        info!(before, after, removed, "requirements reviewed");

        let bullet = if removed > 0 {
            format!(
                "Reviewed requirements; deduplicated to {} items (from {}).",
                after, before
            )
        } else {
            format!(
                "Reviewed requirements; {} items (no duplicates removed).",
                after
            )
        };
        let sid = state.session();
        self.ctx.memory.note(sid, &bullet);
        self.ctx.memory.record_action(
            sid,
            Action::new("review", "deduplicated")
                .step("review")
                .status("ok")
                .attr("before", before)
                .attr("after", after),
        );

        Ok(StageOutput {
            requirements: Some(requirements),
            duplicates_removed: Some(removed),
            ..Default::default()
        })
    }
}
