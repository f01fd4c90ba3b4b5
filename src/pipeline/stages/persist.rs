use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::errors::PipelineError;
use crate::model::Action;
use crate::pipeline::{PipelineState, Stage, StageContext, StageOutput};
use crate::store::{ArtifactStore, FilteringReport, OutputDocument, PersistSummary, write_output_json};

/// Writes the JSON artifact and stores requirements and test cases.
pub struct PersistStage {
    ctx: StageContext,
    store: Arc<ArtifactStore>,
}

impl PersistStage {
    pub fn new(ctx: StageContext, store: Arc<ArtifactStore>) -> Self {
        Self { ctx, store }
    }

    fn persist(&self, state: &PipelineState) -> anyhow::Result<PersistSummary> {
        let output = self.ctx.settings.output_json_path();
        write_output_json(
            &output,
            &OutputDocument {
                filtering: FilteringReport {
                    total_lines: state.all_lines.len(),
                    kept: state.filtered_lines.len(),
                    dropped: state.dropped_lines.len(),
                    use_llm_classifier: self.ctx.settings.filter().llm_classifier,
                },
                requirements: &state.requirements,
                test_cases: &state.test_cases,
            },
        )?;

        let requirements_upserted = self.store.upsert_requirements(&state.requirements)?;
        let (test_cases_inserted, test_cases_unchanged) =
            self.store.append_test_cases(&state.test_cases)?;
        Ok(PersistSummary {
            requirements_upserted,
            test_cases_inserted,
            test_cases_unchanged,
        })
    }
}

#[async_trait]
impl Stage for PersistStage {
    fn name(&self) -> &'static str {
        "persist"
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let summary = self.persist(state).map_err(PipelineError::Persistence)?;
        let output = self.ctx.settings.output_json_path();
        info!(
            output = %output.display(),
            requirements = summary.requirements_upserted,
            inserted = summary.test_cases_inserted,
            unchanged = summary.test_cases_unchanged,
            "artifacts persisted"
        );

        self.ctx.memory.record_action(
            state.session(),
            Action::new("persist", "saved")
                .step("store")
                .status("ok")
                .attr("requirements", summary.requirements_upserted)
                .attr("test_cases_new", summary.test_cases_inserted),
        );

        Ok(StageOutput {
            output_json: Some(output),
            persisted: Some(summary),
            ..Default::default()
        })
    }
}
