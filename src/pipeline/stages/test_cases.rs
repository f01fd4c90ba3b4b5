use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AGENT_INSTRUCTIONS;
use crate::errors::PipelineError;
use crate::extract::normalize::normalize_test_cases;
use crate::extract::{entity_list, extract_json};
use crate::llm::{ChatMessage, Generation, generate};
use crate::model::{Action, Requirement};
use crate::pipeline::{PipelineState, Stage, StageContext, StageOutput, fixtures};

fn scenario_prompt(requirements: &[Requirement]) -> String {
    let compact: Vec<Value> = requirements
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "description": r.description,
                "acceptance_criteria": r.acceptance_criteria,
            })
        })
        .collect();
    format!(
        "You are a QA engineer. For each requirement below, generate 3 scenarios in Gherkin: \
positive, negative, regression.\n\
Rules:\n\
- Each scenario starts with 'Scenario:' and uses Given, When and Then steps.\n\
- Include tags such as @positive, @negative or @regression.\n\
- Return a JSON array only, each item with requirement_id, scenario_type, gherkin, tags.\n\n\
Requirements:\n{}",
        Value::Array(compact)
    )
}

fn fixture_cases(requirements: &[Requirement]) -> Vec<Value> {
    requirements
        .iter()
        .flat_map(fixtures::offline_test_cases)
        .collect()
}

/// Generates positive, negative and regression scenarios per requirement.
pub struct TestsStage {
    ctx: StageContext,
}

impl TestsStage {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    async fn raw_cases(&self, state: &PipelineState) -> (Vec<Value>, &'static str) {
        let sid = state.session();
        let llm = self.ctx.settings.llm();
        let system = self
            .ctx
            .memory
            .hydrate(AGENT_INSTRUCTIONS, sid, &state.scope_id, None);
        let user = self
            .ctx
            .memory
            .continue_prompt(&scenario_prompt(&state.requirements), sid);
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
                match extract_json(&text).and_then(|v| entity_list(v, "test_cases")) {
                    Ok(items) => (items, "llm"),
                    Err(e) => {
                        warn!(error = %e, "test case output unparsable, using fixtures");
                        (fixture_cases(&state.requirements), "fixture")
                    }
                }
            }
            Generation::Offline => (fixture_cases(&state.requirements), "offline"),
            Generation::Failed(e) => {
                warn!(error = %e, "test case generation failed, using fixtures");
                (fixture_cases(&state.requirements), "fixture")
            }
        }
    }
}

#[async_trait]
impl Stage for TestsStage {
    fn name(&self) -> &'static str {
        "tests"
    }

    async fn execute(&self, state: &PipelineState) -> Result<StageOutput, PipelineError> {
        let sid = state.session();
        if state.requirements.is_empty() {
            info!("no requirements, skipping test generation");
            return Ok(StageOutput {
                test_cases: Some(Vec::new()),
                rejected_test_cases: Some(0),
                ..Default::default()
            });
        }

        let (raw, mode) = self.raw_cases(state).await;
        let known: HashSet<String> = state.requirements.iter().map(|r| r.id.clone()).collect();
        let (test_cases, rejected) = normalize_test_cases(&raw, &known);
        for reject in &rejected {
            warn!(
                requirement_id = %reject.requirement_id,
                scenario = %reject.scenario,
                reason = %reject.reason,
                "test case rejected"
            );
        }
        info!(
            kept = test_cases.len(),
            rejected = rejected.len(),
            mode,
            "test cases generated"
        );

        self.ctx.memory.note(
            sid,
            &format!(
                "Generated {} valid BDD test cases from {} requirements.",
                test_cases.len(),
                state.requirements.len()
            ),
        );
        self.ctx.memory.record_action(
            sid,
            Action::new("tests", "generated")
                .step("bdd")
                .mode(mode)
                .status("ok")
                .attr("kept", test_cases.len())
                .attr("rejected", rejected.len()),
        );

        Ok(StageOutput {
            test_cases: Some(test_cases),
            rejected_test_cases: Some(rejected.len()),
            ..Default::default()
        })
    }
}
