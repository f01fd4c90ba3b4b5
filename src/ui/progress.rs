use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::pipeline::{PipelineState, RunMetrics};
use crate::ui::icons::{CHECK, CROSS, SPARKLE, WARN};

/// Stage progress for `reqflow run`, rendered via an `indicatif` bar.
///
/// The bar advances once per completed stage and its message names the
/// stage running next. Driven from the orchestrator observer.
pub struct PipelineUI {
    bar: ProgressBar,
    stages: Vec<&'static str>,
    verbose: bool,
}

impl PipelineUI {
    pub fn new(stages: Vec<&'static str>, verbose: bool) -> Self {
        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let bar = ProgressBar::new(stages.len() as u64);
        bar.set_style(bar_style);
        bar.set_prefix("Pipeline");
        bar.enable_steady_tick(Duration::from_millis(100));
        if let Some(first) = stages.first() {
            bar.set_message(style(*first).yellow().to_string());
        }

        Self {
            bar,
            stages,
            verbose,
        }
    }

    /// Hidden bar for non-interactive output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            stages: Vec::new(),
            verbose: false,
        }
    }

    fn println(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", msg.as_ref());
        } else {
            self.bar.println(msg.as_ref());
        }
    }

    /// Observer hook: advance past `stage` and print its one-line outcome.
    pub fn stage_complete(&self, stage: &str, state: &PipelineState) {
        self.bar.inc(1);
        let line = match stage {
            "ingest" => format!(
                "kept {}/{} lines, dropped {}",
                state.filtered_lines.len(),
                state.all_lines.len(),
                state.dropped_lines.len()
            ),
            "requirements" => format!("{} requirements", state.requirements.len()),
            "review" => format!(
                "{} requirements after review ({} duplicates removed)",
                state.requirements.len(),
                state.duplicates_removed
            ),
            "tests" => format!(
                "{} test cases ({} rejected)",
                state.test_cases.len(),
                state.rejected_test_cases
            ),
            "persist" => match &state.persisted {
                Some(p) => format!(
                    "{} requirements, {} new test cases, {} unchanged",
                    p.requirements_upserted, p.test_cases_inserted, p.test_cases_unchanged
                ),
                None => "nothing persisted".to_string(),
            },
            _ => String::new(),
        };
        self.println(format!("{}{:<13} {}", CHECK, style(stage).bold(), line));

        if self.verbose && stage == "tests" {
            for tc in &state.test_cases {
                self.println(format!(
                    "    {} {} {}",
                    style(&tc.requirement_id).dim(),
                    tc.scenario_type,
                    tc.tags.join(" ")
                ));
            }
        }

        let done = self.bar.position() as usize;
        if let Some(next) = self.stages.get(done) {
            self.bar.set_message(style(*next).yellow().to_string());
        }
    }

    pub fn finish(&self, metrics: Option<&RunMetrics>) {
        self.bar.finish_and_clear();
        if let Some(m) = metrics {
            println!(
                "{}{} requirements, {} test cases in {:.2}s",
                SPARKLE,
                style(m.requirements_count).bold(),
                style(m.test_cases_count).bold(),
                m.runtime_sec
            );
            if m.rejected_test_cases > 0 {
                println!(
                    "{}{} generated test cases were rejected",
                    WARN, m.rejected_test_cases
                );
            }
        }
    }

    pub fn fail(&self, error: &dyn std::fmt::Display) {
        self.bar.abandon();
        eprintln!("{}{} {}", CROSS, style("Pipeline failed:").red().bold(), error);
    }
}
