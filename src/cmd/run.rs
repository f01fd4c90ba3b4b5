//! `reqflow run`: pipeline execution.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::super::Cli;
use super::{build_backend, load_settings, open_memory};

pub struct RunArgs {
    pub source: Option<PathBuf>,
    pub session: Option<String>,
    pub dry_run: bool,
    pub sync: bool,
    pub all: bool,
}

pub async fn cmd_run(cli: &Cli, project_dir: &Path, args: RunArgs) -> Result<()> {
    use reqflow::pipeline::{Orchestrator, PipelineState, StageContext, standard_stages};
    use reqflow::store::ArtifactStore;
    use reqflow::ui::PipelineUI;

    let settings = Arc::new(load_settings(cli, project_dir)?);
    let memory = open_memory(&settings);
    let session_id = memory.ensure(args.session.as_deref(), settings.scope());
    let backend = build_backend(&settings);

    println!();
    println!("{}", style("reqflow pipeline").bold().cyan());
    println!("  Session: {}", session_id);
    if backend.is_none() {
        println!(
            "  Mode:    {}",
            style("offline (deterministic fixtures)").yellow()
        );
    }
    if args.dry_run {
        println!("  {}", style("Dry run: nothing will be persisted").dim());
    }
    println!();

    let store = if args.dry_run {
        None
    } else {
        Some(Arc::new(ArtifactStore::new(&settings.db_path()).with_context(
            || format!("Failed to open database {}", settings.db_path().display()),
        )?))
    };

    let ctx = StageContext {
        settings: settings.clone(),
        memory: memory.clone(),
        backend,
    };
    let stages = standard_stages(&ctx, store.clone());
    let names = stages.iter().map(|s| s.name()).collect();
    let ui = Arc::new(PipelineUI::new(names, cli.verbose));
    let observer_ui = ui.clone();
    let orchestrator = Orchestrator::new(stages).with_observer(Box::new(move |stage: &str, state: &PipelineState| {
        observer_ui.stage_complete(stage, state);
        Ok(())
    }));

    let initial = PipelineState::new(Some(session_id.clone()), settings.scope())
        .with_source(args.source.map(|p| resolve(project_dir, p)));
    let state = match orchestrator.run(initial).await {
        Ok(state) => state,
        Err(e) => {
            ui.fail(&e);
            return Err(e).context("Pipeline run failed");
        }
    };
    ui.finish(state.metrics.as_ref());

    if let Some(output) = &state.output_json {
        println!("  Output:  {}", output.display());
    }
    println!(
        "  Resume with: reqflow run --session {}",
        style(&session_id).bold()
    );

    let sync_requested = args.sync || settings.tracker().sync_on_pipeline;
    if sync_requested {
        match store {
            Some(store) => {
                println!();
                super::sync::reconcile(&settings, &memory, store, args.all, Some(&session_id))
                    .await?;
            }
            None => println!("{}", style("Skipping tracker sync on dry run").dim()),
        }
    }

    Ok(())
}

fn resolve(project_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        project_dir.join(path)
    }
}
