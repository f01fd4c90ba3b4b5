//! `reqflow sync`: tracker reconciliation.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use reqflow::config::Settings;
use reqflow::model::Action;
use reqflow::session::SessionMemory;
use reqflow::store::ArtifactStore;
use reqflow::sync::{JiraTracker, ReconcileOptions, Reconciler, SyncReport};
use reqflow::ui::icons::{CHECK, LINK, WARN};

use super::super::Cli;
use super::{load_settings, open_memory};

pub async fn cmd_sync(
    cli: &Cli,
    project_dir: &Path,
    all: bool,
    session: Option<&str>,
) -> Result<()> {
    let settings = load_settings(cli, project_dir)?;
    let memory = open_memory(&settings);
    let store = Arc::new(
        ArtifactStore::new(&settings.db_path())
            .with_context(|| format!("Failed to open database {}", settings.db_path().display()))?,
    );
    reconcile(&settings, &memory, store, all, session).await?;
    Ok(())
}

/// Reconcile `store` with the configured tracker and print the report.
/// Returns `None` when tracker integration is disabled.
pub async fn reconcile(
    settings: &Settings,
    memory: &SessionMemory,
    store: Arc<ArtifactStore>,
    all: bool,
    session: Option<&str>,
) -> Result<Option<SyncReport>> {
    let tracker_cfg = settings.tracker();
    if !tracker_cfg.enabled {
        println!(
            "{}",
            style("Tracker integration disabled (JIRA_INTEGRATION=0), skipping sync.").dim()
        );
        return Ok(None);
    }

    let tracker = JiraTracker::new(tracker_cfg, settings.tracker_token.as_deref())
        .context("Cannot connect to the issue tracker")?;
    let mut options = ReconcileOptions::from_config(tracker_cfg);
    if all {
        options.approved_only = false;
    }

    println!(
        "{}Syncing to project '{}' as {}{}",
        LINK,
        tracker_cfg.project,
        tracker_cfg.user,
        if options.approved_only { " (approved only)" } else { "" }
    );

    let approved_only = options.approved_only;
    let report = Reconciler::new(Arc::new(tracker), store, options).run().await?;
    println!("{}", report);

    if report.failures() > 0 {
        println!(
            "{}{} item(s) failed; re-run sync to retry them",
            WARN,
            report.failures()
        );
    } else {
        println!("{}Sync complete", CHECK);
    }

    memory.record_action(
        session,
        Action::new("sync", "reconciled")
            .step("tracker")
            .mode(if approved_only { "approved" } else { "all" })
            .status(if report.failures() > 0 { "partial" } else { "ok" })
            .attr(
                "created",
                report.requirements.created + report.test_cases.created,
            )
            .attr("failed", report.failures()),
    );

    Ok(Some(report))
}
