//! `reqflow approve`: requirement approval.

use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use std::path::Path;

use reqflow::extract::normalize::normalize_req_id;
use reqflow::store::ArtifactStore;

use super::super::Cli;
use super::load_settings;

pub fn cmd_approve(cli: &Cli, project_dir: &Path, ids: &[String], revoke: bool) -> Result<()> {
    let settings = load_settings(cli, project_dir)?;
    let store = ArtifactStore::new(&settings.db_path())
        .with_context(|| format!("Failed to open database {}", settings.db_path().display()))?;

    let mut normalized = Vec::new();
    for raw in ids {
        match normalize_req_id(raw) {
            Some(id) => normalized.push(id),
            None => println!("{} '{}' is not a requirement id", style("Skipping").yellow(), raw),
        }
    }
    if normalized.is_empty() {
        anyhow::bail!("No valid requirement ids given");
    }

    let verb = if revoke { "Revoke approval for" } else { "Approve" };
    if !cli.yes {
        let confirm = Confirm::new()
            .with_prompt(format!("{} {}?", verb, normalized.join(", ")))
            .default(true)
            .interact()
            .unwrap_or(false);
        if !confirm {
            println!("Cancelled");
            return Ok(());
        }
    }

    let changed = store.set_approved(&normalized, !revoke)?;
    let missing = normalized.len() - changed;
    println!(
        "{} {} requirement(s)",
        if revoke { "Unapproved" } else { "Approved" },
        style(changed).bold()
    );
    if missing > 0 {
        println!(
            "{}",
            style(format!("{} id(s) not found in the database", missing)).yellow()
        );
    }
    Ok(())
}
