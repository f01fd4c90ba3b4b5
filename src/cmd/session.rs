//! `reqflow session`: session inspection.

use anyhow::Result;
use std::path::Path;

use super::super::{Cli, SessionCommands};
use super::{load_settings, open_memory};

pub fn cmd_session(cli: &Cli, project_dir: &Path, command: SessionCommands) -> Result<()> {
    let settings = load_settings(cli, project_dir)?;
    let memory = open_memory(&settings);
    if memory.is_stateless() {
        anyhow::bail!(
            "Session store unavailable at {}",
            settings.db_path().display()
        );
    }

    match command {
        SessionCommands::Show { id } => match memory.snapshot(&id) {
            Some(snapshot) => println!("{}", snapshot),
            None => anyhow::bail!("Session not found: {}", id),
        },
        SessionCommands::New => {
            let id = memory.ensure(None, settings.scope());
            println!("{}", id);
        }
    }
    Ok(())
}
