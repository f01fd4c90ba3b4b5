//! `reqflow memory`: instruction memory tiers.

use anyhow::{Context, Result};
use std::path::Path;

use reqflow::session::{MemoryTier, SessionStore};

use super::super::{Cli, MemoryCommands};
use super::load_settings;

fn tier(scope: Option<String>, session: Option<String>) -> MemoryTier {
    match (scope, session) {
        (_, Some(session)) => MemoryTier::Session(session),
        (Some(scope), None) => MemoryTier::Scope(scope),
        (None, None) => MemoryTier::Global,
    }
}

pub fn cmd_memory(cli: &Cli, project_dir: &Path, command: MemoryCommands) -> Result<()> {
    let settings = load_settings(cli, project_dir)?;
    let store = SessionStore::new(&settings.db_path())
        .with_context(|| format!("Failed to open session store {}", settings.db_path().display()))?;

    match command {
        MemoryCommands::Set {
            key,
            value,
            scope,
            session,
        } => {
            let tier = tier(scope, session);
            store.set_memory(&tier, &key, &value)?;
            println!("Set {} memory: {} = {}", tier.as_str(), key, value);
        }
        MemoryCommands::Show { scope, session } => {
            let tier = tier(scope, session);
            let entries = store.memory(&tier)?;
            if entries.is_empty() {
                println!("No {} memory entries", tier.as_str());
            }
            for (k, v) in entries {
                println!("{} = {}", k, v);
            }
        }
    }
    Ok(())
}
