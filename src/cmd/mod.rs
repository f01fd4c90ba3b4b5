//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `run`      | `Run`            |
//! | `sync`     | `Sync`           |
//! | `approve`  | `Approve`        |
//! | `session`  | `Session`        |
//! | `memory`   | `Memory`         |
//! | `config`   | `Config`         |

pub mod approve;
pub mod config;
pub mod memory;
pub mod run;
pub mod session;
pub mod sync;

pub use approve::cmd_approve;
pub use config::cmd_config;
pub use memory::cmd_memory;
pub use run::{RunArgs, cmd_run};
pub use session::cmd_session;
pub use sync::cmd_sync;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use reqflow::config::Settings;
use reqflow::llm::{GenerativeBackend, OpenAiBackend};
use reqflow::session::SessionMemory;

use super::Cli;

/// Resolve settings for `project_dir`, carrying the global CLI flags.
pub fn load_settings(cli: &Cli, project_dir: &Path) -> Result<Settings> {
    let mut settings = Settings::new(project_dir.to_path_buf())?;
    settings.verbose = cli.verbose;
    for warning in settings.validate() {
        warn!(warning = %warning, "configuration warning");
    }
    Ok(settings)
}

pub fn open_memory(settings: &Settings) -> Arc<SessionMemory> {
    Arc::new(SessionMemory::open(
        &settings.db_path(),
        settings.memory().clone(),
    ))
}

/// The configured generative backend, or `None` in offline mode.
pub fn build_backend(settings: &Settings) -> Option<Arc<dyn GenerativeBackend>> {
    if settings.is_offline() {
        return None;
    }
    let key = settings.api_key.as_deref().unwrap_or_default();
    match OpenAiBackend::new(settings.llm(), key) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!(error = %e, "could not build generative backend, running offline");
            None
        }
    }
}
