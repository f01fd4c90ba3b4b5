use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use reqflow::config::CONFIG_DIR;
use reqflow::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "reqflow")]
#[command(
    version,
    about = "Turn meeting transcripts into reviewed requirements and BDD test cases"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline: ingest, requirements, review, tests, persist
    Run {
        /// Transcript to ingest (WebVTT), relative to the project directory.
        /// Defaults to config, then the session's last source.
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Continue an existing session
        #[arg(long)]
        session: Option<String>,

        /// Skip persistence (no database rows, no output file)
        #[arg(long)]
        dry_run: bool,

        /// Reconcile with the issue tracker afterwards
        #[arg(long)]
        sync: bool,

        /// With --sync, include unapproved requirements
        #[arg(long)]
        all: bool,
    },
    /// Reconcile stored requirements and test cases with the issue tracker
    Sync {
        /// Include unapproved requirements
        #[arg(long)]
        all: bool,

        /// Record the sync in this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Mark requirements approved for sync
    Approve {
        /// Requirement ids (e.g. REQ-001)
        #[arg(required = true)]
        ids: Vec<String>,

        /// Remove approval instead
        #[arg(long)]
        revoke: bool,
    },
    /// Inspect or create sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Manage instruction memory (tone, format, story_prefix, notes)
    Memory {
        #[command(subcommand)]
        command: MemoryCommands,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum SessionCommands {
    /// Show a session's rolling summary and recent actions
    Show { id: String },
    /// Create a new session and print its id
    New,
}

#[derive(Subcommand, Clone)]
pub enum MemoryCommands {
    /// Set a memory entry (global unless --scope or --session is given)
    Set {
        key: String,
        value: String,
        #[arg(long, conflicts_with = "session")]
        scope: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// Show memory entries for a tier
    Show {
        #[arg(long, conflicts_with = "session")]
        scope: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration and any warnings
    Show,
    /// Write a default reqflow.toml
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if dotenvy::from_path(project_dir.join(".env")).is_err() {
        dotenvy::dotenv().ok();
    }

    let config_dir = project_dir.join(CONFIG_DIR);
    let _log_guard = logging::init(&LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        log_dir: config_dir.is_dir().then(|| config_dir.join("logs")),
    })?;

    match &cli.command {
        Commands::Run {
            source,
            session,
            dry_run,
            sync,
            all,
        } => {
            cmd::cmd_run(
                &cli,
                &project_dir,
                cmd::RunArgs {
                    source: source.clone(),
                    session: session.clone(),
                    dry_run: *dry_run,
                    sync: *sync,
                    all: *all,
                },
            )
            .await?
        }
        Commands::Sync { all, session } => {
            cmd::cmd_sync(&cli, &project_dir, *all, session.as_deref()).await?
        }
        Commands::Approve { ids, revoke } => cmd::cmd_approve(&cli, &project_dir, ids, *revoke)?,
        Commands::Session { command } => cmd::cmd_session(&cli, &project_dir, command.clone())?,
        Commands::Memory { command } => cmd::cmd_memory(&cli, &project_dir, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
