//! `reqflow config`: configuration view and initialization.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use reqflow::config::{CONFIG_DIR, CONFIG_FILE, ReqflowToml, Settings};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = project_dir.join(CONFIG_DIR).join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            let settings = Settings::new(project_dir.to_path_buf())?;
            println!();
            println!("{}", style("reqflow configuration").bold().cyan());
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No {} found, using defaults.", CONFIG_FILE);
            }
            println!(
                "Mode: {}",
                if settings.is_offline() {
                    "offline (no OPENAI_API_KEY)"
                } else {
                    "online"
                }
            );
            println!();
            println!("Effective values (with env overrides):");
            let rendered = toml::to_string_pretty(&settings.toml)
                .context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }

            let warnings = settings.validate();
            if !warnings.is_empty() {
                println!();
                println!("{}", style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            ReqflowToml::default().save(&config_path)?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}
