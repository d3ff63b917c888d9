//! CLI handler for the configuration file.

use anyhow::{Context, Result};
use std::path::Path;

use super::args::{ConfigCliArgs, ConfigCommand};
use super::load_config;
use crate::config::Config;

pub fn handle_config_command(args: ConfigCliArgs, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    match args.command {
        ConfigCommand::Show { json } => {
            let config = load_config(config_path)?;
            if json {
                let content =
                    serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
                println!("{}", content);
            } else {
                let content =
                    toml::to_string_pretty(&config).context("Failed to serialize config")?;
                println!("# {}", path.display());
                print!("{}", content);
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            Config::default().save_to(&path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }

    Ok(())
}
