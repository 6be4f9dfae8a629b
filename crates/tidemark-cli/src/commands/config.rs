//! Config command for managing the config file

use clap::{Args, Subcommand};
use std::path::Path;

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a config value
    Get {
        /// Config key name
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key name
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Show config file path
    Path,
    /// Write a starter config file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(args: &ConfigArgs, path: &Path) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Get { key } => {
            let config = Config::load(path)?;
            match config.get(key)? {
                Some(value) => println!("{}", value),
                None => println!("(not set)"),
            }
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load(path)?;
            config.set(key, value)?;
            config.save(path)?;
            tracing::info!("Updated {} in {}", key, path.display());
            println!("Set {} = {}", key, value);
        }
        ConfigCommands::List => {
            let config = Config::load(path)?;
            println!("Config file: {}", path.display());
            println!();
            for key in Config::keys() {
                let value = config.get(key)?.unwrap_or_else(|| "(not set)".to_string());
                println!("{} = {}", key, value);
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Config::starter().save(path)?;
            println!("Created config file at {}", path.display());
        }
    }
    Ok(())
}
