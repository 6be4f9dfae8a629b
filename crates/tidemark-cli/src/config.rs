//! CLI configuration
//!
//! Settings come from three layers: the TOML config file, `TIDEMARK_*`
//! environment variables and command line flags. Flags and env vars are
//! parsed together by clap and win over the file.

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::OutputFormat;
use crate::Cli;

/// Storage backend for both the state and the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Redb,
    Sqlite,
}

impl Backend {
    /// Database file name inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Backend::Redb => "tidemark.redb",
            Backend::Sqlite => "tidemark.db",
        }
    }
}

/// Get default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidemark")
        .join("config.toml")
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tidemark")
}

/// Config file in use: `--config` if given, the default path otherwise
pub fn config_file_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(default_config_path)
}

/// Contents of the config file; unset keys fall back to defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrations_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_reversible: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Config {
    /// Load the config file; a missing file is an empty config
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// The config written by `config init`
    pub fn starter() -> Self {
        Self {
            migrations_dir: Some(PathBuf::from("migrations")),
            data_dir: Some(default_data_dir()),
            backend: Some("redb".to_string()),
            step_timeout_secs: None,
            verify_reversible: Some(false),
            format: Some("table".to_string()),
        }
    }

    pub fn keys() -> &'static [&'static str] {
        &[
            "migrations_dir",
            "data_dir",
            "backend",
            "step_timeout_secs",
            "verify_reversible",
            "format",
        ]
    }

    /// Value of `key`, `Ok(None)` when the key is valid but unset
    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let value = match key {
            "migrations_dir" => self.migrations_dir.as_ref().map(|p| p.display().to_string()),
            "data_dir" => self.data_dir.as_ref().map(|p| p.display().to_string()),
            "backend" => self.backend.clone(),
            "step_timeout_secs" => self.step_timeout_secs.map(|s| s.to_string()),
            "verify_reversible" => self.verify_reversible.map(|v| v.to_string()),
            "format" => self.format.clone(),
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        };
        Ok(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "migrations_dir" => self.migrations_dir = Some(PathBuf::from(value)),
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "backend" => {
                parse_backend(value)?;
                self.backend = Some(value.to_lowercase());
            }
            "step_timeout_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("step_timeout_secs must be a number, got {}", value))?;
                self.step_timeout_secs = Some(secs);
            }
            "verify_reversible" => {
                let flag: bool = value
                    .parse()
                    .with_context(|| format!("verify_reversible must be true or false, got {}", value))?;
                self.verify_reversible = Some(flag);
            }
            "format" => {
                parse_format(value)?;
                self.format = Some(value.to_lowercase());
            }
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}

fn parse_backend(value: &str) -> anyhow::Result<Backend> {
    Backend::from_str(value, true).map_err(|_| anyhow::anyhow!("Unknown backend: {}", value))
}

fn parse_format(value: &str) -> anyhow::Result<OutputFormat> {
    OutputFormat::from_str(value, true)
        .map_err(|_| anyhow::anyhow!("Unknown output format: {}", value))
}

/// Effective settings after merging flags, env vars and the config file
#[derive(Debug, Clone)]
pub struct Settings {
    pub migrations_dir: PathBuf,
    pub data_dir: PathBuf,
    pub backend: Backend,
    pub step_timeout: Option<Duration>,
    pub verify_reversible: bool,
    pub format: OutputFormat,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let backend = match (cli.backend, &config.backend) {
            (Some(backend), _) => backend,
            (None, Some(name)) => parse_backend(name)?,
            (None, None) => Backend::Redb,
        };

        let format = match (cli.format, &config.format) {
            (Some(format), _) => format,
            (None, Some(name)) => parse_format(name)?,
            (None, None) => OutputFormat::Table,
        };

        let step_timeout = cli
            .step_timeout
            .or(config.step_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Ok(Self {
            migrations_dir: cli
                .migrations
                .clone()
                .or_else(|| config.migrations_dir.clone())
                .unwrap_or_else(|| PathBuf::from("migrations")),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| config.data_dir.clone())
                .unwrap_or_else(default_data_dir),
            backend,
            step_timeout,
            verify_reversible: cli.verify_reversible || config.verify_reversible.unwrap_or(false),
            format,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(self.backend.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_config_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("backend", "SQLite").unwrap();
        config.set("step_timeout_secs", "30").unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.get("backend").unwrap().as_deref(), Some("sqlite"));
        assert_eq!(loaded.get("step_timeout_secs").unwrap().as_deref(), Some("30"));
        assert_eq!(loaded.get("format").unwrap(), None);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("backend", "postgres").is_err());
        assert!(config.set("verify_reversible", "maybe").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert!(config.get("colour").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "tidemark",
            "--backend",
            "sqlite",
            "--data-dir",
            "/tmp/flags",
            "migrate",
            "status",
        ]);
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/config")),
            backend: Some("redb".to_string()),
            step_timeout_secs: Some(5),
            ..Default::default()
        };

        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(settings.backend, Backend::Sqlite);
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/flags"));
        assert_eq!(settings.step_timeout, Some(Duration::from_secs(5)));
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/flags/tidemark.db"));
    }
}
