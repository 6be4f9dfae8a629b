//! Tidemark CLI - Command line interface for schema migrations

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod lock;
mod output;

use commands::{completions, migrate, schema};
use config::{config_file_path, Backend, Config, Settings};
use lock::RunLock;
use output::OutputFormat;
use tidemark_storage::{StateStore, TargetStore};

/// Exit code for execution failures and anything that stops a command early
pub const EXIT_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(author, version, about = "Versioned schema migrations")]
pub struct Cli {
    /// Config file (default: <config dir>/tidemark/config.toml)
    #[arg(short, long, global = true, env = "TIDEMARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding <timestamp>_<slug>.json migration files
    #[arg(short, long, global = true, env = "TIDEMARK_MIGRATIONS")]
    pub migrations: Option<PathBuf>,

    /// Data directory for the state and target stores
    #[arg(short, long, global = true, env = "TIDEMARK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Storage backend
    #[arg(long, value_enum, global = true, env = "TIDEMARK_BACKEND")]
    pub backend: Option<Backend>,

    /// Per-step deadline in seconds (0 disables it)
    #[arg(long, global = true, env = "TIDEMARK_STEP_TIMEOUT")]
    pub step_timeout: Option<u64>,

    /// Check that down(up(schema)) restores the schema before committing
    #[arg(long, global = true, env = "TIDEMARK_VERIFY_REVERSIBLE")]
    pub verify_reversible: bool,

    /// Output format
    #[arg(short, long, value_enum, global = true, env = "TIDEMARK_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan, apply and revert migrations
    Migrate(migrate::MigrateArgs),
    /// Print the current target schema
    Schema,
    /// Manage the config file
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the resolved settings and open stores
pub struct AppContext {
    pub settings: Settings,
    pub target: Arc<dyn TargetStore>,
    pub state: Arc<dyn StateStore>,
    _lock: Option<RunLock>,
}

impl AppContext {
    /// Open the stores; `exclusive` takes the run lock first
    pub fn open(settings: Settings, exclusive: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&settings.data_dir)?;

        let lock = if exclusive {
            Some(RunLock::acquire(&settings.data_dir)?)
        } else {
            None
        };

        let db_path = settings.database_path();
        tracing::debug!("Using database at: {:?}", db_path);

        let (target, state) = open_stores(settings.backend, &db_path)?;

        Ok(Self {
            settings,
            target,
            state,
            _lock: lock,
        })
    }
}

type Stores = (Arc<dyn TargetStore>, Arc<dyn StateStore>);

fn open_stores(backend: Backend, path: &std::path::Path) -> anyhow::Result<Stores> {
    match backend {
        #[cfg(feature = "redb")]
        Backend::Redb => {
            let store = Arc::new(tidemark_storage::RedbStore::open(path)?);
            let target: Arc<dyn TargetStore> = store.clone();
            let state: Arc<dyn StateStore> = store;
            Ok((target, state))
        }
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            let store = Arc::new(tidemark_storage::SqliteStore::open(path)?);
            let target: Arc<dyn TargetStore> = store.clone();
            let state: Arc<dyn StateStore> = store;
            Ok((target, state))
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!(
            "tidemark was built without the {:?} backend (path {})",
            other,
            path.display()
        ),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting tidemark CLI");

    match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config_path = config_file_path(cli);

    match &cli.command {
        Commands::Config(args) => {
            commands::config::run(args, &config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions(args) => {
            completions::run(args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema => {
            let settings = Settings::resolve(cli, &Config::load(&config_path)?)?;
            let ctx = AppContext::open(settings, false)?;
            schema::run(&ctx).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Migrate(args) => {
            let settings = Settings::resolve(cli, &Config::load(&config_path)?)?;
            let ctx = AppContext::open(settings, args.command.is_mutating())?;
            migrate::run(args, &ctx).await
        }
    }
}
