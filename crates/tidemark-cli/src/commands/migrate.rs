//! Migrate commands
//!
//! Exit codes: 0 success or in sync, 1 pending work or drift (`status`),
//! 2 execution failure, 3 partial failure that needs manual recovery.

use clap::{Args, Subcommand, ValueEnum};
use serde_json::json;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

use crate::output::{columns, print_json, OutputFormat};
use crate::{AppContext, EXIT_FAILURE};
use tidemark_core::{Direction, ManifestDir, MigrationKey, MigrationPlan, Registry};
use tidemark_engine::{Executor, ExecutorConfig, RunReport, RunState, Runner, StatusReport, Target};

const EXIT_PENDING: u8 = 1;
const EXIT_PARTIAL: u8 = 3;

#[derive(Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub command: MigrateCommands,
}

#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Apply pending migrations
    Up(UpArgs),
    /// Revert applied migrations (the last one by default)
    Down(DownArgs),
    /// Move up or down until <key> is the last applied migration
    Goto {
        /// Migration key or bare timestamp
        key: String,
    },
    /// Show applied and pending migrations
    Status,
    /// Print the plan for a command without running it
    Plan {
        #[command(subcommand)]
        target: Option<PlanTarget>,
    },
    /// Record a step the target store committed but the state store missed
    Resolve {
        /// Migration key or bare timestamp
        key: String,
        /// Direction of the committed step
        #[arg(long, value_enum)]
        direction: DirectionArg,
    },
}

impl MigrateCommands {
    /// Whether the command writes to either store
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            MigrateCommands::Up(_)
                | MigrateCommands::Down(_)
                | MigrateCommands::Goto { .. }
                | MigrateCommands::Resolve { .. }
        )
    }
}

#[derive(Args, Clone)]
pub struct UpArgs {
    /// Stop after this migration
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Clone)]
pub struct DownArgs {
    /// Revert down to this migration; it stays applied
    #[arg(long, conflicts_with_all = ["steps", "all"])]
    pub to: Option<String>,

    /// Number of migrations to revert
    #[arg(long, conflicts_with = "all")]
    pub steps: Option<usize>,

    /// Revert every applied migration
    #[arg(long)]
    pub all: bool,
}

#[derive(Subcommand, Clone)]
pub enum PlanTarget {
    /// Plan `migrate up`
    Up(UpArgs),
    /// Plan `migrate down`
    Down(DownArgs),
    /// Plan `migrate goto`
    Goto { key: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Up,
    Down,
}

impl From<DirectionArg> for Direction {
    fn from(d: DirectionArg) -> Self {
        match d {
            DirectionArg::Up => Direction::Up,
            DirectionArg::Down => Direction::Down,
        }
    }
}

pub async fn run(args: &MigrateArgs, ctx: &AppContext) -> anyhow::Result<ExitCode> {
    let settings = &ctx.settings;
    tracing::debug!("Loading migrations from {}", settings.migrations_dir.display());

    let registry = Registry::load(&ManifestDir::new(&settings.migrations_dir))?;
    tracing::info!("Loaded {} migration(s)", registry.len());

    let executor =
        Executor::new(ctx.target.clone(), ctx.state.clone()).with_config(ExecutorConfig {
            step_timeout: settings.step_timeout,
            verify_reversible: settings.verify_reversible,
        });
    let mut runner = Runner::new(registry, executor);
    let format = settings.format;

    match &args.command {
        MigrateCommands::Up(up) => {
            let target = up_target(runner.registry(), up)?;
            execute(&mut runner, target, format).await
        }
        MigrateCommands::Down(down) => {
            let target = down_target(runner.registry(), down)?;
            execute(&mut runner, target, format).await
        }
        MigrateCommands::Goto { key } => {
            let key = resolve_key(runner.registry(), key)?;
            execute(&mut runner, Target::Version(key), format).await
        }
        MigrateCommands::Status => {
            let status = runner.status().await?;
            print_status(&status, format)?;
            Ok(if status.in_sync() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_PENDING)
            })
        }
        MigrateCommands::Plan { target } => {
            let target = match target {
                None => Target::Latest,
                Some(PlanTarget::Up(up)) => up_target(runner.registry(), up)?,
                Some(PlanTarget::Down(down)) => down_target(runner.registry(), down)?,
                Some(PlanTarget::Goto { key }) => {
                    Target::Version(resolve_key(runner.registry(), key)?)
                }
            };
            let plan = runner.plan(&target).await?;
            print_plan(&runner, &plan, format)?;
            Ok(ExitCode::SUCCESS)
        }
        MigrateCommands::Resolve { key, direction } => {
            let key = resolve_key(runner.registry(), key)?;
            let direction = Direction::from(*direction);
            runner.resolve(&key, direction).await?;
            match format {
                OutputFormat::Json => {
                    print_json(&json!({ "resolved": key, "direction": direction }))?
                }
                OutputFormat::Table => println!("Recorded {} {}", direction, key),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_key(registry: &Registry, reference: &str) -> anyhow::Result<MigrationKey> {
    Ok(registry.resolve(reference)?.clone())
}

fn up_target(registry: &Registry, args: &UpArgs) -> anyhow::Result<Target> {
    Ok(match &args.to {
        Some(key) => Target::UpTo(resolve_key(registry, key)?),
        None => Target::Latest,
    })
}

fn down_target(registry: &Registry, args: &DownArgs) -> anyhow::Result<Target> {
    Ok(match (&args.to, args.steps, args.all) {
        (Some(key), _, _) => Target::DownTo(resolve_key(registry, key)?),
        (None, _, true) => Target::Zero,
        (None, Some(steps), false) => Target::DownSteps(steps),
        (None, None, false) => Target::DownSteps(1),
    })
}

async fn execute(
    runner: &mut Runner,
    target: Target,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let report = runner.run(&target, &cancel).await;
    watcher.abort();
    let report = report?;

    print_report(&report, format)?;

    Ok(match report.state {
        RunState::Succeeded => ExitCode::SUCCESS,
        RunState::PartiallyFailed => ExitCode::from(EXIT_PARTIAL),
        _ => ExitCode::from(EXIT_FAILURE),
    })
}

fn print_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let failure = report.failure.as_ref().map(|f| {
            json!({
                "key": f.key,
                "error": f.error.to_string(),
                "partial": f.error.is_partial(),
            })
        });
        return print_json(&json!({
            "state": report.state,
            "plan": report.plan,
            "completed": report.completed,
            "skipped": report.skipped(),
            "failure": failure,
            "last_applied": report.last_applied,
        }));
    }

    if report.plan.is_empty() {
        println!("Nothing to do");
    }

    let direction = report.plan.direction().unwrap_or(Direction::Up);
    for key in &report.completed {
        let verb = match direction {
            Direction::Up => "Applied",
            Direction::Down => "Reverted",
        };
        println!("{}  {}", verb, key);
    }

    if let Some(failure) = &report.failure {
        eprintln!("Failed at {}: {}", failure.key, failure.error);
        let skipped = report.skipped();
        if !skipped.is_empty() {
            eprintln!("Not attempted: {} migration(s)", skipped.len());
        }
        if failure.error.is_partial() {
            eprintln!(
                "Manual recovery required: check the target store, then run \
                 `tidemark migrate resolve {} --direction {}`",
                failure.key, direction
            );
        }
    }

    match &report.last_applied {
        Some(key) => println!("Current version: {}", key),
        None => println!("Current version: (none)"),
    }
    Ok(())
}

fn print_status(status: &StatusReport, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let mut value = serde_json::to_value(status)?;
        value["in_sync"] = json!(status.in_sync());
        return print_json(&value);
    }

    println!("Applied ({}):", status.applied.len());
    let rows: Vec<Vec<String>> = status
        .applied
        .iter()
        .map(|r| {
            vec![
                r.key.to_string(),
                r.applied_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                r.name.clone(),
            ]
        })
        .collect();
    for line in columns(&rows) {
        println!("  {}", line);
    }

    println!("Pending ({}):", status.pending.len());
    let rows: Vec<Vec<String>> = status
        .pending
        .iter()
        .map(|p| vec![p.key.to_string(), p.name.clone()])
        .collect();
    for line in columns(&rows) {
        println!("  {}", line);
    }

    match &status.head {
        Some(head) => println!("Current version: {}", head),
        None => println!("Current version: (none)"),
    }

    if let Some(drift) = &status.drift {
        println!();
        println!("Drift: {}", drift);
    }
    Ok(())
}

fn print_plan(runner: &Runner, plan: &MigrationPlan, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(plan);
    }

    if plan.is_empty() {
        println!("Nothing to do");
        return Ok(());
    }

    println!("Plan ({} step(s)):", plan.len());
    for step in &plan.steps {
        println!("  {:<4}  {}  {}", step.direction.as_str(), step.key, step.name);
        if let Some(record) = runner.registry().get(&step.key) {
            for line in record.operation(step.direction).describe() {
                println!("          - {}", line);
            }
        }
    }
    Ok(())
}
