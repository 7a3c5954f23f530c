//! Command execution.

use crate::config::{CliConfig, Command};
use crate::error::CliError;
use crate::formatter::{create_formatter, PlanReport, StatusReport};
use schemaflow_core::{
    Attributes, Direction, FsFileMover, Ledger, MigrationRunner, MigrationVersion, Registry,
    Resolution, RunContext, SledLedger, SqlDirectorySource, SqliteExecutor, TracingInstallLog,
};
use std::sync::Arc;

type Runner = MigrationRunner<SqliteExecutor, SledLedger>;

/// Execute a command and return its formatted output.
pub fn execute(config: &CliConfig, command: Command) -> Result<String, CliError> {
    let formatter = create_formatter(config.format);

    match command {
        Command::Status => {
            let ledger = SledLedger::open_path(&config.ledger_path)?;
            let report = StatusReport {
                applied: ledger.entries()?,
                fallback_version: ledger.fallback()?,
                in_flight: ledger.in_flight()?,
            };
            Ok(formatter.format_status(&report))
        }

        Command::Plan { from, to, down } => {
            let runner = open_runner(config)?;
            let report = if down {
                let from = upper_bound(&runner, from, config)?;
                PlanReport {
                    direction: Direction::Down,
                    versions: runner.plan_downgrade(&from, to.as_ref())?,
                }
            } else {
                let to = upper_bound(&runner, to, config)?;
                PlanReport {
                    direction: Direction::Up,
                    versions: runner.plan_upgrade(from.as_ref(), &to)?,
                }
            };
            Ok(formatter.format_plan(&report))
        }

        Command::Upgrade { from, to, fallback } => {
            let mut runner = open_runner(config)?;
            let to = upper_bound(&runner, to, config)?;
            let mut attributes = Attributes::new().with("app", config.variant.app.clone());
            if let Some(fallback) = fallback {
                attributes = attributes.with_fallback(fallback);
            }
            let summary = runner.run_upgrade(from.as_ref(), &to, &run_context(config, attributes))?;
            Ok(formatter.format_summary(&summary))
        }

        Command::Downgrade { from, to } => {
            let mut runner = open_runner(config)?;
            let from = upper_bound(&runner, from, config)?;
            let attributes = Attributes::new().with("app", config.variant.app.clone());
            let summary =
                runner.run_downgrade(&from, to.as_ref(), &run_context(config, attributes))?;
            Ok(formatter.format_summary(&summary))
        }

        Command::MarkApplied { version } => {
            open_runner(config)?.mark_applied(&version)?;
            Ok(formatter.format_message(&format!("Marked {} as applied", version)))
        }

        Command::Forget { version } => {
            open_runner(config)?.forget(&version)?;
            Ok(formatter.format_message(&format!("Removed {} from the ledger", version)))
        }

        Command::SetFallback { version } => {
            open_runner(config)?.set_fallback(&version)?;
            Ok(formatter.format_message(&format!("Fallback version set to {}", version)))
        }

        Command::ClearFallback => {
            open_runner(config)?.clear_fallback()?;
            Ok(formatter.format_message("Fallback version cleared"))
        }

        Command::Resolve { applied, .. } => {
            let resolution = if applied {
                Resolution::Applied
            } else {
                Resolution::NotApplied
            };
            let message = match open_runner(config)?.resolve_in_flight(resolution)? {
                Some(marker) => format!(
                    "Resolved interrupted {} of {} as {}",
                    marker.direction,
                    marker.version,
                    if applied { "applied" } else { "not applied" }
                ),
                None => "No interrupted migration to resolve".to_string(),
            };
            Ok(formatter.format_message(&message))
        }
    }
}

fn load_registry(config: &CliConfig) -> Result<Registry, CliError> {
    let builder = Registry::builder();
    let builder = if config.migrations_dir.is_dir() {
        SqlDirectorySource::new(&config.migrations_dir).register(builder)?
    } else {
        tracing::warn!(
            dir = %config.migrations_dir.display(),
            "migrations directory not found, using an empty registry"
        );
        builder
    };
    Ok(builder.build()?)
}

fn open_runner(config: &CliConfig) -> Result<Runner, CliError> {
    let registry = load_registry(config)?;
    let ledger = SledLedger::open_path(&config.ledger_path)?;
    let executor = SqliteExecutor::open(&config.database_path)?;

    tracing::debug!(
        migrations = registry.len(),
        ledger = %config.ledger_path.display(),
        database = %config.database_path.display(),
        "runner opened"
    );
    Ok(MigrationRunner::new(registry, executor, ledger, config.runner.clone()))
}

fn upper_bound(
    runner: &Runner,
    requested: Option<MigrationVersion>,
    config: &CliConfig,
) -> Result<MigrationVersion, CliError> {
    match requested {
        Some(version) => Ok(version),
        None => runner
            .registry()
            .latest()
            .cloned()
            .ok_or_else(|| CliError::NoMigrations(config.migrations_dir.display().to_string())),
    }
}

fn run_context(config: &CliConfig, attributes: Attributes) -> RunContext {
    RunContext::new(attributes)
        .with_variant(config.variant.clone())
        .with_locale(config.locale.clone())
        .with_log(Arc::new(TracingInstallLog))
        .with_files(Arc::new(FsFileMover::new(&config.files_root)))
}
