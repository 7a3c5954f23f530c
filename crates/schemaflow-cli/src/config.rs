//! Command-line configuration.

use crate::error::CliError;
use crate::formatter::OutputFormat;
use clap::{ArgGroup, Parser, Subcommand};
use schemaflow_core::config::DEFAULT_BACKFILL_BATCH_SIZE;
use schemaflow_core::{MigrationVersion, RunnerConfig, VariantConfig};
use std::path::PathBuf;

/// Default ledger directory.
pub const DEFAULT_LEDGER_PATH: &str = "./schemaflow-ledger";

/// Default migrations directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

/// Default SQLite database file.
pub const DEFAULT_DATABASE_PATH: &str = "./app.db";

/// Resolved CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Runner settings.
    pub runner: RunnerConfig,
    /// Ledger database directory.
    pub ledger_path: PathBuf,
    /// SQLite database the migrations run against.
    pub database_path: PathBuf,
    /// Directory of SQL migration scripts.
    pub migrations_dir: PathBuf,
    /// Application variant.
    pub variant: VariantConfig,
    /// Active locale.
    pub locale: String,
    /// Root for relative paths moved by file units.
    pub files_root: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

impl CliConfig {
    /// Configuration with defaults.
    pub fn new() -> Self {
        Self {
            runner: RunnerConfig::default(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            variant: VariantConfig::default(),
            locale: "en".to_string(),
            files_root: PathBuf::from("."),
            format: OutputFormat::Table,
        }
    }

    /// Set the ledger directory.
    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = path.into();
        self
    }

    /// Set the database file.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the migrations directory.
    pub fn with_migrations_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.migrations_dir = path.into();
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the runner configuration.
    pub fn with_runner(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Schemaflow command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "schemaflow")]
#[command(version, about = "Sequential schema migrations with a durable version ledger", long_about = None)]
pub struct Args {
    /// Ledger database directory.
    #[arg(long, default_value = DEFAULT_LEDGER_PATH, global = true)]
    pub ledger: PathBuf,

    /// SQLite database to migrate.
    #[arg(long, default_value = DEFAULT_DATABASE_PATH, global = true)]
    pub db: PathBuf,

    /// Directory of SQL migration scripts.
    #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR, global = true)]
    pub dir: PathBuf,

    /// Application variant (ojs, omp, ops).
    #[arg(long, global = true)]
    pub app: Option<String>,

    /// Active locale for data backfills.
    #[arg(long, default_value = "en", global = true)]
    pub locale: String,

    /// Root for relative paths moved by file migrations.
    #[arg(long, default_value = ".", global = true)]
    pub files_root: PathBuf,

    /// Output format.
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,

    /// Plan only; do not touch the database or the ledger.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Refuse to run if the ledger records versions with no migration.
    #[arg(long, global = true)]
    pub strict_ledger: bool,

    /// Rows per batch for data backfills.
    #[arg(long, default_value_t = DEFAULT_BACKFILL_BATCH_SIZE, global = true)]
    pub batch_size: usize,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show applied versions and markers.
    Status,

    /// Show what an upgrade or downgrade would run.
    Plan {
        /// Exclusive lower bound for upgrades, inclusive start for downgrades.
        #[arg(long)]
        from: Option<MigrationVersion>,
        /// Inclusive target for upgrades, exclusive target for downgrades.
        #[arg(long)]
        to: Option<MigrationVersion>,
        /// Plan a downgrade instead.
        #[arg(long)]
        down: bool,
    },

    /// Apply pending migrations.
    Upgrade {
        /// Exclusive lower bound (default: the beginning).
        #[arg(long)]
        from: Option<MigrationVersion>,
        /// Inclusive target (default: the latest registered version).
        #[arg(long)]
        to: Option<MigrationVersion>,
        /// Version to record as the fallback if a migration fails.
        #[arg(long)]
        fallback: Option<MigrationVersion>,
    },

    /// Revert applied migrations, newest first.
    Downgrade {
        /// Inclusive start (default: the latest registered version).
        #[arg(long)]
        from: Option<MigrationVersion>,
        /// Exclusive target (default: revert everything).
        #[arg(long)]
        to: Option<MigrationVersion>,
    },

    /// Record a version as applied without running it.
    MarkApplied {
        /// Version to record.
        version: MigrationVersion,
    },

    /// Remove a version from the ledger without running its inverse.
    Forget {
        /// Version to remove.
        version: MigrationVersion,
    },

    /// Set the fallback marker.
    SetFallback {
        /// Fallback version.
        version: MigrationVersion,
    },

    /// Clear the fallback marker.
    ClearFallback,

    /// Settle a migration interrupted by a previous run.
    #[command(group(ArgGroup::new("verdict").required(true).args(["applied", "not_applied"])))]
    Resolve {
        /// The interrupted migration's changes are present in the database.
        #[arg(long)]
        applied: bool,
        /// The interrupted migration's changes are absent.
        #[arg(long)]
        not_applied: bool,
    },
}

impl Args {
    /// Convert command-line arguments to a configuration and command.
    pub fn into_config(self) -> Result<(CliConfig, Command), CliError> {
        let variant = match self.app.as_deref() {
            None => VariantConfig::default(),
            Some(app) => {
                VariantConfig::by_app(app).ok_or_else(|| CliError::UnknownApp(app.to_string()))?
            }
        };

        let runner = RunnerConfig::new()
            .with_dry_run(self.dry_run)
            .with_stop_on_unknown_applied(self.strict_ledger)
            .with_backfill_batch_size(self.batch_size);

        let config = CliConfig {
            runner,
            ledger_path: self.ledger,
            database_path: self.db,
            migrations_dir: self.dir,
            variant,
            locale: self.locale,
            files_root: self.files_root,
            format: self.format,
        };
        Ok((config, self.command))
    }
}
