//! CLI error type.

use schemaflow_core::{ExecutorError, LedgerError, MigrationError};
use thiserror::Error;

/// Errors surfaced by the `schemaflow` command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("database: {0}")]
    Executor(#[from] ExecutorError),

    #[error("unknown application variant '{0}' (expected ojs, omp or ops)")]
    UnknownApp(String),

    #[error("no migrations are registered in {0}")]
    NoMigrations(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Operator hint for errors that need manual follow-up.
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::Migration(MigrationError::UnitFailed {
                fallback: Some(fallback),
                ..
            }) => Some(format!(
                "the database is recorded at fallback version {fallback}; fix the failing migration and re-run upgrade"
            )),
            CliError::Migration(MigrationError::UnitFailed { .. }) => {
                Some("fix the failing migration and re-run; applied migrations are skipped".to_string())
            }
            CliError::Migration(MigrationError::IndeterminateState { .. }) => Some(
                "inspect the database, then run `schemaflow resolve --applied` or `--not-applied`"
                    .to_string(),
            ),
            _ => None,
        }
    }
}
