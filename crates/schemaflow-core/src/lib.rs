//! Schemaflow Core - sequential schema migration engine.
//!
//! A [`Registry`] turns versioned unit definitions into an ordered plan, a
//! [`MigrationRunner`] applies or reverts that plan one unit at a time
//! through an [`Executor`], and a [`Ledger`] durably records which versions
//! are applied, the fallback version after a failed upgrade, and the unit
//! currently in flight.

pub mod backfill;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod files;
pub mod ledger;
pub mod log;
pub mod registry;
pub mod runner;
pub mod source;
pub mod unit;
pub mod units;
pub mod version;

pub use backfill::{run_batched, BackfillReport, KeysetQuery};
pub use config::RunnerConfig;
pub use context::{Attributes, MigrationContext, RunContext, VariantConfig};
pub use error::{Direction, MigrationError};
pub use executor::{
    ColumnDef, ColumnType, Executor, ExecutorError, ExecutorErrorKind, RowSet, SchemaChange,
    Value,
};
pub use files::{FileMover, FsFileMover};
pub use ledger::{InFlight, Ledger, LedgerEntry, LedgerError, LedgerStatus, MemoryLedger, SledLedger};
pub use log::{InstallLog, MemoryInstallLog, NullInstallLog, TracingInstallLog};
pub use registry::{MigrationDescriptor, Registry, RegistryBuilder, ResolvedMigration, UnitTarget};
pub use runner::{MigrationRunner, Resolution, RunState, RunSummary};
pub use source::SqlDirectorySource;
pub use unit::{cloned, factory, Migration, MigrationFactory};
pub use units::{
    AddColumnIfMissing, FnMigration, RenameColumn, RenameContextSetting, RenameDirectory,
    SqlMigration, Strictness,
};
pub use version::{MigrationVersion, VersionError};

#[cfg(feature = "sqlite")]
pub use executor::SqliteExecutor;
