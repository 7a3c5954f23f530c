//! Per-run context handed to every migration unit.

use crate::error::MigrationError;
use crate::executor::{Executor, RowSet, SchemaChange, Value};
use crate::files::{FileMover, FsFileMover};
use crate::log::{InstallLog, TracingInstallLog};
use crate::version::MigrationVersion;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cross-cutting parameters for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    fallback: Option<MigrationVersion>,
    values: BTreeMap<String, String>,
}

impl Attributes {
    /// Empty attributes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` as the fallback if a forward unit fails.
    pub fn with_fallback(mut self, version: MigrationVersion) -> Self {
        self.fallback = Some(version);
        self
    }

    /// Set a free-form attribute.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// The fallback version.
    pub fn fallback(&self) -> Option<&MigrationVersion> {
        self.fallback.as_ref()
    }

    /// Look up a free-form attribute.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Names that differ between application variants.
///
/// Generic units read table and column names from here instead of being
/// subclassed per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantConfig {
    /// Application identifier.
    pub app: String,
    /// Table holding one row per hosted context.
    pub context_table: String,
    /// Key/value settings table for contexts.
    pub context_settings_table: String,
    /// Primary key column of the context table.
    pub context_id_column: String,
}

impl VariantConfig {
    /// Build a variant from explicit names.
    pub fn new(
        app: impl Into<String>,
        context_table: impl Into<String>,
        context_settings_table: impl Into<String>,
        context_id_column: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            context_table: context_table.into(),
            context_settings_table: context_settings_table.into(),
            context_id_column: context_id_column.into(),
        }
    }

    /// Journal deployments.
    pub fn journal() -> Self {
        Self::new("ojs", "journals", "journal_settings", "journal_id")
    }

    /// Monograph press deployments.
    pub fn press() -> Self {
        Self::new("omp", "presses", "press_settings", "press_id")
    }

    /// Preprint server deployments.
    pub fn server() -> Self {
        Self::new("ops", "servers", "server_settings", "server_id")
    }

    /// Look up a built-in variant by application identifier.
    pub fn by_app(app: &str) -> Option<Self> {
        match app {
            "ojs" => Some(Self::journal()),
            "omp" => Some(Self::press()),
            "ops" => Some(Self::server()),
            _ => None,
        }
    }
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self::new("default", "contexts", "context_settings", "context_id")
    }
}

/// Everything a run passes to its units, built once per run.
#[derive(Clone)]
pub struct RunContext {
    /// Run attributes.
    pub attributes: Attributes,
    /// Application variant.
    pub variant: VariantConfig,
    /// Active locale for data backfills.
    pub locale: String,
    /// Installer-facing log.
    pub log: Arc<dyn InstallLog>,
    /// File mover for units that touch stored files.
    pub files: Arc<dyn FileMover>,
}

impl RunContext {
    /// Context with default variant, locale `en`, tracing log and a file
    /// mover rooted at the working directory.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            variant: VariantConfig::default(),
            locale: "en".to_string(),
            log: Arc::new(TracingInstallLog),
            files: Arc::new(FsFileMover::default()),
        }
    }

    /// Set the application variant.
    pub fn with_variant(mut self, variant: VariantConfig) -> Self {
        self.variant = variant;
        self
    }

    /// Set the active locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the install log sink.
    pub fn with_log(mut self, log: Arc<dyn InstallLog>) -> Self {
        self.log = log;
        self
    }

    /// Set the file mover.
    pub fn with_files(mut self, files: Arc<dyn FileMover>) -> Self {
        self.files = files;
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(Attributes::default())
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("attributes", &self.attributes)
            .field("variant", &self.variant)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

/// View of the run handed to a single unit invocation.
pub struct MigrationContext<'a> {
    executor: &'a mut dyn Executor,
    run: &'a RunContext,
    version: &'a MigrationVersion,
    batch_size: usize,
}

impl<'a> MigrationContext<'a> {
    /// Create a context for one unit.
    pub fn new(
        executor: &'a mut dyn Executor,
        run: &'a RunContext,
        version: &'a MigrationVersion,
        batch_size: usize,
    ) -> Self {
        Self {
            executor,
            run,
            version,
            batch_size: batch_size.max(1),
        }
    }

    /// Version of the unit being run.
    pub fn version(&self) -> &MigrationVersion {
        self.version
    }

    /// Raw executor access.
    pub fn executor(&mut self) -> &mut dyn Executor {
        &mut *self.executor
    }

    /// Run attributes.
    pub fn attributes(&self) -> &Attributes {
        &self.run.attributes
    }

    /// Application variant.
    pub fn variant(&self) -> &VariantConfig {
        &self.run.variant
    }

    /// Active locale.
    pub fn locale(&self) -> &str {
        &self.run.locale
    }

    /// File mover.
    pub fn files(&self) -> &dyn FileMover {
        self.run.files.as_ref()
    }

    /// Upper bound on rows per batch for bulk rewrites.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Append to the install log.
    pub fn log(&self, message: &str) {
        self.run.log.log(message);
    }

    /// Run a statement.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, MigrationError> {
        Ok(self.executor.execute(sql, params)?)
    }

    /// Apply a structural change.
    pub fn alter(&mut self, change: SchemaChange) -> Result<(), MigrationError> {
        Ok(self.executor.alter_schema(&change)?)
    }

    /// Whether a table exists.
    pub fn has_table(&mut self, table: &str) -> Result<bool, MigrationError> {
        Ok(self.executor.has_table(table)?)
    }

    /// Whether a column exists.
    pub fn has_column(&mut self, table: &str, column: &str) -> Result<bool, MigrationError> {
        Ok(self.executor.has_column(table, column)?)
    }

    /// Run `work` inside a transaction, committing on success and rolling
    /// back on error.
    pub fn transaction<T>(
        &mut self,
        work: impl FnOnce(&mut Self) -> Result<T, MigrationError>,
    ) -> Result<T, MigrationError> {
        self.executor.begin()?;
        match work(self) {
            Ok(value) => {
                self.executor.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.executor.rollback() {
                    tracing::error!(
                        version = %self.version,
                        error = %rollback_err,
                        "rollback failed after unit error"
                    );
                }
                Err(err)
            }
        }
    }
}
