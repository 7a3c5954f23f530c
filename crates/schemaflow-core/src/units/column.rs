//! Guarded column changes.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::executor::{ColumnDef, SchemaChange};
use crate::unit::Migration;

/// How a unit treats expected state that is already gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Missing expected state fails with `PreconditionFailed`.
    #[default]
    Strict,
    /// State that already matches the target counts as done.
    Lenient,
}

/// Adds a column unless it already exists; `down` drops it if present.
#[derive(Debug, Clone, PartialEq)]
pub struct AddColumnIfMissing {
    table: String,
    column: ColumnDef,
}

impl AddColumnIfMissing {
    /// Add `column` to `table`.
    pub fn new(table: impl Into<String>, column: ColumnDef) -> Self {
        Self {
            table: table.into(),
            column,
        }
    }
}

impl Migration for AddColumnIfMissing {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        if !ctx.has_table(&self.table)? {
            return Err(MigrationError::precondition(format!(
                "table {} does not exist",
                self.table
            )));
        }
        if ctx.has_column(&self.table, &self.column.name)? {
            tracing::debug!(table = %self.table, column = %self.column.name, "column already present");
            return Ok(());
        }
        ctx.alter(SchemaChange::AddColumn {
            table: self.table.clone(),
            column: self.column.clone(),
        })
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        if !ctx.has_column(&self.table, &self.column.name)? {
            return Ok(());
        }
        ctx.alter(SchemaChange::DropColumn {
            table: self.table.clone(),
            column: self.column.name.clone(),
        })
    }
}

/// Renames a column.
///
/// Strict by default: a missing source column fails. With
/// [`Strictness::Lenient`], a missing source column is accepted when the
/// target column already exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameColumn {
    table: String,
    from: String,
    to: String,
    strictness: Strictness,
}

impl RenameColumn {
    /// Rename `table.from` to `table.to`.
    pub fn new(table: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            from: from.into(),
            to: to.into(),
            strictness: Strictness::Strict,
        }
    }

    /// Set how already-renamed columns are treated.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    fn rename(
        &self,
        ctx: &mut MigrationContext<'_>,
        from: &str,
        to: &str,
    ) -> Result<(), MigrationError> {
        if ctx.has_column(&self.table, from)? {
            if ctx.has_column(&self.table, to)? {
                return Err(MigrationError::precondition(format!(
                    "cannot rename {table}.{from}: {table}.{to} already exists",
                    table = self.table
                )));
            }
            return ctx.alter(SchemaChange::RenameColumn {
                table: self.table.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if self.strictness == Strictness::Lenient && ctx.has_column(&self.table, to)? {
            ctx.log(&format!(
                "Column {}.{} already renamed to {}",
                self.table, from, to
            ));
            return Ok(());
        }

        Err(MigrationError::precondition(format!(
            "column {}.{} does not exist",
            self.table, from
        )))
    }
}

impl Migration for RenameColumn {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.rename(ctx, &self.from, &self.to)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.rename(ctx, &self.to, &self.from)
    }
}
