//! Context setting renames.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::executor::Value;
use crate::unit::Migration;
use crate::units::Strictness;

/// Renames a setting in the variant's context settings table.
///
/// Table and column names come from the run's `VariantConfig`, so one unit
/// serves every application variant. The settings table is expected to have
/// a `setting_name` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameContextSetting {
    from: String,
    to: String,
    strictness: Strictness,
}

impl RenameContextSetting {
    /// Rename setting `from` to `to`.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            strictness: Strictness::Lenient,
        }
    }

    /// Fail when no row carries the source name.
    ///
    /// Lenient by default: a deployment that never stored the setting has
    /// nothing to rename.
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
        let table = ctx.variant().context_settings_table.clone();
        if !ctx.has_table(&table)? {
            return Err(MigrationError::precondition(format!(
                "settings table {} does not exist",
                table
            )));
        }

        let sql = format!("UPDATE {} SET setting_name = ? WHERE setting_name = ?", table);
        let updated = ctx
            .execute(&sql, &[Value::from(to), Value::from(from)])?
            .rows_affected;

        if updated == 0 && self.strictness == Strictness::Strict {
            return Err(MigrationError::precondition(format!(
                "no {} rows with setting_name {}",
                table, from
            )));
        }

        ctx.log(&format!(
            "Renamed {} {} setting(s) from {} to {}",
            updated, table, from, to
        ));
        Ok(())
    }
}

impl Migration for RenameContextSetting {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.rename(ctx, &self.from, &self.to)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.rename(ctx, &self.to, &self.from)
    }

    fn transactional(&self) -> bool {
        true
    }
}
