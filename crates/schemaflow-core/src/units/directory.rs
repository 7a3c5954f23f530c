//! Stored-file directory moves.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::unit::Migration;
use crate::units::Strictness;
use std::path::{Path, PathBuf};

/// Moves a directory through the run's `FileMover`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDirectory {
    from: PathBuf,
    to: PathBuf,
    strictness: Strictness,
}

impl RenameDirectory {
    /// Move `from` to `to`. Relative paths resolve against the mover's root.
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            strictness: Strictness::Strict,
        }
    }

    /// Set how an already-moved directory is treated.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    fn relocate(
        &self,
        ctx: &mut MigrationContext<'_>,
        from: &Path,
        to: &Path,
    ) -> Result<(), MigrationError> {
        let files = ctx.files();
        let source_exists = files.exists(from);
        let target_exists = files.exists(to);

        match (source_exists, target_exists) {
            (true, false) => {
                files.rename(from, to)?;
                ctx.log(&format!("Moved {} to {}", from.display(), to.display()));
                Ok(())
            }
            (true, true) => Err(MigrationError::precondition(format!(
                "cannot move {}: {} already exists",
                from.display(),
                to.display()
            ))),
            (false, true) if self.strictness == Strictness::Lenient => {
                ctx.log(&format!("{} already moved to {}", from.display(), to.display()));
                Ok(())
            }
            (false, _) => Err(MigrationError::precondition(format!(
                "directory {} does not exist",
                from.display()
            ))),
        }
    }
}

impl Migration for RenameDirectory {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.relocate(ctx, &self.from, &self.to)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        self.relocate(ctx, &self.to, &self.from)
    }
}
