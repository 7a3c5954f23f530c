//! Closure-backed units.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::unit::Migration;
use std::fmt;
use std::sync::Arc;

type Step = Arc<dyn Fn(&mut MigrationContext<'_>) -> Result<(), MigrationError> + Send + Sync>;

/// Unit whose steps are plain closures.
#[derive(Clone)]
pub struct FnMigration {
    up: Step,
    down: Option<Step>,
    transactional: bool,
}

impl FnMigration {
    /// Unit running `up` on upgrade.
    pub fn new<F>(up: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> Result<(), MigrationError> + Send + Sync + 'static,
    {
        Self {
            up: Arc::new(up),
            down: None,
            transactional: false,
        }
    }

    /// Inverse step.
    pub fn with_down<F>(mut self, down: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> Result<(), MigrationError> + Send + Sync + 'static,
    {
        self.down = Some(Arc::new(down));
        self
    }

    /// Wrap each direction in a transaction.
    pub fn with_transaction(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }
}

impl Migration for FnMigration {
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        (self.up)(ctx)
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        match &self.down {
            Some(down) => down(ctx),
            None => Err(MigrationError::downgrade_unsupported(
                "migration does not define an inverse",
            )),
        }
    }

    fn transactional(&self) -> bool {
        self.transactional
    }
}

impl fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMigration")
            .field("reversible", &self.down.is_some())
            .field("transactional", &self.transactional)
            .finish()
    }
}
