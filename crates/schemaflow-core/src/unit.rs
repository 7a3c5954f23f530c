//! Migration unit contract.

use crate::context::{Attributes, MigrationContext};
use crate::error::MigrationError;
use std::sync::Arc;

/// One forward transformation and its optional inverse.
///
/// Units are built fresh for every run by a [`MigrationFactory`] and dropped
/// afterwards; only their version reaches the ledger.
///
/// Multi-step units run their steps in a fixed order and guard each
/// structural step with a state check (`has_column`, `has_table`) where a
/// partial earlier attempt could have left it done. Expected state that is
/// absent must be reported as [`MigrationError::PreconditionFailed`] unless
/// the unit explicitly opts into lenient handling.
pub trait Migration {
    /// Apply the forward transformation.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError>;

    /// Apply the inverse.
    ///
    /// The default refuses: a unit has to opt into being reversible.
    fn down(&self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        Err(MigrationError::downgrade_unsupported(
            "migration does not define an inverse",
        ))
    }

    /// Whether the runner should wrap `up`/`down` in one transaction.
    ///
    /// Leave this off for units that mix DDL with DML on engines where DDL
    /// commits implicitly.
    fn transactional(&self) -> bool {
        false
    }
}

/// Builds a unit for one run from the run attributes.
pub type MigrationFactory = Arc<dyn Fn(&Attributes) -> Box<dyn Migration> + Send + Sync>;

/// Wrap a constructor closure as a [`MigrationFactory`].
pub fn factory<M, F>(build: F) -> MigrationFactory
where
    M: Migration + 'static,
    F: Fn(&Attributes) -> M + Send + Sync + 'static,
{
    Arc::new(move |attributes| Box::new(build(attributes)) as Box<dyn Migration>)
}

/// Factory that hands out clones of a prototype unit.
pub fn cloned<M>(prototype: M) -> MigrationFactory
where
    M: Migration + Clone + Send + Sync + 'static,
{
    Arc::new(move |_| Box::new(prototype.clone()) as Box<dyn Migration>)
}
