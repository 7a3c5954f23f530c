//! Engine error types.

use crate::executor::ExecutorError;
use crate::ledger::LedgerError;
use crate::version::{MigrationVersion, VersionError};
use serde::Serialize;
use thiserror::Error;

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward (`up`).
    Up,
    /// Inverse (`down`).
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "upgrade"),
            Direction::Down => write!(f, "downgrade"),
        }
    }
}

/// Migration engine errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The schema or data was not in the state the unit expects.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// What was expected.
        message: String,
    },

    /// The unit discarded information on the way up and cannot be inverted.
    #[error("downgrade unsupported: {reason}")]
    DowngradeUnsupported {
        /// Why the inverse is unavailable.
        reason: String,
    },

    /// The ledger already records this version.
    #[error("version {version} is already recorded in the ledger")]
    DuplicateVersion {
        /// The duplicated version.
        version: MigrationVersion,
    },

    /// The ledger does not record this version.
    #[error("version {version} is not recorded in the ledger")]
    NotFound {
        /// The missing version.
        version: MigrationVersion,
    },

    /// The executor reported a failure.
    #[error("executor failure: {0}")]
    ExecutorFailure(#[from] ExecutorError),

    /// An abstract unit has no concrete binding for this deployment.
    #[error("abstract migration {version} ({key}) has no concrete binding")]
    UnresolvedAbstractMigration {
        /// Version of the abstract unit.
        version: MigrationVersion,
        /// Binding key the unit asked for.
        key: String,
    },

    /// A unit failed; carries the unit identity around the underlying error.
    #[error("migration {version} failed during {direction}: {source}")]
    UnitFailed {
        /// Version of the failed unit.
        version: MigrationVersion,
        /// Direction of the run.
        direction: Direction,
        /// Fallback version recorded after the failure, if any.
        fallback: Option<MigrationVersion>,
        /// The unit's error.
        #[source]
        source: Box<MigrationError>,
    },

    /// A previous run died while this unit was executing.
    #[error(
        "migration {version} was interrupted by a previous run; verify the database and resolve the in-flight marker before resuming"
    )]
    IndeterminateState {
        /// Version that was in flight.
        version: MigrationVersion,
    },

    /// Registry definitions are inconsistent.
    #[error("invalid registry: {message}")]
    InvalidRegistry {
        /// Description of the problem.
        message: String,
    },

    /// Malformed version token.
    #[error("invalid version: {0}")]
    InvalidVersion(#[from] VersionError),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger storage error.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl MigrationError {
    /// Build a [`MigrationError::PreconditionFailed`].
    pub fn precondition(message: impl Into<String>) -> Self {
        MigrationError::PreconditionFailed {
            message: message.into(),
        }
    }

    /// Build a [`MigrationError::DowngradeUnsupported`].
    pub fn downgrade_unsupported(reason: impl Into<String>) -> Self {
        MigrationError::DowngradeUnsupported {
            reason: reason.into(),
        }
    }

    /// The innermost error, looking through [`MigrationError::UnitFailed`].
    pub fn root_cause(&self) -> &MigrationError {
        let mut current = self;
        while let MigrationError::UnitFailed { source, .. } = current {
            current = &**source;
        }
        current
    }

    /// The failed unit's version, if this error came from a unit.
    pub fn failed_version(&self) -> Option<&MigrationVersion> {
        match self {
            MigrationError::UnitFailed { version, .. } => Some(version),
            _ => None,
        }
    }
}

impl From<LedgerError> for MigrationError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateVersion(version) => MigrationError::DuplicateVersion { version },
            LedgerError::NotFound(version) => MigrationError::NotFound { version },
            other => MigrationError::Ledger(other),
        }
    }
}
