//! Version ledger: the durable record of applied migrations.
//!
//! The ledger holds one entry per applied version, a single fallback marker
//! written after a failed forward run, and an in-flight marker that brackets
//! every unit invocation. A surviving in-flight marker means the process died
//! between running a unit and recording it.

pub mod memory;
pub mod sled_ledger;

pub use memory::MemoryLedger;
pub use sled_ledger::SledLedger;

use crate::error::Direction;
use crate::version::{MigrationVersion, VersionError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The version is already recorded.
    #[error("version {0} is already recorded")]
    DuplicateVersion(MigrationVersion),

    /// The version is not recorded.
    #[error("version {0} is not recorded")]
    NotFound(MigrationVersion),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A stored version token failed validation.
    #[error("stored version is invalid: {0}")]
    InvalidVersion(#[from] VersionError),
}

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Applied version.
    pub version: MigrationVersion,
    /// When it was applied (microseconds since epoch).
    pub applied_at: u64,
    /// Monotonic application sequence number.
    pub sequence: u64,
}

/// Marker for a unit that was started but not yet recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    /// Version being run.
    pub version: MigrationVersion,
    /// Direction of the run.
    pub direction: Direction,
    /// When the unit started (microseconds since epoch).
    pub started_at: u64,
}

/// Snapshot of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    /// Applied versions in application order.
    pub applied_versions: Vec<MigrationVersion>,
    /// Fallback marker, if one was recorded.
    pub fallback_version: Option<MigrationVersion>,
    /// Unit interrupted by a previous run, if any.
    pub in_flight: Option<InFlight>,
}

/// Durable store of applied versions.
///
/// Writes must be durable when the call returns.
pub trait Ledger {
    /// Whether a version is recorded.
    fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError>;

    /// Record a version. Fails with `DuplicateVersion` if already present.
    fn record_applied(&self, version: &MigrationVersion, applied_at: u64) -> Result<(), LedgerError>;

    /// Remove a version. Fails with `NotFound` if absent.
    fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError>;

    /// All entries in application order.
    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Record the fallback marker, replacing any previous one.
    fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError>;

    /// Clear the fallback marker.
    fn clear_fallback(&self) -> Result<(), LedgerError>;

    /// The fallback marker.
    fn fallback(&self) -> Result<Option<MigrationVersion>, LedgerError>;

    /// Mark a unit as in flight.
    fn begin(&self, version: &MigrationVersion, direction: Direction) -> Result<(), LedgerError>;

    /// Clear the in-flight marker.
    fn finish(&self) -> Result<(), LedgerError>;

    /// The in-flight marker.
    fn in_flight(&self) -> Result<Option<InFlight>, LedgerError>;

    /// Applied versions in application order.
    fn list_applied(&self) -> Result<Vec<MigrationVersion>, LedgerError> {
        Ok(self.entries()?.into_iter().map(|e| e.version).collect())
    }

    /// Snapshot of the ledger.
    fn status(&self) -> Result<LedgerStatus, LedgerError> {
        Ok(LedgerStatus {
            applied_versions: self.list_applied()?,
            fallback_version: self.fallback()?,
            in_flight: self.in_flight()?,
        })
    }
}

macro_rules! forward_ledger {
    ($ty:ty) => {
        impl<L: Ledger + ?Sized> Ledger for $ty {
            fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError> {
                (**self).is_applied(version)
            }

            fn record_applied(
                &self,
                version: &MigrationVersion,
                applied_at: u64,
            ) -> Result<(), LedgerError> {
                (**self).record_applied(version, applied_at)
            }

            fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
                (**self).remove_applied(version)
            }

            fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
                (**self).entries()
            }

            fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
                (**self).set_fallback(version)
            }

            fn clear_fallback(&self) -> Result<(), LedgerError> {
                (**self).clear_fallback()
            }

            fn fallback(&self) -> Result<Option<MigrationVersion>, LedgerError> {
                (**self).fallback()
            }

            fn begin(
                &self,
                version: &MigrationVersion,
                direction: Direction,
            ) -> Result<(), LedgerError> {
                (**self).begin(version, direction)
            }

            fn finish(&self) -> Result<(), LedgerError> {
                (**self).finish()
            }

            fn in_flight(&self) -> Result<Option<InFlight>, LedgerError> {
                (**self).in_flight()
            }
        }
    };
}

forward_ledger!(&L);
forward_ledger!(Arc<L>);
forward_ledger!(Box<L>);

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}
