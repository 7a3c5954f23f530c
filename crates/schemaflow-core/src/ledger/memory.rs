//! In-memory ledger for tests and dry runs.

use super::{current_timestamp, InFlight, Ledger, LedgerEntry, LedgerError};
use crate::error::Direction;
use crate::version::MigrationVersion;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<MigrationVersion, LedgerEntry>,
    next_sequence: u64,
    fallback: Option<MigrationVersion>,
    in_flight: Option<InFlight>,
}

/// Volatile ledger with the same semantics as [`super::SledLedger`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: Mutex<Inner>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that already records `versions`, in order.
    pub fn with_applied<'a>(versions: impl IntoIterator<Item = &'a MigrationVersion>) -> Self {
        let ledger = Self::new();
        {
            let mut inner = ledger.inner.lock();
            for version in versions {
                let sequence = inner.next_sequence;
                inner.next_sequence += 1;
                inner.entries.insert(
                    version.clone(),
                    LedgerEntry {
                        version: version.clone(),
                        applied_at: current_timestamp(),
                        sequence,
                    },
                );
            }
        }
        ledger
    }
}

impl Ledger for MemoryLedger {
    fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError> {
        Ok(self.inner.lock().entries.contains_key(version))
    }

    fn record_applied(&self, version: &MigrationVersion, applied_at: u64) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(version) {
            return Err(LedgerError::DuplicateVersion(version.clone()));
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.insert(
            version.clone(),
            LedgerEntry {
                version: version.clone(),
                applied_at,
                sequence,
            },
        );
        Ok(())
    }

    fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        self.inner
            .lock()
            .entries
            .remove(version)
            .map(|_| ())
            .ok_or_else(|| LedgerError::NotFound(version.clone()))
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries: Vec<_> = self.inner.lock().entries.values().cloned().collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        self.inner.lock().fallback = Some(version.clone());
        Ok(())
    }

    fn clear_fallback(&self) -> Result<(), LedgerError> {
        self.inner.lock().fallback = None;
        Ok(())
    }

    fn fallback(&self) -> Result<Option<MigrationVersion>, LedgerError> {
        Ok(self.inner.lock().fallback.clone())
    }

    fn begin(&self, version: &MigrationVersion, direction: Direction) -> Result<(), LedgerError> {
        self.inner.lock().in_flight = Some(InFlight {
            version: version.clone(),
            direction,
            started_at: current_timestamp(),
        });
        Ok(())
    }

    fn finish(&self) -> Result<(), LedgerError> {
        self.inner.lock().in_flight = None;
        Ok(())
    }

    fn in_flight(&self) -> Result<Option<InFlight>, LedgerError> {
        Ok(self.inner.lock().in_flight.clone())
    }
}
