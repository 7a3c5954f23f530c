//! Sled-backed ledger.

use super::{current_timestamp, InFlight, Ledger, LedgerEntry, LedgerError};
use crate::error::Direction;
use crate::version::MigrationVersion;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

const FALLBACK_KEY: &[u8] = b"fallback";
const IN_FLIGHT_KEY: &[u8] = b"in_flight";

/// Stored form of a ledger entry.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
struct StoredEntry {
    version: String,
    applied_at: u64,
    sequence: u64,
}

/// Stored form of the in-flight marker.
#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
struct StoredInFlight {
    version: String,
    /// 0 = up, 1 = down.
    direction: u8,
    started_at: u64,
}

impl StoredEntry {
    fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let aligned = aligned(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| LedgerError::Deserialization(e.to_string()))
    }

    fn into_entry(self) -> Result<LedgerEntry, LedgerError> {
        Ok(LedgerEntry {
            version: MigrationVersion::new(self.version)?,
            applied_at: self.applied_at,
            sequence: self.sequence,
        })
    }
}

impl StoredInFlight {
    fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let aligned = aligned(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| LedgerError::Deserialization(e.to_string()))
    }
}

/// Sled values are not guaranteed to be aligned for archived access.
fn aligned(bytes: &[u8]) -> AlignedVec {
    let mut buf = AlignedVec::new();
    buf.extend_from_slice(bytes);
    buf
}

/// Ledger persisted in two sled trees.
///
/// `schemaflow:ledger` maps version tokens to entries; `schemaflow:markers`
/// holds the fallback and in-flight markers. Every write is flushed before
/// returning.
pub struct SledLedger {
    db: sled::Db,
    entries: sled::Tree,
    markers: sled::Tree,
}

impl SledLedger {
    /// Tree name for applied entries.
    pub const ENTRIES_TREE: &'static str = "schemaflow:ledger";

    /// Tree name for markers.
    pub const MARKERS_TREE: &'static str = "schemaflow:markers";

    /// Open the ledger inside an existing database.
    pub fn open(db: &sled::Db) -> Result<Self, LedgerError> {
        Ok(Self {
            db: db.clone(),
            entries: db.open_tree(Self::ENTRIES_TREE)?,
            markers: db.open_tree(Self::MARKERS_TREE)?,
        })
    }

    /// Open (or create) a ledger database at `path`.
    pub fn open_path(path: impl AsRef<std::path::Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Open a throwaway ledger that is deleted on drop.
    pub fn temporary() -> Result<Self, LedgerError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::open(&db)
    }

    fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush()?;
        Ok(())
    }
}

impl Ledger for SledLedger {
    fn is_applied(&self, version: &MigrationVersion) -> Result<bool, LedgerError> {
        Ok(self.entries.contains_key(version.as_str())?)
    }

    fn record_applied(&self, version: &MigrationVersion, applied_at: u64) -> Result<(), LedgerError> {
        let entry = StoredEntry {
            version: version.to_string(),
            applied_at,
            sequence: self.db.generate_id()?,
        };
        let value = entry.to_bytes()?;

        self.entries
            .compare_and_swap(version.as_str(), None as Option<&[u8]>, Some(value))?
            .map_err(|_| LedgerError::DuplicateVersion(version.clone()))?;
        self.flush()?;

        tracing::debug!(version = %version, "ledger entry recorded");
        Ok(())
    }

    fn remove_applied(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        if self.entries.remove(version.as_str())?.is_none() {
            return Err(LedgerError::NotFound(version.clone()));
        }
        self.flush()?;

        tracing::debug!(version = %version, "ledger entry removed");
        Ok(())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut entries = Vec::new();
        for result in self.entries.iter() {
            let (_, value) = result?;
            entries.push(StoredEntry::from_bytes(&value)?.into_entry()?);
        }
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    fn set_fallback(&self, version: &MigrationVersion) -> Result<(), LedgerError> {
        self.markers.insert(FALLBACK_KEY, version.as_str())?;
        self.flush()
    }

    fn clear_fallback(&self) -> Result<(), LedgerError> {
        self.markers.remove(FALLBACK_KEY)?;
        self.flush()
    }

    fn fallback(&self) -> Result<Option<MigrationVersion>, LedgerError> {
        match self.markers.get(FALLBACK_KEY)? {
            Some(bytes) => {
                let token = String::from_utf8(bytes.to_vec())
                    .map_err(|e| LedgerError::Deserialization(format!("fallback marker: {}", e)))?;
                Ok(Some(MigrationVersion::new(token)?))
            }
            None => Ok(None),
        }
    }

    fn begin(&self, version: &MigrationVersion, direction: Direction) -> Result<(), LedgerError> {
        let marker = StoredInFlight {
            version: version.to_string(),
            direction: match direction {
                Direction::Up => 0,
                Direction::Down => 1,
            },
            started_at: current_timestamp(),
        };
        self.markers.insert(IN_FLIGHT_KEY, marker.to_bytes()?)?;
        self.flush()
    }

    fn finish(&self) -> Result<(), LedgerError> {
        self.markers.remove(IN_FLIGHT_KEY)?;
        self.flush()
    }

    fn in_flight(&self) -> Result<Option<InFlight>, LedgerError> {
        match self.markers.get(IN_FLIGHT_KEY)? {
            Some(bytes) => {
                let marker = StoredInFlight::from_bytes(&bytes)?;
                Ok(Some(InFlight {
                    version: MigrationVersion::new(marker.version)?,
                    direction: if marker.direction == 0 {
                        Direction::Up
                    } else {
                        Direction::Down
                    },
                    started_at: marker.started_at,
                }))
            }
            None => Ok(None),
        }
    }
}
