//! SQL migrations loaded from a directory tree.
//!
//! Layout:
//!
//! ```text
//! <root>/<branch>/<unit>.up.sql     forward script
//! <root>/<branch>/<unit>.down.sql   inverse script (optional)
//! <root>/<branch>/<unit>.sql        forward-only script
//! ```
//!
//! Files directly under `<root>` get an unqualified version. A unit without a
//! down script refuses to downgrade.

use crate::error::MigrationError;
use crate::registry::{MigrationDescriptor, RegistryBuilder};
use crate::unit::cloned;
use crate::units::SqlMigration;
use crate::version::MigrationVersion;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
struct Scripts {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

/// Directory of SQL migration scripts.
#[derive(Debug, Clone)]
pub struct SqlDirectorySource {
    root: PathBuf,
    transactional: bool,
}

impl SqlDirectorySource {
    /// Source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            transactional: true,
        }
    }

    /// Whether loaded units run inside a transaction. On by default.
    pub fn with_transaction(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every script into descriptors, sorted by version.
    pub fn load(&self) -> Result<Vec<MigrationDescriptor>, MigrationError> {
        let mut found: BTreeMap<MigrationVersion, Scripts> = BTreeMap::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                let Some(branch) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                for inner in fs::read_dir(&path)? {
                    let inner = inner?.path();
                    if inner.is_file() {
                        collect(&mut found, Some(branch), inner)?;
                    }
                }
            } else if path.is_file() {
                collect(&mut found, None, path)?;
            }
        }

        let mut descriptors = Vec::with_capacity(found.len());
        for (version, scripts) in found {
            let up_path = scripts.up.ok_or_else(|| MigrationError::InvalidRegistry {
                message: format!("{} has a down script but no up script", version),
            })?;
            let up = fs::read_to_string(&up_path)?;
            let down = match &scripts.down {
                Some(path) => Some(fs::read_to_string(path)?),
                None => None,
            };

            let unit = SqlMigration::from_scripts(&up, down.as_deref())
                .with_transaction(self.transactional);
            let name = version.unit_name().to_string();
            descriptors.push(MigrationDescriptor::concrete(version, name, cloned(unit)));
        }

        tracing::debug!(
            root = %self.root.display(),
            units = descriptors.len(),
            "loaded sql migrations"
        );
        Ok(descriptors)
    }

    /// Load into a registry builder.
    pub fn register(&self, builder: RegistryBuilder) -> Result<RegistryBuilder, MigrationError> {
        Ok(builder.extend(self.load()?))
    }
}

fn collect(
    found: &mut BTreeMap<MigrationVersion, Scripts>,
    branch: Option<&str>,
    path: PathBuf,
) -> Result<(), MigrationError> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };

    let (unit, is_down) = if let Some(unit) = file_name.strip_suffix(".down.sql") {
        (unit, true)
    } else if let Some(unit) = file_name.strip_suffix(".up.sql") {
        (unit, false)
    } else if let Some(unit) = file_name.strip_suffix(".sql") {
        (unit, false)
    } else {
        return Ok(());
    };

    let version = match branch {
        Some(branch) => MigrationVersion::in_branch(branch, unit)?,
        None => MigrationVersion::new(unit)?,
    };

    let scripts = found.entry(version.clone()).or_default();
    let slot = if is_down { &mut scripts.down } else { &mut scripts.up };
    if slot.is_some() {
        return Err(MigrationError::InvalidRegistry {
            message: format!("{} has more than one {} script", version, if is_down { "down" } else { "up" }),
        });
    }
    *slot = Some(path);
    Ok(())
}
