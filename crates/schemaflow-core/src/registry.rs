//! Ordered catalog of migration units.
//!
//! The registry owns ordering: units sort by version token (branch first,
//! then the unit's own token), and the runner consumes whatever order the
//! registry hands it. Abstract units name a binding key; a deployment binds
//! each key to one concrete factory before anything runs.

use crate::context::Attributes;
use crate::error::MigrationError;
use crate::ledger::{Ledger, LedgerError};
use crate::unit::{Migration, MigrationFactory};
use crate::version::MigrationVersion;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a descriptor instantiates.
#[derive(Clone)]
pub enum UnitTarget {
    /// A runnable unit.
    Concrete(MigrationFactory),
    /// A unit that needs a deployment-specific binding.
    Abstract {
        /// Binding key.
        key: String,
    },
}

impl fmt::Debug for UnitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitTarget::Concrete(_) => write!(f, "Concrete"),
            UnitTarget::Abstract { key } => f.debug_struct("Abstract").field("key", key).finish(),
        }
    }
}

/// Static definition of one unit.
#[derive(Debug, Clone)]
pub struct MigrationDescriptor {
    /// Unit version.
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
    /// What to instantiate.
    pub target: UnitTarget,
    /// Versions that must be ordered before this one.
    pub depends_on: Vec<MigrationVersion>,
}

impl MigrationDescriptor {
    /// A concrete unit.
    pub fn concrete(
        version: MigrationVersion,
        name: impl Into<String>,
        factory: MigrationFactory,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            target: UnitTarget::Concrete(factory),
            depends_on: Vec::new(),
        }
    }

    /// An abstract unit resolved through the binding `key`.
    pub fn abstract_unit(
        version: MigrationVersion,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            target: UnitTarget::Abstract { key: key.into() },
            depends_on: Vec::new(),
        }
    }

    /// Declare a structural dependency.
    pub fn depends_on(mut self, version: MigrationVersion) -> Self {
        self.depends_on.push(version);
        self
    }

    /// Whether this unit needs a binding.
    pub fn is_abstract(&self) -> bool {
        matches!(self.target, UnitTarget::Abstract { .. })
    }
}

/// A unit bound to a concrete factory, ready to run.
#[derive(Clone)]
pub struct ResolvedMigration {
    /// Unit version.
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
    factory: MigrationFactory,
}

impl ResolvedMigration {
    /// Build a fresh unit instance for this run.
    pub fn instantiate(&self, attributes: &Attributes) -> Box<dyn Migration> {
        (self.factory)(attributes)
    }
}

impl fmt::Debug for ResolvedMigration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMigration")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<MigrationDescriptor>,
    bindings: HashMap<String, MigrationFactory>,
}

impl RegistryBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor.
    pub fn add(mut self, descriptor: MigrationDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Add several descriptors.
    pub fn extend(mut self, descriptors: impl IntoIterator<Item = MigrationDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Add a concrete unit.
    pub fn unit(
        self,
        version: MigrationVersion,
        name: impl Into<String>,
        factory: MigrationFactory,
    ) -> Self {
        self.add(MigrationDescriptor::concrete(version, name, factory))
    }

    /// Add an abstract unit.
    pub fn abstract_unit(
        self,
        version: MigrationVersion,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.add(MigrationDescriptor::abstract_unit(version, name, key))
    }

    /// Bind an abstract key to its concrete factory for this deployment.
    pub fn bind(mut self, key: impl Into<String>, factory: MigrationFactory) -> Self {
        self.bindings.insert(key.into(), factory);
        self
    }

    /// Validate and sort.
    pub fn build(self) -> Result<Registry, MigrationError> {
        let mut descriptors = self.descriptors;

        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.version.clone()) {
                return Err(MigrationError::InvalidRegistry {
                    message: format!("version {} is registered twice", descriptor.version),
                });
            }
        }

        for descriptor in &descriptors {
            for dependency in &descriptor.depends_on {
                if !seen.contains(dependency) {
                    return Err(MigrationError::InvalidRegistry {
                        message: format!(
                            "{} depends on unregistered version {}",
                            descriptor.version, dependency
                        ),
                    });
                }
                if dependency >= &descriptor.version {
                    return Err(MigrationError::InvalidRegistry {
                        message: format!(
                            "{} depends on {} which does not sort before it",
                            descriptor.version, dependency
                        ),
                    });
                }
            }
        }

        let abstract_keys: HashSet<&str> = descriptors
            .iter()
            .filter_map(|d| match &d.target {
                UnitTarget::Abstract { key } => Some(key.as_str()),
                UnitTarget::Concrete(_) => None,
            })
            .collect();
        for key in self.bindings.keys() {
            if !abstract_keys.contains(key.as_str()) {
                tracing::warn!(key = %key, "binding does not match any abstract migration");
            }
        }

        descriptors.sort_by(|a, b| a.version.cmp(&b.version));

        Ok(Registry {
            descriptors,
            bindings: self.bindings,
        })
    }
}

/// Immutable, version-ordered catalog.
pub struct Registry {
    descriptors: Vec<MigrationDescriptor>,
    bindings: HashMap<String, MigrationFactory>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// All descriptors in order.
    pub fn descriptors(&self) -> &[MigrationDescriptor] {
        &self.descriptors
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Whether a version is registered.
    pub fn contains(&self, version: &MigrationVersion) -> bool {
        self.get(version).is_some()
    }

    /// Descriptor for a version.
    pub fn get(&self, version: &MigrationVersion) -> Option<&MigrationDescriptor> {
        self.descriptors
            .binary_search_by(|d| d.version.cmp(version))
            .ok()
            .map(|idx| &self.descriptors[idx])
    }

    /// Highest registered version.
    pub fn latest(&self) -> Option<&MigrationVersion> {
        self.descriptors.last().map(|d| &d.version)
    }

    /// Units in `(from, to]`, in forward order, each bound to a concrete
    /// factory.
    ///
    /// Fails with `UnresolvedAbstractMigration` if any unit in the range has
    /// no binding.
    pub fn for_upgrade(
        &self,
        from: Option<&MigrationVersion>,
        to: &MigrationVersion,
    ) -> Result<Vec<ResolvedMigration>, MigrationError> {
        self.descriptors
            .iter()
            .filter(|d| d.version.in_range(from, to))
            .map(|d| self.resolve(d))
            .collect()
    }

    /// Applied units in `(to, from]`, in reverse order.
    pub fn for_downgrade<L: Ledger + ?Sized>(
        &self,
        from: &MigrationVersion,
        to: Option<&MigrationVersion>,
        ledger: &L,
    ) -> Result<Vec<ResolvedMigration>, MigrationError> {
        let mut resolved = Vec::new();
        for descriptor in self.descriptors.iter().rev() {
            if !descriptor.version.in_range(to, from) {
                continue;
            }
            if !ledger.is_applied(&descriptor.version)? {
                continue;
            }
            resolved.push(self.resolve(descriptor)?);
        }
        Ok(resolved)
    }

    /// Ledger versions this registry does not know about.
    pub fn unknown_applied<L: Ledger + ?Sized>(
        &self,
        ledger: &L,
    ) -> Result<Vec<MigrationVersion>, LedgerError> {
        Ok(ledger
            .list_applied()?
            .into_iter()
            .filter(|v| !self.contains(v))
            .collect())
    }

    fn resolve(&self, descriptor: &MigrationDescriptor) -> Result<ResolvedMigration, MigrationError> {
        let factory = match &descriptor.target {
            UnitTarget::Concrete(factory) => factory.clone(),
            UnitTarget::Abstract { key } => self.bindings.get(key).cloned().ok_or_else(|| {
                MigrationError::UnresolvedAbstractMigration {
                    version: descriptor.version.clone(),
                    key: key.clone(),
                }
            })?,
        };

        Ok(ResolvedMigration {
            version: descriptor.version.clone(),
            name: descriptor.name.clone(),
            factory,
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}
