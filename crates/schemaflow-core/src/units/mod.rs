//! Reusable migration units.
//!
//! Application variants share these implementations; names that differ per
//! variant come from the run's `VariantConfig`.

pub mod closure;
pub mod column;
pub mod directory;
pub mod settings;
pub mod sql;

pub use closure::FnMigration;
pub use column::{AddColumnIfMissing, RenameColumn, Strictness};
pub use directory::RenameDirectory;
pub use settings::RenameContextSetting;
pub use sql::{split_statements, SqlMigration};
