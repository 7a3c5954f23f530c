//! Schemaflow CLI - run and inspect schema migrations from the command line.

pub mod commands;
pub mod config;
pub mod error;
pub mod formatter;

pub use commands::execute;
pub use config::{Args, CliConfig, Command};
pub use error::CliError;
pub use formatter::{create_formatter, Formatter, OutputFormat};
