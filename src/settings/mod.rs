//! Command line and settings-file configuration.

pub mod cli;
pub mod config;
pub mod types;

pub use cli::CliArgs;
pub use config::RelayConfig;
pub use types::{SettingsFile, SourceKind};
