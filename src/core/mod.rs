// Public modules
pub mod atomic;
pub mod config;
pub mod error;
pub mod executor;
pub mod init;
pub mod leaf;
pub mod loader;
pub mod logging;
pub mod migration;
pub mod plugin;
pub mod report;
pub mod stage;
pub mod stands;
pub mod validation;

#[cfg(test)]
pub mod testing;

// Re-export common types for convenience
pub use atomic::Atomicity;
pub use error::{Error, ErrorCode, Result};
pub use executor::{CancellationFlag, ConfigMap, ExecContext, Executor, PluginInfo};
pub use migration::{MigrationSet, ReleaseRun};
pub use plugin::PluginController;
pub use report::{RunReport, RunStatus};
