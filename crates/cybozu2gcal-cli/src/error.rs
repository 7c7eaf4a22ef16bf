//! CLI error types.

use cybozu2gcal_core::{ConfigError, TracingError};
use cybozu2gcal_providers::ProviderError;
use cybozu2gcal_sync::SyncError;
use thiserror::Error;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end the process with a failure exit code.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid settings.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source or remote failure outside a sync run (login, authorization).
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// The sync run aborted.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Logging could not be set up.
    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    /// Reading the terminal failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
