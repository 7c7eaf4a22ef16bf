//! Sync error types.

use cybozu2gcal_core::ConfigError;
use cybozu2gcal_providers::ProviderError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync run.
///
/// Failures local to one event never become a `SyncError`; they are logged
/// and counted in the run report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A source or remote call failed in a way that stops the run.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl SyncError {
    /// Returns the provider error, if this wraps one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(e) => Some(e),
            _ => None,
        }
    }
}
