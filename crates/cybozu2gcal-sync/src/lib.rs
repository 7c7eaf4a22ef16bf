//! Sync engine: prune and upsert with rate-limit retry, run orchestration.
//!
//! A run fetches every month page of the sync window, extracts and
//! normalizes the events, deletes the upcoming remote events inside the
//! window and writes the current ones back under their deterministic ids.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cybozu2gcal_core::SyncConfig;
//! use cybozu2gcal_providers::{RemoteCalendar, SourceCalendar};
//!
//! async fn sync_once(
//!     config: Arc<SyncConfig>,
//!     source: Arc<dyn SourceCalendar>,
//!     remote: Arc<dyn RemoteCalendar>,
//! ) -> Result<(), cybozu2gcal_sync::SyncError> {
//!     let report = cybozu2gcal_sync::run(config, source, remote).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

mod engine;
mod error;
mod orchestrator;
mod retry;

pub use engine::{DeleteReport, SyncEngine, UpsertOutcome};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{SyncReport, run, run_at};
pub use retry::RetryPolicy;
