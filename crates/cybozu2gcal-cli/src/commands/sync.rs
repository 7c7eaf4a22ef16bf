//! The `sync` command.

use std::path::PathBuf;
use std::sync::Arc;

use cybozu2gcal_providers::google::{GoogleCalendar, GoogleConfig};
use cybozu2gcal_providers::source::encoding::encoding_for_label;
use cybozu2gcal_providers::{CybozuSession, RemoteCalendar, SourceCalendar};
use tracing::{info, warn};

use crate::cli::SyncArgs;
use crate::error::CliResult;

/// Logs in to Cybozu, connects to Google Calendar and runs one sync.
///
/// Per-event failures are logged and reported but do not fail the command.
pub async fn run(args: &SyncArgs, config_dir: PathBuf) -> CliResult<()> {
    let config = args.to_config(config_dir)?;
    encoding_for_label(&config.source.encoding)?;

    let remote = GoogleCalendar::connect(GoogleConfig::from_sync_config(&config)?)?;
    let session = CybozuSession::login(config.source.clone(), config.request_timeout).await?;
    info!(user = %config.source.user_id, "logged in to cybozu");

    let source: Arc<dyn SourceCalendar> = Arc::new(session);
    let remote: Arc<dyn RemoteCalendar> = Arc::new(remote);
    let report = cybozu2gcal_sync::run(Arc::new(config), source, remote).await?;

    if report.has_failures() {
        warn!(
            failed = report.failed,
            delete_failed = report.deletions.failed,
            "some events could not be synced"
        );
    }
    println!("{}", report);

    Ok(())
}
