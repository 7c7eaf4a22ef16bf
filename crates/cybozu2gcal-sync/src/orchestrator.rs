//! One sync run, from month pages to remote writes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cybozu2gcal_core::{SyncConfig, SyncWindow};
use cybozu2gcal_providers::{
    ProviderResult, RawEvent, RawEventKind, RemoteCalendar, SourceCalendar, extract_banner_range,
    extract_events, normalize_event,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::engine::{DeleteReport, SyncEngine, UpsertOutcome};
use crate::error::SyncResult;
use crate::retry::RetryPolicy;

/// Counts from one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Distinct source events found on the month pages.
    pub extracted: usize,
    /// Events written to the remote calendar.
    pub upserted: usize,
    /// Events outside the window, or dropped by a dry run.
    pub skipped: usize,
    /// Events that could not be extracted, resolved or written.
    pub failed: usize,
    /// Result of the prune.
    pub deletions: DeleteReport,
}

impl SyncReport {
    /// Returns true if any event failed.
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.deletions.failed > 0
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} extracted, {} upserted, {} skipped, {} failed, {} deleted",
            self.extracted, self.upserted, self.skipped, self.failed, self.deletions.deleted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Upserted,
    Skipped,
    Failed,
}

/// Runs one sync with the window computed from the current time.
pub async fn run(
    config: Arc<SyncConfig>,
    source: Arc<dyn SourceCalendar>,
    remote: Arc<dyn RemoteCalendar>,
) -> SyncResult<SyncReport> {
    run_at(Utc::now(), config, source, remote).await
}

/// Runs one sync as if it were `now`.
///
/// # Errors
///
/// Fails if a month page cannot be fetched or extracted, or if the remote
/// events cannot be listed for the prune. Per-event failures are counted
/// in the report instead.
pub async fn run_at(
    now: DateTime<Utc>,
    config: Arc<SyncConfig>,
    source: Arc<dyn SourceCalendar>,
    remote: Arc<dyn RemoteCalendar>,
) -> SyncResult<SyncReport> {
    let window = SyncWindow::compute(
        now,
        config.timezone,
        config.lookback_days,
        config.months_ahead,
    );
    info!(
        start = %window.start,
        end = %window.end,
        dry_run = config.dry_run,
        "starting sync"
    );

    let mut report = SyncReport::default();
    let events = collect_events(source.as_ref(), &window, &mut report).await?;
    report.extracted = events.len();
    info!(count = events.len(), "extracted source events");

    let engine = Arc::new(
        SyncEngine::new(remote, config.calendar_id.as_str(), window)
            .with_retry(RetryPolicy::from_config(&config))
            .with_max_concurrency(config.max_concurrency)
            .with_dry_run(config.dry_run),
    );

    report.deletions = engine.delete_upcoming_events().await?;

    let limit = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for raw in events {
        let source = Arc::clone(&source);
        let engine = Arc::clone(&engine);
        let config = Arc::clone(&config);
        let limit = Arc::clone(&limit);

        tasks.spawn(async move {
            let _permit = limit.acquire_owned().await;
            process_event(&raw, source.as_ref(), &engine, &config).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(EventOutcome::Upserted) => report.upserted += 1,
            Ok(EventOutcome::Skipped) => report.skipped += 1,
            Ok(EventOutcome::Failed) => report.failed += 1,
            Err(e) => {
                error!(error = %e, "event task failed");
                report.failed += 1;
            }
        }
    }

    info!(%report, "sync finished");
    Ok(report)
}

/// Fetches every month page in the window and extracts its events.
///
/// Events and extraction failures seen on more than one page are kept or
/// counted once.
async fn collect_events(
    source: &dyn SourceCalendar,
    window: &SyncWindow,
    report: &mut SyncReport,
) -> ProviderResult<Vec<RawEvent>> {
    let mut seen: HashSet<(String, RawEventKind)> = HashSet::new();
    let mut seen_failures: HashSet<String> = HashSet::new();
    let mut events = Vec::new();

    for month in window.months() {
        let url = source.month_view_url(month);
        debug!(%url, "fetching month page");
        let page = source.fetch_page(&url).await?;

        for result in extract_events(&page.html)? {
            match result {
                Ok(raw) => {
                    let (source_id, kind) = raw.dedupe_key();
                    if seen.insert((source_id.to_string(), kind)) {
                        events.push(raw);
                    }
                }
                Err(e) => {
                    if seen_failures.insert(e.message().to_string()) {
                        warn!(month = %month, error = %e, "skipping unreadable event");
                        report.failed += 1;
                    }
                }
            }
        }
    }

    Ok(events)
}

async fn process_event(
    raw: &RawEvent,
    source: &dyn SourceCalendar,
    engine: &SyncEngine,
    config: &SyncConfig,
) -> EventOutcome {
    let window = engine.window();

    let range = match raw.kind {
        RawEventKind::Timed(date) => {
            if !window.contains_date(date) {
                debug!(source_id = %raw.source_id, %date, "outside the sync window");
                return EventOutcome::Skipped;
            }
            None
        }
        RawEventKind::BannerRange => {
            let url = source.banner_detail_url(&raw.href_query);
            let range = match source.fetch_page(&url).await {
                Ok(page) => extract_banner_range(&page.html),
                Err(e) => Err(e),
            };
            match range {
                Ok(range) if window.overlaps(range.first, range.last) => Some(range),
                Ok(range) => {
                    debug!(
                        source_id = %raw.source_id,
                        first = %range.first,
                        last = %range.last,
                        "banner outside the sync window"
                    );
                    return EventOutcome::Skipped;
                }
                Err(e) => {
                    warn!(
                        source_id = %raw.source_id,
                        title = %raw.title_text,
                        error = %e,
                        "skipping banner event"
                    );
                    return EventOutcome::Failed;
                }
            }
        }
    };

    let event = match normalize_event(raw, range, &config.timezone) {
        Ok(event) => event,
        Err(e) => {
            warn!(source_id = %raw.source_id, error = %e, "skipping event");
            return EventOutcome::Failed;
        }
    };

    match engine.upsert(&event).await {
        Ok(UpsertOutcome::DryRun) => EventOutcome::Skipped,
        Ok(_) => EventOutcome::Upserted,
        Err(e) => {
            warn!(id = %event.id, title = %event.title, error = %e, "failed to upsert event");
            EventOutcome::Failed
        }
    }
}
