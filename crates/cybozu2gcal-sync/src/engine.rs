//! Idempotent writes to the remote calendar.
//!
//! The engine owns the sync window on the remote side: every run first
//! deletes the upcoming events inside the window, then upserts what the
//! source currently shows. Event ids are deterministic, so an upsert of an
//! event that was just deleted revives the same record instead of creating
//! a duplicate.

use std::sync::Arc;

use cybozu2gcal_core::{NormalizedEvent, SyncWindow};
use cybozu2gcal_providers::{ProviderErrorCode, ProviderResult, RemoteCalendar, RemoteEvent};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// An existing record was replaced.
    Updated,
    /// A new record was created.
    Inserted,
    /// Nothing was written (dry run).
    DryRun,
}

/// Counts from [`SyncEngine::delete_upcoming_events`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Remote events whose start falls inside the window.
    pub matched: usize,
    /// Events actually deleted.
    pub deleted: usize,
    /// Deletions that failed.
    pub failed: usize,
}

/// Writes normalized events to one remote calendar.
#[derive(Clone)]
pub struct SyncEngine {
    remote: Arc<dyn RemoteCalendar>,
    calendar_id: Arc<str>,
    window: SyncWindow,
    retry: RetryPolicy,
    max_concurrency: usize,
    dry_run: bool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote", &self.remote.name())
            .field("calendar_id", &self.calendar_id)
            .field("window", &self.window)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl SyncEngine {
    /// Creates an engine writing to `calendar_id` inside `window`.
    pub fn new(
        remote: Arc<dyn RemoteCalendar>,
        calendar_id: impl Into<Arc<str>>,
        window: SyncWindow,
    ) -> Self {
        Self {
            remote,
            calendar_id: calendar_id.into(),
            window,
            retry: RetryPolicy::default(),
            max_concurrency: 8,
            dry_run: false,
        }
    }

    /// Builder: set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: bound concurrent deletions.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Builder: log mutations instead of performing them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// The window this engine owns.
    pub fn window(&self) -> &SyncWindow {
        &self.window
    }

    /// Creates or replaces the remote record for `event`.
    ///
    /// Update is tried first so a record deleted earlier in the run comes
    /// back as `confirmed`. A missing record is inserted; an insert that
    /// collides with a concurrent writer falls back to one more update.
    pub async fn upsert(&self, event: &NormalizedEvent) -> ProviderResult<UpsertOutcome> {
        let record = RemoteEvent::from_normalized(event);

        if self.dry_run {
            info!(id = %record.id, title = %record.summary, "dry run: would upsert event");
            return Ok(UpsertOutcome::DryRun);
        }

        let remote = self.remote.as_ref();
        let calendar_id: &str = &self.calendar_id;

        match self
            .retry
            .run("update", || remote.update_event(calendar_id, &record))
            .await
        {
            Ok(()) => {
                info!(id = %record.id, title = %record.summary, "updated event");
                return Ok(UpsertOutcome::Updated);
            }
            Err(e) if e.code() == ProviderErrorCode::NotFound => {
                debug!(id = %record.id, "no remote record, inserting");
            }
            Err(e) => return Err(e),
        }

        match self
            .retry
            .run("insert", || remote.insert_event(calendar_id, &record))
            .await
        {
            Ok(()) => {
                info!(id = %record.id, title = %record.summary, "inserted event");
                Ok(UpsertOutcome::Inserted)
            }
            Err(e) if e.code() == ProviderErrorCode::Conflict => {
                debug!(id = %record.id, "insert conflicted, updating once more");
                self.retry
                    .run("update", || remote.update_event(calendar_id, &record))
                    .await?;
                info!(id = %record.id, title = %record.summary, "updated event");
                Ok(UpsertOutcome::Updated)
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes every remote event starting inside the window.
    ///
    /// Events before the window are never touched. Each deletion runs as
    /// its own task; a failed deletion is logged and counted.
    ///
    /// # Errors
    ///
    /// Fails only if the remote events cannot be listed.
    pub async fn delete_upcoming_events(&self) -> ProviderResult<DeleteReport> {
        let remote = self.remote.as_ref();
        let calendar_id: &str = &self.calendar_id;
        let time_min = self.window.start_utc();

        let events = self
            .retry
            .run("list", || remote.list_events(calendar_id, time_min))
            .await?;

        let targets: Vec<RemoteEvent> = events
            .into_iter()
            .filter(|event| !event.is_cancelled() && self.window.contains(&event.start))
            .collect();

        let mut report = DeleteReport {
            matched: targets.len(),
            ..Default::default()
        };
        info!(
            count = report.matched,
            window_start = %self.window.start,
            window_end = %self.window.end,
            "deleting upcoming events"
        );

        if self.dry_run {
            for event in &targets {
                info!(id = %event.id, title = %event.summary, "dry run: would delete event");
            }
            return Ok(report);
        }

        let limit = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for event in targets {
            let remote = Arc::clone(&self.remote);
            let calendar_id = Arc::clone(&self.calendar_id);
            let retry = self.retry.clone();
            let limit = Arc::clone(&limit);

            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await;
                let result = retry
                    .run("delete", || remote.delete_event(&calendar_id, &event.id))
                    .await;
                (event, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((event, Ok(()))) => {
                    info!(id = %event.id, title = %event.summary, "deleted event");
                    report.deleted += 1;
                }
                Ok((event, Err(e))) if e.code() == ProviderErrorCode::NotFound => {
                    debug!(id = %event.id, "event already gone");
                    report.deleted += 1;
                }
                Ok((event, Err(e))) => {
                    warn!(id = %event.id, error = %e, "failed to delete event");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "delete task failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use chrono_tz::Tz;
    use cybozu2gcal_core::EventTime;
    use cybozu2gcal_providers::{BoxFuture, ProviderError};

    /// In-memory calendar with scriptable rate limits.
    #[derive(Default)]
    pub(crate) struct FakeCalendar {
        pub(crate) events: Mutex<HashMap<String, RemoteEvent>>,
        pub(crate) rate_limits_left: Mutex<u32>,
        pub(crate) calls: Mutex<Vec<String>>,
        /// Id whose update panics the calling task.
        pub(crate) panic_on: Option<String>,
    }

    impl FakeCalendar {
        pub(crate) fn with_events(events: impl IntoIterator<Item = RemoteEvent>) -> Self {
            let fake = Self::default();
            fake.events
                .lock()
                .unwrap()
                .extend(events.into_iter().map(|e| (e.id.clone(), e)));
            fake
        }

        pub(crate) fn live_ids(&self) -> Vec<String> {
            let mut ids: Vec<_> = self
                .events
                .lock()
                .unwrap()
                .values()
                .filter(|e| !e.is_cancelled())
                .map(|e| e.id.clone())
                .collect();
            ids.sort();
            ids
        }

        pub(crate) fn get(&self, id: &str) -> Option<RemoteEvent> {
            self.events.lock().unwrap().get(id).cloned()
        }

        fn record(&self, call: String) -> ProviderResult<()> {
            self.calls.lock().unwrap().push(call);
            let mut left = self.rate_limits_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(ProviderError::rate_limited("429 Too Many Requests"));
            }
            Ok(())
        }
    }

    impl RemoteCalendar for FakeCalendar {
        fn name(&self) -> &str {
            "fake"
        }

        fn list_events<'a>(
            &'a self,
            _calendar_id: &'a str,
            _time_min: DateTime<Utc>,
        ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>> {
            Box::pin(async move {
                self.record("list".to_string())?;
                Ok(self.events.lock().unwrap().values().cloned().collect())
            })
        }

        fn insert_event<'a>(
            &'a self,
            _calendar_id: &'a str,
            event: &'a RemoteEvent,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                self.record(format!("insert {}", event.id))?;
                let mut events = self.events.lock().unwrap();
                if events.contains_key(&event.id) {
                    return Err(ProviderError::conflict("duplicate id"));
                }
                events.insert(event.id.clone(), event.clone());
                Ok(())
            })
        }

        fn update_event<'a>(
            &'a self,
            _calendar_id: &'a str,
            event: &'a RemoteEvent,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                if self.panic_on.as_deref() == Some(event.id.as_str()) {
                    panic!("calendar crashed while updating {}", event.id);
                }
                self.record(format!("update {}", event.id))?;
                let mut events = self.events.lock().unwrap();
                match events.get_mut(&event.id) {
                    Some(existing) => {
                        *existing = event.clone();
                        Ok(())
                    }
                    None => Err(ProviderError::not_found("no such event")),
                }
            })
        }

        fn delete_event<'a>(
            &'a self,
            _calendar_id: &'a str,
            event_id: &'a str,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async move {
                self.record(format!("delete {}", event_id))?;
                match self.events.lock().unwrap().get_mut(event_id) {
                    Some(existing) if !existing.is_cancelled() => {
                        existing.status = Some("cancelled".to_string());
                        Ok(())
                    }
                    _ => Err(ProviderError::not_found("no such event")),
                }
            })
        }
    }

    fn tokyo() -> Tz {
        chrono_tz::Asia::Tokyo
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2025, 3, 7)
    }

    fn window() -> SyncWindow {
        SyncWindow::new(today(), date(2025, 5, 1), tokyo())
    }

    fn remote_all_day(id: &str, day: NaiveDate) -> RemoteEvent {
        RemoteEvent {
            id: id.to_string(),
            summary: id.to_string(),
            start: EventTime::from_date(day),
            end: EventTime::from_date(day),
            timezone: Some("Asia/Tokyo".to_string()),
            status: Some("confirmed".to_string()),
        }
    }

    fn remote_timed(id: &str, day: NaiveDate, hour: u32) -> RemoteEvent {
        let start = tokyo()
            .from_local_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
            .unwrap();
        RemoteEvent {
            start: EventTime::from_zoned(start),
            end: EventTime::from_zoned(start + chrono::Duration::hours(1)),
            ..remote_all_day(id, day)
        }
    }

    fn engine(fake: &Arc<FakeCalendar>) -> SyncEngine {
        let remote: Arc<dyn RemoteCalendar> = fake.clone();
        SyncEngine::new(remote, "primary", window())
    }

    fn normalized(id: &str, title: &str, day: NaiveDate) -> NormalizedEvent {
        let time = EventTime::from_date(day);
        NormalizedEvent::new(id, title, time.clone(), time, "Asia/Tokyo")
    }

    mod deletion {
        use super::*;

        #[tokio::test]
        async fn only_window_events_are_deleted() {
            let fake = Arc::new(FakeCalendar::with_events([
                remote_timed("yesterday", date(2025, 3, 6), 10),
                remote_timed("today", today(), 1),
                remote_all_day("next-week", date(2025, 3, 14)),
            ]));

            let report = engine(&fake).delete_upcoming_events().await.unwrap();

            assert_eq!(report.matched, 2);
            assert_eq!(report.deleted, 2);
            assert_eq!(report.failed, 0);
            assert_eq!(fake.live_ids(), vec!["yesterday".to_string()]);
        }

        #[tokio::test]
        async fn events_past_the_window_end_are_kept() {
            let fake = Arc::new(FakeCalendar::with_events([
                remote_all_day("last-day", date(2025, 4, 30)),
                remote_all_day("after", date(2025, 5, 1)),
            ]));

            let report = engine(&fake).delete_upcoming_events().await.unwrap();

            assert_eq!(report.deleted, 1);
            assert_eq!(fake.live_ids(), vec!["after".to_string()]);
        }

        #[tokio::test]
        async fn dry_run_deletes_nothing() {
            let fake = Arc::new(FakeCalendar::with_events([remote_all_day("today", today())]));

            let report = engine(&fake)
                .with_dry_run(true)
                .delete_upcoming_events()
                .await
                .unwrap();

            assert_eq!(report.matched, 1);
            assert_eq!(report.deleted, 0);
            assert_eq!(fake.live_ids(), vec!["today".to_string()]);
        }

        #[tokio::test(start_paused = true)]
        async fn rate_limited_list_is_retried() {
            let fake = Arc::new(FakeCalendar::with_events([remote_all_day("today", today())]));
            *fake.rate_limits_left.lock().unwrap() = 1;

            let report = engine(&fake).delete_upcoming_events().await.unwrap();
            assert_eq!(report.deleted, 1);
        }
    }

    mod upsert {
        use super::*;

        #[tokio::test]
        async fn missing_record_is_inserted() {
            let fake = Arc::new(FakeCalendar::default());

            let outcome = engine(&fake)
                .upsert(&normalized("100120250307", "Offsite", today()))
                .await
                .unwrap();

            assert_eq!(outcome, UpsertOutcome::Inserted);
            let stored = fake.get("100120250307").unwrap();
            assert_eq!(stored.summary, "Offsite");
            assert_eq!(stored.status.as_deref(), Some("confirmed"));
        }

        #[tokio::test]
        async fn deleted_record_is_revived() {
            let fake = Arc::new(FakeCalendar::with_events([remote_all_day(
                "100120250307",
                today(),
            )]));
            let engine = engine(&fake);
            engine.delete_upcoming_events().await.unwrap();
            assert!(fake.live_ids().is_empty());

            let outcome = engine
                .upsert(&normalized("100120250307", "Offsite", today()))
                .await
                .unwrap();

            assert_eq!(outcome, UpsertOutcome::Updated);
            assert_eq!(fake.live_ids(), vec!["100120250307".to_string()]);
        }

        #[tokio::test(start_paused = true)]
        async fn rate_limited_twice_then_succeeds() {
            let fake = Arc::new(FakeCalendar::with_events([remote_all_day(
                "100120250307",
                today(),
            )]));
            *fake.rate_limits_left.lock().unwrap() = 2;
            let started = tokio::time::Instant::now();

            let outcome = engine(&fake)
                .upsert(&normalized("100120250307", "Offsite", today()))
                .await
                .unwrap();

            assert_eq!(outcome, UpsertOutcome::Updated);
            assert_eq!(fake.calls.lock().unwrap().len(), 3);
            assert!(started.elapsed() >= Duration::from_secs(20));
        }

        #[tokio::test]
        async fn other_errors_surface() {
            struct Broken;
            impl RemoteCalendar for Broken {
                fn name(&self) -> &str {
                    "broken"
                }
                fn list_events<'a>(
                    &'a self,
                    _: &'a str,
                    _: DateTime<Utc>,
                ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>> {
                    Box::pin(async { Ok(Vec::new()) })
                }
                fn insert_event<'a>(
                    &'a self,
                    _: &'a str,
                    _: &'a RemoteEvent,
                ) -> BoxFuture<'a, ProviderResult<()>> {
                    Box::pin(async { Ok(()) })
                }
                fn update_event<'a>(
                    &'a self,
                    _: &'a str,
                    _: &'a RemoteEvent,
                ) -> BoxFuture<'a, ProviderResult<()>> {
                    Box::pin(async { Err(ProviderError::server("503 Service Unavailable")) })
                }
                fn delete_event<'a>(
                    &'a self,
                    _: &'a str,
                    _: &'a str,
                ) -> BoxFuture<'a, ProviderResult<()>> {
                    Box::pin(async { Ok(()) })
                }
            }

            let engine = SyncEngine::new(Arc::new(Broken), "primary", window());
            let err = engine
                .upsert(&normalized("1", "x", today()))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::Server);
        }

        #[tokio::test]
        async fn dry_run_writes_nothing() {
            let fake = Arc::new(FakeCalendar::default());
            let outcome = engine(&fake)
                .with_dry_run(true)
                .upsert(&normalized("1", "x", today()))
                .await
                .unwrap();
            assert_eq!(outcome, UpsertOutcome::DryRun);
            assert!(fake.calls.lock().unwrap().is_empty());
        }
    }
}
