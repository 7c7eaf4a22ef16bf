//! RemoteCalendar trait definition.
//!
//! This module defines the [`RemoteCalendar`] trait, the CRUD surface the
//! sync engine needs from the destination calendar service, and
//! [`RemoteEvent`], the record exchanged through it.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use cybozu2gcal_core::{EventTime, NormalizedEvent};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe so the orchestrator can hold
/// `Arc<dyn RemoteCalendar>` and swap in fakes under test.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status value for a live remote event.
pub const STATUS_CONFIRMED: &str = "confirmed";

/// Status value for a deleted remote event.
pub const STATUS_CANCELLED: &str = "cancelled";

/// An event as stored on the remote calendar.
///
/// All-day `end` dates are inclusive here, matching [`NormalizedEvent`].
/// Clients translate to whatever convention their wire format uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    /// Event id, the same deterministic id as the normalized event.
    pub id: String,
    /// Event title.
    pub summary: String,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends.
    pub end: EventTime,
    /// IANA timezone the times were written in, if known.
    pub timezone: Option<String>,
    /// Remote status (`confirmed`, `cancelled`, ...), if known.
    pub status: Option<String>,
}

impl RemoteEvent {
    /// Builds the record to write for a normalized event.
    ///
    /// The status is always `confirmed` so that writing over a previously
    /// deleted record brings it back.
    pub fn from_normalized(event: &NormalizedEvent) -> Self {
        Self {
            id: event.id.clone(),
            summary: event.effective_title().to_string(),
            start: event.start.clone(),
            end: event.end.clone(),
            timezone: Some(event.timezone.clone()),
            status: Some(STATUS_CONFIRMED.to_string()),
        }
    }

    /// Returns true if the remote service reports this event as deleted.
    pub fn is_cancelled(&self) -> bool {
        self.status.as_deref() == Some(STATUS_CANCELLED)
    }
}

/// The remote calendar service.
///
/// Implementations must be safe for concurrent use: the sync engine issues
/// calls from many tasks at once through a shared `Arc<dyn RemoteCalendar>`.
///
/// Errors signal throttling with [`ProviderErrorCode::RateLimited`] and a
/// missing record with [`ProviderErrorCode::NotFound`]; the engine keys its
/// retry and upsert decisions off those codes.
///
/// [`ProviderErrorCode::RateLimited`]: crate::ProviderErrorCode::RateLimited
/// [`ProviderErrorCode::NotFound`]: crate::ProviderErrorCode::NotFound
pub trait RemoteCalendar: Send + Sync {
    /// Returns the name of this backend (e.g. "google").
    fn name(&self) -> &str;

    /// Lists live events whose end is at or after `time_min`, across all pages.
    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        time_min: DateTime<Utc>,
    ) -> BoxFuture<'a, ProviderResult<Vec<RemoteEvent>>>;

    /// Creates an event with a client-chosen id.
    fn insert_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Replaces the event with the same id.
    fn update_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event: &'a RemoteEvent,
    ) -> BoxFuture<'a, ProviderResult<()>>;

    /// Deletes an event by id.
    fn delete_event<'a>(
        &'a self,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn from_normalized_is_confirmed() {
        let day = EventTime::from_date(NaiveDate::from_ymd_opt(2025, 3, 7).unwrap());
        let event = NormalizedEvent::new("4220250307", "", day.clone(), day, "Asia/Tokyo");
        let remote = RemoteEvent::from_normalized(&event);

        assert_eq!(remote.id, "4220250307");
        assert_eq!(remote.summary, "(No title)");
        assert_eq!(remote.status.as_deref(), Some("confirmed"));
        assert_eq!(remote.timezone.as_deref(), Some("Asia/Tokyo"));
        assert!(!remote.is_cancelled());
    }
}
