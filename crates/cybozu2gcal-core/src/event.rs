//! Event types shared by the source, the sync engine and the remote client.
//!
//! - [`NormalizedEvent`]: the canonical event pushed to the remote calendar
//! - [`event_id`]: the deterministic id scheme that makes upserts idempotent

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// Builds the deterministic remote id for a source event.
///
/// The id is the source event id followed by the zero-padded start date
/// (`YYYYMMDD`). Only digits are produced, which keeps the id inside the
/// character set remote calendars accept for client-chosen ids.
pub fn event_id(source_id: &str, start: NaiveDate) -> String {
    format!(
        "{}{:04}{:02}{:02}",
        source_id,
        start.year(),
        start.month(),
        start.day()
    )
}

/// A calendar event ready to be written to the remote calendar.
///
/// # Invariants
///
/// - `id` depends only on the source event id and the start date, so syncing
///   the same source event twice targets the same remote record.
/// - `end` is never before `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Deterministic remote id.
    pub id: String,
    /// Event title with any leading time range removed.
    pub title: String,
    /// When the event starts.
    pub start: EventTime,
    /// When the event ends.
    pub end: EventTime,
    /// IANA timezone name the event was normalized in (e.g. `Asia/Tokyo`).
    pub timezone: String,
}

impl NormalizedEvent {
    /// Creates a new normalized event.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: EventTime,
        end: EventTime,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            timezone: timezone.into(),
        }
    }

    /// Returns true if this is an all-day event.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Returns the title, falling back to "(No title)" if empty.
    pub fn effective_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() { "(No title)" } else { title }
    }
}
