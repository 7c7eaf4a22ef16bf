//! Raw event type scraped from the source calendar.
//!
//! This module defines [`RawEvent`], the semi-structured record produced by
//! the extractor before any date/time normalization. It keeps the fields as
//! they appear in the markup so the normalizer can decide how to interpret
//! them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The kind of a raw event, which decides how its dates are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "date", rename_all = "snake_case")]
pub enum RawEventKind {
    /// A single-day event. The date comes from the href `Date=da.Y.M.D`
    /// token; the time, if any, is a prefix of the title.
    Timed(NaiveDate),
    /// A multi-day banner event. The date range lives on a separate detail
    /// page that must be fetched.
    BannerRange,
}

/// A raw event extracted from a source calendar page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Numeric source event id (the `sEID` token).
    pub source_id: String,
    /// Query string of the event link, starting with `?`.
    pub href_query: String,
    /// Visible title, trimmed. Timed titles still carry their time prefix.
    pub title_text: String,
    /// How the event dates are resolved.
    pub kind: RawEventKind,
}

impl RawEvent {
    /// Creates a single-day event.
    pub fn timed(
        source_id: impl Into<String>,
        href_query: impl Into<String>,
        title_text: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            href_query: href_query.into(),
            title_text: title_text.into(),
            kind: RawEventKind::Timed(date),
        }
    }

    /// Creates a banner event.
    pub fn banner(
        source_id: impl Into<String>,
        href_query: impl Into<String>,
        title_text: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            href_query: href_query.into(),
            title_text: title_text.into(),
            kind: RawEventKind::BannerRange,
        }
    }

    /// Returns true if the date range must be fetched from a detail page.
    pub fn is_banner(&self) -> bool {
        matches!(self.kind, RawEventKind::BannerRange)
    }

    /// Returns the date of a single-day event.
    pub fn date(&self) -> Option<NaiveDate> {
        match self.kind {
            RawEventKind::Timed(date) => Some(date),
            RawEventKind::BannerRange => None,
        }
    }

    /// Key identifying the same source event across month pages.
    ///
    /// A banner spanning a month boundary shows up on both month views, and
    /// so does a day at the edge of the visible grid.
    pub fn dedupe_key(&self) -> (&str, RawEventKind) {
        (&self.source_id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn timed_event_creation() {
        let event = RawEvent::timed(
            "42",
            "?page=ScheduleView&sEID=42",
            "10:00 Standup",
            date(2025, 3, 7),
        );
        assert!(!event.is_banner());
        assert_eq!(event.date(), Some(date(2025, 3, 7)));
        assert_eq!(event.title_text, "10:00 Standup");
    }

    #[test]
    fn banner_event_has_no_date() {
        let event = RawEvent::banner("7", "?page=ScheduleView&sEID=7", "Trade fair");
        assert!(event.is_banner());
        assert!(event.date().is_none());
    }

    #[test]
    fn dedupe_key_separates_days_of_same_source() {
        let a = RawEvent::timed("42", "?a", "x", date(2025, 3, 7));
        let b = RawEvent::timed("42", "?b", "x", date(2025, 3, 8));
        let c = RawEvent::timed("42", "?c", "y", date(2025, 3, 7));
        assert_ne!(a.dedupe_key(), b.dedupe_key());
        assert_eq!(a.dedupe_key(), c.dedupe_key());
    }

    #[test]
    fn serde_shape() {
        let event = RawEvent::timed("1", "?q", "t", date(2025, 3, 7));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "timed");
        assert_eq!(json["kind"]["date"], "2025-03-07");
    }
}
