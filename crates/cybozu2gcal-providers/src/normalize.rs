//! RawEvent to NormalizedEvent conversion.
//!
//! The normalization rules:
//! 1. A timed event whose title starts with `HH:MM` or `HH:MM-HH[:MM]` gets
//!    zoned start/end timestamps, and the time prefix is removed from the
//!    title. A missing end hour is the start hour + 1, a missing end minute
//!    is the start minute.
//! 2. A timed event without a time prefix is an all-day event on its date.
//! 3. A banner event is an all-day event spanning its detail-page range.
//!
//! The event id is [`event_id`] of the source id and the start date.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use cybozu2gcal_core::{EventTime, NormalizedEvent, event_id, local_to_zoned};
use regex::Regex;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::raw_event::{RawEvent, RawEventKind};
use crate::source::extract::BannerRange;

static TITLE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2})(?:-(\d{2})(?::(\d{2}))?)?").expect("Invalid title time regex")
});

/// A time range found at the start of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleTime {
    /// Start hour (0-23).
    pub start_hour: u32,
    /// Start minute (0-59).
    pub start_minute: u32,
    /// End hour as written, if any. May exceed 23 for events running past midnight.
    pub end_hour: Option<u32>,
    /// End minute as written, if any.
    pub end_minute: Option<u32>,
}

impl TitleTime {
    /// End hour with the default applied.
    pub fn effective_end_hour(&self) -> u32 {
        self.end_hour.unwrap_or(self.start_hour + 1)
    }

    /// End minute with the default applied.
    pub fn effective_end_minute(&self) -> u32 {
        self.end_minute.unwrap_or(self.start_minute)
    }
}

/// Splits a leading time range off a title.
///
/// Returns the parsed range (if the title starts with a valid one) and the
/// remaining title, trimmed. A prefix with out-of-range fields (e.g.
/// `25:00`) is not treated as a time and the title is returned unchanged.
pub fn parse_title_time(title: &str) -> (Option<TitleTime>, String) {
    let title = title.trim();
    let Some(caps) = TITLE_TIME.captures(title) else {
        return (None, title.to_string());
    };

    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let time = TitleTime {
        start_hour: number(1).unwrap_or(0),
        start_minute: number(2).unwrap_or(0),
        end_hour: number(3),
        end_minute: number(4),
    };

    let valid = time.start_hour <= 23
        && time.start_minute <= 59
        && time.end_hour.is_none_or(|h| h <= 47)
        && time.end_minute.is_none_or(|m| m <= 59);
    if !valid {
        return (None, title.to_string());
    }

    let rest = title[caps.get(0).map_or(0, |m| m.end())..].trim();
    (Some(time), rest.to_string())
}

/// Normalizes a raw event.
///
/// Banner events need their range from the detail page; pass it as
/// `banner_range`.
///
/// # Errors
///
/// Returns an internal error if a banner event comes without a range.
pub fn normalize_event(
    raw: &RawEvent,
    banner_range: Option<BannerRange>,
    tz: &Tz,
) -> ProviderResult<NormalizedEvent> {
    match (raw.kind, banner_range) {
        (RawEventKind::Timed(date), _) => Ok(normalize_timed(raw, date, tz)),
        (RawEventKind::BannerRange, Some(range)) => Ok(normalize_banner(raw, range, tz)),
        (RawEventKind::BannerRange, None) => Err(ProviderError::internal(format!(
            "banner event {} normalized without its date range",
            raw.source_id
        ))),
    }
}

/// Normalizes a single-day event dated `date`.
pub fn normalize_timed(raw: &RawEvent, date: NaiveDate, tz: &Tz) -> NormalizedEvent {
    let id = event_id(&raw.source_id, date);
    let (time, title) = parse_title_time(&raw.title_text);

    let Some(time) = time else {
        let day = EventTime::from_date(date);
        return NormalizedEvent::new(id, raw.title_text.trim(), day.clone(), day, tz.name());
    };

    let start_local = at(date, time.start_hour, time.start_minute);
    let mut end_local = at(date, time.effective_end_hour(), time.effective_end_minute());
    if end_local < start_local {
        debug!(
            source_id = %raw.source_id,
            title = %raw.title_text,
            "end time before start time, reading it as the next day"
        );
        end_local += Duration::days(1);
    }

    let start = local_to_zoned(tz, start_local);
    let end = local_to_zoned(tz, end_local).max(start);

    NormalizedEvent::new(
        id,
        title,
        EventTime::from_zoned(start),
        EventTime::from_zoned(end),
        tz.name(),
    )
}

/// Normalizes a banner event over its inclusive date range.
pub fn normalize_banner(raw: &RawEvent, range: BannerRange, tz: &Tz) -> NormalizedEvent {
    NormalizedEvent::new(
        event_id(&raw.source_id, range.first),
        raw.title_text.trim(),
        EventTime::from_date(range.first),
        EventTime::from_date(range.last.max(range.first)),
        tz.name(),
    )
}

/// Local wall-clock time on `date`, with hours past 23 rolling into the next days.
fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
        + Duration::hours(i64::from(hour))
        + Duration::minutes(i64::from(minute))
}
