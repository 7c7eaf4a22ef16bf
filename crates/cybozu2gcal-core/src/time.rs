//! Time types for calendar events.
//!
//! This module provides [`EventTime`] for representing event start/end times
//! (either a zoned timestamp or an all-day date), and [`SyncWindow`], the
//! rolling date range that a sync run owns on the remote calendar.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, LocalResult, Months, NaiveDate,
    NaiveDateTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Represents the time of a calendar event.
///
/// Calendar events can have two types of times:
/// - **DateTime**: A specific point in time, keeping the offset of the zone
///   it was created in
/// - **AllDay**: A date without a specific time (all-day events)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime with its UTC offset.
    DateTime(DateTime<FixedOffset>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_zoned<Z: TimeZone>(dt: DateTime<Z>) -> Self {
        Self::DateTime(dt.fixed_offset())
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the datetime if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an `AllDay` variant.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::AllDay(d) => Some(d),
            Self::DateTime(_) => None,
        }
    }

    /// Returns the calendar date of this time as seen in `tz`.
    pub fn date_in(&self, tz: &Tz) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }

    /// Converts to a UTC instant for comparison purposes.
    ///
    /// All-day dates are taken at local midnight in `tz`.
    pub fn to_utc_in(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => dt.with_timezone(&Utc),
            Self::AllDay(date) => local_to_zoned(tz, date.and_time(chrono::NaiveTime::MIN))
                .with_timezone(&Utc),
        }
    }
}

/// Resolves a wall-clock time in `tz` to a single instant.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times that do not
/// exist (DST spring-forward) move forward to the first valid instant.
pub fn local_to_zoned(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Gaps are at most a few hours; step forward until we land.
            let mut probe = naive;
            for _ in 0..(4 * 60) {
                probe += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt;
                }
            }
            tz.from_utc_datetime(&naive)
        }
    }
}

/// The date range a sync run owns on the remote calendar.
///
/// Represents a half-open interval of local dates `[start, end)` in the sync
/// timezone. Events before `start` are history and are never touched; events
/// inside the window are deleted and re-created from the source on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWindow {
    /// First owned date (inclusive).
    pub start: NaiveDate,
    /// First date past the window (exclusive).
    pub end: NaiveDate,
    /// Timezone in which dates are interpreted.
    pub tz: Tz,
}

impl SyncWindow {
    /// Creates a new window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate, tz: Tz) -> Self {
        assert!(start <= end, "SyncWindow start must be <= end");
        Self { start, end, tz }
    }

    /// Computes the window for a run happening at `now`.
    ///
    /// The window starts `lookback_days` before today (local date in `tz`) and
    /// ends at the first day of the month following the current month plus
    /// `months_ahead` further months. Both ends saturate at the supported
    /// date range.
    pub fn compute(now: DateTime<Utc>, tz: Tz, lookback_days: u32, months_ahead: u32) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let start = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        let end = first_of_month(today)
            .checked_add_months(Months::new(months_ahead.saturating_add(1)))
            .unwrap_or(NaiveDate::MAX);
        Self::new(start, end, tz)
    }

    /// Returns true if the date lies inside the window.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Returns true if the event time lies inside the window.
    ///
    /// Timestamps are compared by their local date in the window timezone, so
    /// an event earlier today is still inside a window starting today.
    pub fn contains(&self, time: &EventTime) -> bool {
        self.contains_date(time.date_in(&self.tz))
    }

    /// Returns true if a date range ending on `last` (inclusive) overlaps the window.
    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        last >= self.start && first < self.end
    }

    /// Returns the first day of every month the window touches, in order.
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months = Vec::new();
        let mut month = first_of_month(self.start);
        while month < self.end {
            months.push(month);
            match month.checked_add_months(Months::new(1)) {
                Some(next) => month = next,
                None => break,
            }
        }
        months
    }

    /// Returns the window start as a UTC instant (local midnight).
    pub fn start_utc(&self) -> DateTime<Utc> {
        EventTime::AllDay(self.start).to_utc_in(&self.tz)
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
