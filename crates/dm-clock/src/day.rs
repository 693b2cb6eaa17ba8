// day.rs — Civil days in a fixed reference zone.
//
// A civil day is a calendar date computed in one fixed offset (not the device
// locale). "Today", lead-time checks, per-day caps and streak state are all
// keyed by it.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ClockError;

/// Minutes east of UTC used when no zone is configured (UTC+09:00).
pub const DEFAULT_OFFSET_MINUTES: i32 = 9 * 60;

/// The fixed zone civil days are computed in.
///
/// Serializes as minutes east of UTC so config files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct ReferenceZone {
    offset: FixedOffset,
}

impl ReferenceZone {
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ClockError> {
        let offset = minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ClockError::InvalidOffset(minutes))?;
        Ok(Self { offset })
    }

    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset.local_minus_utc() / 60
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self::from_offset_minutes(DEFAULT_OFFSET_MINUTES).unwrap_or_else(|_| Self::utc())
    }
}

impl TryFrom<i32> for ReferenceZone {
    type Error = ClockError;

    fn try_from(minutes: i32) -> Result<Self, Self::Error> {
        Self::from_offset_minutes(minutes)
    }
}

impl From<ReferenceZone> for i32 {
    fn from(zone: ReferenceZone) -> Self {
        zone.offset_minutes()
    }
}

/// A civil day. Orders chronologically and displays as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following day (saturates at chrono's maximum date).
    pub fn next(&self) -> Self {
        Self(self.0.checked_add_days(Days::new(1)).unwrap_or(self.0))
    }

    /// The preceding day (saturates at chrono's minimum date).
    pub fn prev(&self) -> Self {
        Self(self.0.checked_sub_days(Days::new(1)).unwrap_or(self.0))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = ClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ClockError::InvalidDayKey(s.to_string()))
    }
}

/// The civil day `instant` falls on in `zone`.
pub fn civil_day(instant: DateTime<Utc>, zone: ReferenceZone) -> DayKey {
    DayKey(instant.with_timezone(&zone.offset()).date_naive())
}

/// Wall-clock time of `instant` in `zone`.
pub fn local_time(instant: DateTime<Utc>, zone: ReferenceZone) -> NaiveTime {
    instant.with_timezone(&zone.offset()).time()
}

/// Whether `instant` falls on the same civil day as `now`.
pub fn is_today(instant: DateTime<Utc>, now: DateTime<Utc>, zone: ReferenceZone) -> bool {
    civil_day(instant, zone) == civil_day(now, zone)
}

/// UTC bounds of a civil day: `[start, end)`.
pub fn day_bounds(day: DayKey, zone: ReferenceZone) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::seconds(i64::from(zone.offset().local_minus_utc()));
    let start_local = day.0.and_time(NaiveTime::MIN);
    let start = Utc.from_utc_datetime(&(start_local - offset));
    (start, start + Duration::days(1))
}

/// Whether `instant` reads exactly 00:00 on the local wall clock.
pub fn is_local_midnight(instant: DateTime<Utc>, zone: ReferenceZone) -> bool {
    let t = local_time(instant, zone);
    t.hour() == 0 && t.minute() == 0
}

/// Move a 00:00 local target to 00:30 on the same civil day.
///
/// Midnight targets are ambiguous between "end of yesterday" and "start of
/// today" and are rejected by validation, so callers normalize first.
pub fn normalize_midnight(instant: DateTime<Utc>, zone: ReferenceZone) -> DateTime<Utc> {
    if is_local_midnight(instant, zone) {
        let (start, _) = day_bounds(civil_day(instant, zone), zone);
        start + Duration::minutes(30)
    } else {
        instant
    }
}
