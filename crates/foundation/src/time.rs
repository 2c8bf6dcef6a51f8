//! Time primitives.
//!
//! `Time` is an integral millisecond instant so interval arithmetic and
//! ordering are exact. Calendar-aware work (parsing, formatting, adding
//! months) goes through `ParsedInstant`, which keeps the UTC offset the
//! source declared.

use core::fmt;

use serde::{Deserialize, Serialize};
use ::time::format_description::well_known::Rfc3339;
use ::time::macros::format_description;
use ::time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Milliseconds since the Unix epoch (UTC).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(pub i64);

impl Time {
    pub const fn millis(self) -> i64 {
        self.0
    }

    pub fn offset_by(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    pub fn millis_since(self, earlier: Time) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn parse_iso8601(input: &str) -> Result<Self, TimeError> {
        ParsedInstant::parse(input).map(|p| p.time())
    }

    pub fn from_datetime(dt: OffsetDateTime) -> Self {
        Self(dt.unix_timestamp_nanos().div_euclid(1_000_000) as i64)
    }

    pub fn to_datetime(self, offset: UtcOffset) -> Result<OffsetDateTime, TimeError> {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000)
            .map(|dt| dt.to_offset(offset))
            .map_err(|_| TimeError::OutOfRange)
    }

    /// RFC 3339 in UTC, or the raw millisecond count if the instant cannot be
    /// represented as a calendar date.
    pub fn to_iso8601(self) -> String {
        self.to_datetime(UtcOffset::UTC)
            .ok()
            .and_then(|dt| dt.format(&Rfc3339).ok())
            .unwrap_or_else(|| format!("{}ms", self.0))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Half-open span `[start, end)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeSpan {
    pub start: Time,
    pub end: Time,
}

impl TimeSpan {
    pub fn new(start: Time, end: Time) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: Time) -> bool {
        t >= self.start && t < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn duration_ms(&self) -> i64 {
        self.end.millis_since(self.start).max(0)
    }
}

/// Opaque key identifying the imagery of one time sample.
///
/// Usually the ISO 8601 text a map service expects in its time parameter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeTag(String);

impl TimeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TimeTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TimeTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    Unparseable(String),
    OutOfRange,
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeError::Unparseable(input) => write!(f, "not an ISO 8601 instant: {input:?}"),
            TimeError::OutOfRange => write!(f, "instant outside the representable calendar range"),
        }
    }
}

impl std::error::Error for TimeError {}

/// An instant as written by a data source.
///
/// Accepted forms:
/// - RFC 3339 (`2020-01-01T00:00:00Z`, `2004-01-01T14:10:00.5+10:00`)
/// - minute precision (`2000-06-18T14:30Z`)
/// - naive timestamps, assumed UTC (`2004-01-01 14:10:00`)
/// - dates (`2020-01-01`), midnight UTC with no time-of-day
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ParsedInstant {
    datetime: OffsetDateTime,
    has_time_of_day: bool,
}

impl ParsedInstant {
    pub fn parse(input: &str) -> Result<Self, TimeError> {
        let s = input.trim();
        if let Ok(datetime) = OffsetDateTime::parse(s, &Rfc3339) {
            return Ok(Self::new(datetime, true));
        }
        if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
            return Ok(Self::new(date.midnight().assume_utc(), false));
        }

        let naive = s
            .strip_suffix('Z')
            .or_else(|| s.strip_suffix('z'))
            .unwrap_or(s)
            .replacen(' ', "T", 1);
        parse_naive(&naive)
            .map(|dt| Self::new(dt.assume_offset(UtcOffset::UTC), true))
            .ok_or_else(|| TimeError::Unparseable(input.to_string()))
    }

    pub fn new(datetime: OffsetDateTime, has_time_of_day: bool) -> Self {
        Self {
            datetime,
            has_time_of_day,
        }
    }

    pub fn time(&self) -> Time {
        Time::from_datetime(self.datetime)
    }

    pub fn datetime(&self) -> OffsetDateTime {
        self.datetime
    }

    pub fn offset(&self) -> UtcOffset {
        self.datetime.offset()
    }

    /// False only for date-only input.
    pub fn has_time_of_day(&self) -> bool {
        self.has_time_of_day
    }
}

fn parse_naive(s: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        )
    })
    .or_else(|_| PrimitiveDateTime::parse(s, format_description!("[year]-[month]-[day]T[hour]:[minute]")))
    .ok()
}

/// Formats a sample instant as a tag: `YYYY-MM-DD` when `date_only`,
/// RFC 3339 in the instant's own offset otherwise.
pub fn format_tag(datetime: OffsetDateTime, date_only: bool) -> Result<TimeTag, TimeError> {
    let text = if date_only {
        datetime
            .date()
            .format(format_description!("[year]-[month]-[day]"))
    } else {
        datetime.format(&Rfc3339)
    };
    text.map(TimeTag).map_err(|_| TimeError::OutOfRange)
}
