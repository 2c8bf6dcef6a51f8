use core::fmt;

use time::{Date, Duration, Month, OffsetDateTime};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// An ISO 8601 duration (`PnYnMnWnDTnHnMnS`).
///
/// Calendar components (`years`, `months`) are kept apart from the fixed
/// ones because their length depends on the date they are added to.
/// Seconds are folded into `millis`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IsoPeriod {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodParseError {
    MissingDesignator,
    Empty,
    BadNumber(String),
    UnexpectedUnit(char),
    FractionNotAllowed(char),
}

impl fmt::Display for PeriodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodParseError::MissingDesignator => write!(f, "period must start with 'P'"),
            PeriodParseError::Empty => write!(f, "period has no components"),
            PeriodParseError::BadNumber(n) => write!(f, "bad number in period: {n:?}"),
            PeriodParseError::UnexpectedUnit(c) => write!(f, "unexpected unit '{c}' in period"),
            PeriodParseError::FractionNotAllowed(c) => {
                write!(f, "fractional value not supported for unit '{c}'")
            }
        }
    }
}

impl std::error::Error for PeriodParseError {}

impl IsoPeriod {
    pub fn millis(ms: i64) -> Self {
        Self {
            millis: ms,
            ..Self::default()
        }
    }

    pub fn days(days: i64) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn months(months: i64) -> Self {
        Self {
            months,
            ..Self::default()
        }
    }

    pub fn years(years: i64) -> Self {
        Self {
            years,
            ..Self::default()
        }
    }

    pub fn parse(input: &str) -> Result<Self, PeriodParseError> {
        let s = input.trim();
        let body = s
            .strip_prefix('P')
            .or_else(|| s.strip_prefix('p'))
            .ok_or(PeriodParseError::MissingDesignator)?;

        let mut period = IsoPeriod::default();
        let mut in_time = false;
        let mut any = false;
        let mut number = String::new();

        for c in body.chars() {
            match c {
                'T' | 't' if number.is_empty() && !in_time => in_time = true,
                '0'..='9' | '.' | ',' => number.push(if c == ',' { '.' } else { c }),
                unit => {
                    let unit = unit.to_ascii_uppercase();
                    period.apply(unit, in_time, &number)?;
                    number.clear();
                    any = true;
                }
            }
        }

        if !number.is_empty() {
            return Err(PeriodParseError::BadNumber(number));
        }
        if !any {
            return Err(PeriodParseError::Empty);
        }
        Ok(period)
    }

    fn apply(&mut self, unit: char, in_time: bool, number: &str) -> Result<(), PeriodParseError> {
        if number.is_empty() {
            return Err(PeriodParseError::BadNumber(String::new()));
        }

        if in_time && unit == 'S' {
            let seconds: f64 = number
                .parse()
                .map_err(|_| PeriodParseError::BadNumber(number.to_string()))?;
            self.millis = self.millis.saturating_add((seconds * SECOND_MS as f64).round() as i64);
            return Ok(());
        }

        if number.contains('.') {
            return Err(PeriodParseError::FractionNotAllowed(unit));
        }
        let value: i64 = number
            .parse()
            .map_err(|_| PeriodParseError::BadNumber(number.to_string()))?;

        let slot = match (in_time, unit) {
            (false, 'Y') => &mut self.years,
            (false, 'M') => &mut self.months,
            (false, 'W') => &mut self.weeks,
            (false, 'D') => &mut self.days,
            (true, 'H') => &mut self.hours,
            (true, 'M') => &mut self.minutes,
            _ => return Err(PeriodParseError::UnexpectedUnit(unit)),
        };
        *slot = slot.saturating_add(value);
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        *self == IsoPeriod::default()
    }

    /// True when any hour, minute or second component is set.
    pub fn has_sub_day_components(&self) -> bool {
        self.hours != 0 || self.minutes != 0 || self.millis != 0
    }

    /// Length assuming 30-day months and 365-day years.
    pub fn approx_millis(&self) -> i64 {
        [
            (self.years, 365 * DAY_MS),
            (self.months, 30 * DAY_MS),
            (self.weeks, 7 * DAY_MS),
            (self.days, DAY_MS),
            (self.hours, HOUR_MS),
            (self.minutes, MINUTE_MS),
            (self.millis, 1),
        ]
        .iter()
        .fold(0i64, |acc, (value, unit)| acc.saturating_add(value.saturating_mul(*unit)))
    }

    /// Every component multiplied by `k`, or `None` on overflow.
    pub fn times(&self, k: i64) -> Option<IsoPeriod> {
        Some(IsoPeriod {
            years: self.years.checked_mul(k)?,
            months: self.months.checked_mul(k)?,
            weeks: self.weeks.checked_mul(k)?,
            days: self.days.checked_mul(k)?,
            hours: self.hours.checked_mul(k)?,
            minutes: self.minutes.checked_mul(k)?,
            millis: self.millis.checked_mul(k)?,
        })
    }

    /// Adds the period to `dt`. Calendar components are applied first and
    /// clamp the day of month (Jan 31 + P1M = Feb 28 or 29).
    ///
    /// Returns `None` when the result leaves the supported calendar range.
    pub fn add_to(&self, dt: OffsetDateTime) -> Option<OffsetDateTime> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let dt = if months != 0 {
            dt.replace_date(add_months(dt.date(), months)?)
        } else {
            dt
        };

        let seconds = self
            .weeks
            .checked_mul(7 * 86_400)?
            .checked_add(self.days.checked_mul(86_400)?)?
            .checked_add(self.hours.checked_mul(3_600)?)?
            .checked_add(self.minutes.checked_mul(60)?)?;
        let fixed = Duration::seconds(seconds).checked_add(Duration::milliseconds(self.millis))?;
        dt.checked_add(fixed)
    }
}

fn add_months(date: Date, months: i64) -> Option<Date> {
    let total = i64::from(date.year())
        .checked_mul(12)?
        .checked_add(i64::from(u8::from(date.month())) - 1)?
        .checked_add(months)?;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(total.rem_euclid(12) + 1).ok()?).ok()?;

    let mut day = date.day();
    loop {
        match Date::from_calendar_date(year, month, day) {
            Ok(d) => return Some(d),
            Err(_) if day > 28 => day -= 1,
            Err(_) => return None,
        }
    }
}

impl fmt::Display for IsoPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        for (value, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if value != 0 {
                write!(f, "{value}{unit}")?;
            }
        }
        if self.has_sub_day_components() {
            f.write_str("T")?;
            if self.hours != 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes != 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.millis != 0 {
                if self.millis % SECOND_MS == 0 {
                    write!(f, "{}S", self.millis / SECOND_MS)?;
                } else {
                    write!(f, "{}S", self.millis as f64 / SECOND_MS as f64)?;
                }
            }
        }
        Ok(())
    }
}

/// Picks a sampling step for a span that declares none.
///
/// Walks a fixed ladder (1ms, 1s, 1min, 1h, 1d, 1w, 1 month, 1 year,
/// 10 years, 100 years) and returns the smallest rung that covers the span in
/// at most ~1000 steps. Spans beyond the ladder get 100 years.
///
/// # Panics
///
/// If `span_ms` is negative.
pub fn resolve_step(span_ms: i64) -> IsoPeriod {
    assert!(span_ms >= 0, "resolve_step: negative span {span_ms}ms");

    let ladder = [
        IsoPeriod::millis(1),
        IsoPeriod::millis(SECOND_MS),
        IsoPeriod::millis(MINUTE_MS),
        IsoPeriod::millis(HOUR_MS),
        IsoPeriod::days(1),
        IsoPeriod::days(7),
        IsoPeriod::months(1),
        IsoPeriod::years(1),
        IsoPeriod::years(10),
        IsoPeriod::years(100),
    ];

    ladder
        .iter()
        .copied()
        .find(|rung| rung.approx_millis().saturating_mul(1_000) >= span_ms)
        .unwrap_or(IsoPeriod::years(100))
}
