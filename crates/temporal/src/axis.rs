use core::fmt;

use foundation::time::{ParsedInstant, Time, TimeError, TimeTag, format_tag};
use time::OffsetDateTime;
use tracing::warn;

use crate::duration::{IsoPeriod, resolve_step};
use crate::intervals::{IntervalCollection, IntervalError};

/// One discrete instant of a time axis and the tag that names its imagery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub time: Time,
    pub tag: TimeTag,
}

impl Sample {
    pub fn new(time: Time, tag: TimeTag) -> Self {
        Self { time, tag }
    }
}

/// Ordered samples with at least two entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscreteAxis {
    samples: Vec<Sample>,
    period: Option<IsoPeriod>,
    truncated: bool,
}

impl DiscreteAxis {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Step between samples; `None` for axes built from explicit instants.
    pub fn period(&self) -> Option<IsoPeriod> {
        self.period
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &TimeTag> {
        self.samples.iter().map(|s| &s.tag)
    }

    pub fn to_intervals(&self) -> Result<IntervalCollection, IntervalError> {
        IntervalCollection::from_samples(&self.samples).map(Option::unwrap_or_default)
    }
}

/// Non-fatal problems found while building an axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisWarning {
    /// More than `cap` natural samples existed; the rest were dropped.
    Truncated { cap: usize },
    /// The declared period was unusable and a derived one was used.
    InvalidPeriod(String),
}

impl fmt::Display for AxisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisWarning::Truncated { cap } => {
                write!(f, "time axis has more than {cap} samples; later times were dropped")
            }
            AxisWarning::InvalidPeriod(p) => write!(f, "invalid period {p:?}; derived one instead"),
        }
    }
}

/// Result of building an axis.
///
/// `axis` is `None` when the input collapses to a single sample: the source
/// is not time-varying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisBuild {
    pub axis: Option<DiscreteAxis>,
    pub warnings: Vec<AxisWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisError {
    Instant(TimeError),
    StopBeforeStart { start: String, stop: String },
    MalformedExtent(String),
    /// The sample cap must keep at least one sample.
    ZeroCap,
}

impl fmt::Display for AxisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisError::Instant(e) => write!(f, "{e}"),
            AxisError::StopBeforeStart { start, stop } => {
                write!(f, "time extent stops ({stop}) before it starts ({start})")
            }
            AxisError::MalformedExtent(s) => write!(f, "malformed time extent: {s:?}"),
            AxisError::ZeroCap => write!(f, "time axis sample cap must be at least 1"),
        }
    }
}

impl std::error::Error for AxisError {}

impl From<TimeError> for AxisError {
    fn from(value: TimeError) -> Self {
        AxisError::Instant(value)
    }
}

/// Builds the discrete axis for `start/stop[/period]`.
///
/// - Samples are `start + k * period` for every `k` with the result `<= stop`.
/// - At most `max_samples` natural samples are kept; dropping any raises
///   `AxisWarning::Truncated`.
/// - `stop` is appended whenever the last kept sample differs from it, so a
///   truncated axis holds at most `max_samples + 1` samples.
/// - A missing, unparseable or zero period is replaced by `resolve_step`.
/// - A step that leaves the calendar range is past `stop` and ends the axis.
/// - `max_samples == 0` is rejected with `AxisError::ZeroCap`.
/// - Tags are date-only when the period has no sub-day part and `start` had no
///   time of day; otherwise RFC 3339 in the offset `start` was written in.
pub fn build_axis(
    start: &str,
    stop: &str,
    period: Option<&str>,
    max_samples: usize,
) -> Result<AxisBuild, AxisError> {
    if max_samples == 0 {
        return Err(AxisError::ZeroCap);
    }
    let start_at = ParsedInstant::parse(start)?;
    let stop_at = ParsedInstant::parse(stop)?;
    if stop_at.time() < start_at.time() {
        return Err(AxisError::StopBeforeStart {
            start: start.to_string(),
            stop: stop.to_string(),
        });
    }

    let mut warnings = Vec::new();
    let span_ms = stop_at.time().millis_since(start_at.time());
    let period = match period.map(str::trim).filter(|p| !p.is_empty()) {
        None => resolve_step(span_ms),
        Some(text) => match IsoPeriod::parse(text) {
            Ok(p) if !p.is_zero() && p.approx_millis() > 0 => p,
            _ => {
                let derived = resolve_step(span_ms);
                warn!(period = %text, derived = %derived, "invalid time period; using derived step");
                warnings.push(AxisWarning::InvalidPeriod(text.to_string()));
                derived
            }
        },
    };

    let date_only = !period.has_sub_day_components() && !start_at.has_time_of_day();
    let cap = max_samples;
    let stop_time = stop_at.time();

    let mut samples: Vec<Sample> = Vec::new();
    let mut truncated = false;
    for k in 0i64.. {
        let Some(at) = sample_at(start_at.datetime(), &period, k) else {
            break;
        };
        if Time::from_datetime(at) > stop_time {
            break;
        }
        if samples.len() == cap {
            truncated = true;
            break;
        }
        samples.push(Sample::new(Time::from_datetime(at), format_tag(at, date_only)?));
    }

    if samples.last().map(|s| s.time) != Some(stop_time) {
        let at = stop_at.datetime().to_offset(start_at.offset());
        let stop_date_only = date_only && !stop_at.has_time_of_day();
        samples.push(Sample::new(stop_time, format_tag(at, stop_date_only)?));
    }

    if truncated {
        warn!(cap, start, stop, "time axis truncated");
        warnings.push(AxisWarning::Truncated { cap });
    }

    let axis = (samples.len() > 1).then_some(DiscreteAxis {
        samples,
        period: Some(period),
        truncated,
    });
    Ok(AxisBuild { axis, warnings })
}

/// `None` once `start + k * period` leaves the calendar range.
fn sample_at(start: OffsetDateTime, period: &IsoPeriod, k: i64) -> Option<OffsetDateTime> {
    if k == 0 {
        return Some(start);
    }
    period.times(k).and_then(|p| p.add_to(start))
}

/// A time dimension as advertised by a map service: `start/stop[/period]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeDimension {
    pub start: String,
    pub stop: String,
    pub period: Option<String>,
}

/// One comma-separated item of a dimension's value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtentItem {
    Instant(String),
    Range(TimeDimension),
}

impl TimeDimension {
    pub fn new(start: impl Into<String>, stop: impl Into<String>, period: Option<String>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
            period,
        }
    }

    pub fn parse_extent(text: &str) -> Result<Self, AxisError> {
        let parts: Vec<&str> = text.trim().split('/').map(str::trim).collect();
        match parts.as_slice() {
            [start, stop] if !start.is_empty() && !stop.is_empty() => {
                Ok(Self::new(*start, *stop, None))
            }
            [start, stop, period] if !start.is_empty() && !stop.is_empty() => {
                Ok(Self::new(*start, *stop, Some(period.to_string())))
            }
            _ => Err(AxisError::MalformedExtent(text.to_string())),
        }
    }

    /// Splits `a,b/c/P1D,d` into instants and ranges, in input order.
    pub fn parse_extent_list(text: &str) -> Result<Vec<ExtentItem>, AxisError> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|item| {
                if item.contains('/') {
                    Self::parse_extent(item).map(ExtentItem::Range)
                } else {
                    Ok(ExtentItem::Instant(item.to_string()))
                }
            })
            .collect()
    }

    pub fn build(&self, max_samples: usize) -> Result<AxisBuild, AxisError> {
        build_axis(&self.start, &self.stop, self.period.as_deref(), max_samples)
    }
}

/// Builds one axis from a whole dimension value list.
///
/// Ranges expand through `build_axis`; bare instants are used as written.
/// Samples are sorted and duplicates dropped. The cap applies per range.
pub fn build_axis_from_list(text: &str, max_samples: usize) -> Result<AxisBuild, AxisError> {
    if max_samples == 0 {
        return Err(AxisError::ZeroCap);
    }
    let mut samples: Vec<Sample> = Vec::new();
    let mut warnings = Vec::new();
    let mut truncated = false;

    for item in TimeDimension::parse_extent_list(text)? {
        match item {
            ExtentItem::Instant(text) => {
                let at = ParsedInstant::parse(&text)?;
                samples.push(Sample::new(at.time(), TimeTag::new(text)));
            }
            ExtentItem::Range(dim) => {
                let built = dim.build(max_samples)?;
                warnings.extend(built.warnings);
                match built.axis {
                    Some(axis) => {
                        truncated |= axis.truncated;
                        samples.extend(axis.samples);
                    }
                    None => {
                        let at = ParsedInstant::parse(&dim.start)?;
                        samples.push(Sample::new(at.time(), TimeTag::new(dim.start.clone())));
                    }
                }
            }
        }
    }

    samples.sort_by_key(|s| s.time);
    samples.dedup_by_key(|s| s.time);

    let axis = (samples.len() > 1).then_some(DiscreteAxis {
        samples,
        period: None,
        truncated,
    });
    Ok(AxisBuild { axis, warnings })
}

#[cfg(test)]
mod tests {
    use super::{AxisError, AxisWarning, ExtentItem, TimeDimension, build_axis, build_axis_from_list};
    use crate::duration::IsoPeriod;
    use foundation::time::Time;

    fn tags(build: &super::AxisBuild) -> Vec<String> {
        build
            .axis
            .as_ref()
            .map(|a| a.tags().map(|t| t.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn ten_second_span_resolves_to_one_second_steps() {
        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", None, 1000).unwrap();
        let axis = build.axis.as_ref().unwrap();
        assert_eq!(axis.len(), 11);
        assert_eq!(axis.period(), Some(IsoPeriod::millis(1_000)));
        assert_eq!(axis.samples()[0].tag.as_str(), "2020-01-01T00:00:00Z");
        assert_eq!(axis.samples()[10].tag.as_str(), "2020-01-01T00:00:10Z");
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn even_period_covers_start_to_stop() {
        let build = build_axis("2020-01-01", "2020-01-05", Some("P1D"), 1000).unwrap();
        assert_eq!(
            tags(&build),
            vec!["2020-01-01", "2020-01-02", "2020-01-03", "2020-01-04", "2020-01-05"]
        );
    }

    #[test]
    fn uneven_period_appends_stop() {
        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:25Z", Some("PT10S"), 1000).unwrap();
        let axis = build.axis.unwrap();
        let times: Vec<_> = axis.samples().iter().map(|s| s.time.millis() % 60_000).collect();
        assert_eq!(times, vec![0, 10_000, 20_000, 25_000]);
    }

    #[test]
    fn cap_truncates_and_warns() {
        let build = build_axis("2020-01-01", "2020-12-31", Some("P1D"), 10).unwrap();
        let axis = build.axis.as_ref().unwrap();
        assert!(axis.truncated());
        assert_eq!(axis.len(), 11);
        assert_eq!(axis.samples()[9].tag.as_str(), "2020-01-10");
        assert_eq!(axis.samples()[10].tag.as_str(), "2020-12-31");
        assert_eq!(build.warnings, vec![AxisWarning::Truncated { cap: 10 }]);
    }

    #[test]
    fn exact_cap_does_not_warn() {
        let build = build_axis("2020-01-01", "2020-01-10", Some("P1D"), 10).unwrap();
        assert_eq!(build.axis.unwrap().len(), 10);
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn single_sample_is_static() {
        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:00Z", None, 1000).unwrap();
        assert!(build.axis.is_none());

        let build = build_axis("2020-01-01", "2020-01-01", Some("P1D"), 1000).unwrap();
        assert!(build.axis.is_none());
    }

    #[test]
    fn sub_day_period_forces_timestamps() {
        let build = build_axis("2020-01-01", "2020-01-01T02:00:00Z", Some("PT1H"), 1000).unwrap();
        assert_eq!(
            tags(&build),
            vec!["2020-01-01T00:00:00Z", "2020-01-01T01:00:00Z", "2020-01-01T02:00:00Z"]
        );
    }

    #[test]
    fn time_of_day_on_start_forces_timestamps() {
        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-03T00:00:00Z", Some("P1D"), 1000).unwrap();
        assert_eq!(tags(&build)[1], "2020-01-02T00:00:00Z");
    }

    #[test]
    fn samples_keep_the_start_offset() {
        let build = build_axis("2020-01-01T00:00:00+10:00", "2020-01-01T02:00:00+10:00", Some("PT1H"), 1000).unwrap();
        assert_eq!(tags(&build)[1], "2020-01-01T01:00:00+10:00");
    }

    #[test]
    fn invalid_or_zero_period_is_replaced() {
        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", Some("bogus"), 1000).unwrap();
        assert_eq!(build.axis.as_ref().unwrap().len(), 11);
        assert_eq!(build.warnings, vec![AxisWarning::InvalidPeriod("bogus".into())]);

        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", Some("PT0S"), 1000).unwrap();
        assert_eq!(build.axis.unwrap().period(), Some(IsoPeriod::millis(1_000)));
    }

    #[test]
    fn monthly_axis_clamps_month_ends() {
        let build = build_axis("2021-01-31", "2021-04-30", Some("P1M"), 1000).unwrap();
        assert_eq!(
            tags(&build),
            vec!["2021-01-31", "2021-02-28", "2021-03-31", "2021-04-30"]
        );
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", None, 0).unwrap_err();
        assert_eq!(err, AxisError::ZeroCap);

        let build = build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", None, 1).unwrap();
        assert_eq!(build.axis.unwrap().len(), 2);
        assert_eq!(build.warnings, vec![AxisWarning::Truncated { cap: 1 }]);
    }

    #[test]
    fn period_leaving_the_calendar_ends_the_axis() {
        let build = build_axis("2020-01-01", "2021-01-01", Some("P9000Y"), 1000).unwrap();
        assert_eq!(tags(&build), vec!["2020-01-01", "2021-01-01"]);
        assert!(build.warnings.is_empty());
    }

    #[test]
    fn stop_before_start_is_an_error() {
        let err = build_axis("2020-01-02", "2020-01-01", None, 10).unwrap_err();
        assert!(matches!(err, AxisError::StopBeforeStart { .. }));
    }

    #[test]
    fn parses_extents() {
        let dim = TimeDimension::parse_extent("2020-01-01/2020-02-01/P1D").unwrap();
        assert_eq!(dim.period.as_deref(), Some("P1D"));
        assert!(TimeDimension::parse_extent("2020-01-01").is_err());
        assert!(TimeDimension::parse_extent("/2020-01-01").is_err());

        let items = TimeDimension::parse_extent_list("2019-06-01, 2020-01-01/2020-01-03/P1D").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], ExtentItem::Instant("2019-06-01".into()));
    }

    #[test]
    fn list_merges_instants_and_ranges_in_time_order() {
        let build = build_axis_from_list("2020-01-02/2020-01-03/P1D,2019-06-01,2020-01-02", 1000).unwrap();
        let axis = build.axis.unwrap();
        let times: Vec<Time> = axis.samples().iter().map(|s| s.time).collect();
        assert_eq!(times.len(), 3);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(axis.samples()[0].tag.as_str(), "2019-06-01");
        assert_eq!(axis.period(), None);
    }
}
