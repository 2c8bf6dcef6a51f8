use core::fmt;

use foundation::time::{Time, TimeSpan, TimeTag};

use crate::axis::Sample;

/// A half-open span mapped to the tag of the imagery that covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub span: TimeSpan,
    pub tag: TimeTag,
}

impl Interval {
    pub fn new(start: Time, stop: Time, tag: impl Into<TimeTag>) -> Self {
        Self {
            span: TimeSpan::new(start, stop),
            tag: tag.into(),
        }
    }

    pub fn contains(&self, t: Time) -> bool {
        self.span.contains(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// `stop <= start` for the interval at `index`.
    EmptySpan { index: usize },
    /// The interval at `index` starts before the previous one stops.
    OutOfOrder { index: usize },
}

impl fmt::Display for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalError::EmptySpan { index } => write!(f, "interval {index} is empty"),
            IntervalError::OutOfOrder { index } => {
                write!(f, "interval {index} overlaps or precedes the interval before it")
            }
        }
    }
}

impl std::error::Error for IntervalError {}

/// Ordered, non-overlapping intervals.
///
/// Ordering contract:
/// - intervals are sorted by start and `stop(i) <= start(i + 1)`.
/// - gaps between intervals are allowed and mean "no imagery".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalCollection {
    intervals: Vec<Interval>,
}

impl IntervalCollection {
    pub fn new(intervals: Vec<Interval>) -> Result<Self, IntervalError> {
        for (index, interval) in intervals.iter().enumerate() {
            if interval.span.is_empty() {
                return Err(IntervalError::EmptySpan { index });
            }
            if index > 0 && interval.span.start < intervals[index - 1].span.end {
                return Err(IntervalError::OutOfOrder { index });
            }
        }
        Ok(Self { intervals })
    }

    /// Contiguous intervals from strictly increasing samples: sample `i`
    /// covers `[t_i, t_i+1)` and the last sample reuses the length of the one
    /// before it.
    ///
    /// Fewer than two samples is not time-varying and yields `Ok(None)`.
    pub fn from_samples(samples: &[Sample]) -> Result<Option<Self>, IntervalError> {
        if samples.len() < 2 {
            return Ok(None);
        }

        let mut intervals = Vec::with_capacity(samples.len());
        for pair in samples.windows(2) {
            intervals.push(Interval::new(pair[0].time, pair[1].time, pair[0].tag.clone()));
        }

        let last = &samples[samples.len() - 1];
        let prev = &samples[samples.len() - 2];
        let stop = last.time.offset_by(last.time.millis_since(prev.time));
        intervals.push(Interval::new(last.time, stop, last.tag.clone()));

        Self::new(intervals).map(Some)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Interval> {
        self.intervals.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn start(&self) -> Option<Time> {
        self.intervals.first().map(|i| i.span.start)
    }

    pub fn stop(&self) -> Option<Time> {
        self.intervals.last().map(|i| i.span.end)
    }

    /// Index of the interval containing `t`.
    ///
    /// When no interval contains `t` the result is negative: the bitwise
    /// complement (`!i`) of the index at which an interval starting at `t`
    /// would be inserted.
    pub fn index_of(&self, t: Time) -> isize {
        let insert_at = self.intervals.partition_point(|i| i.span.start <= t);
        if insert_at > 0 && self.intervals[insert_at - 1].contains(t) {
            (insert_at - 1) as isize
        } else {
            !(insert_at as isize)
        }
    }

    /// Nearest instant that has imagery, for snapping a requested time.
    ///
    /// - inside an interval: that interval's start
    /// - before all intervals: the first start
    /// - after all intervals: the last stop
    /// - in a gap: the closer of the neighbouring starts (the later on a tie)
    pub fn snap_nearest(&self, t: Time) -> Option<Time> {
        if self.intervals.is_empty() {
            return None;
        }

        let index = self.index_of(t);
        if index >= 0 {
            return Some(self.intervals[index as usize].span.start);
        }

        let insert_at = !index as usize;
        if insert_at == self.intervals.len() {
            return self.stop();
        }
        if insert_at == 0 {
            return self.start();
        }

        let before = self.intervals[insert_at - 1].span.start;
        let after = self.intervals[insert_at].span.start;
        if t.millis_since(before) < after.millis_since(t) {
            Some(before)
        } else {
            Some(after)
        }
    }
}
