use foundation::time::Time;
use serde::{Deserialize, Serialize};

/// Playback direction, taken from the sign of the clock multiplier.
/// A zero multiplier counts as forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn from_multiplier(multiplier: f64) -> Self {
        if multiplier >= 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }
}

/// What happens when the clock reaches the ends of its range.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockRange {
    #[default]
    Unbounded,
    /// Stops at `start` and `stop`.
    Clamped,
    /// Moving forward past `stop` wraps to `start`; moving backward stops at
    /// `start`.
    LoopStop,
}

/// Snapshot handed to every tick consumer.
///
/// Consumers see only this value, never the clock itself, so tests can feed
/// hand-built ticks.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClockTick {
    /// 0-based tick index.
    pub index: u64,
    pub time: Time,
    pub multiplier: f64,
    pub range: ClockRange,
}

impl ClockTick {
    pub fn new(index: u64, time: Time, multiplier: f64, range: ClockRange) -> Self {
        Self {
            index,
            time,
            multiplier,
            range,
        }
    }

    /// Unbounded tick moving forward at real time.
    pub fn at(time: Time) -> Self {
        Self::new(0, time, 1.0, ClockRange::Unbounded)
    }

    pub fn direction(&self) -> Direction {
        Direction::from_multiplier(self.multiplier)
    }
}

/// Explicit, injectable playback clock.
///
/// Time only moves through `advance` and `set_time`; there is no wall-clock
/// dependency, so the same inputs always produce the same ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct Clock {
    start: Time,
    stop: Time,
    current: Time,
    multiplier: f64,
    range: ClockRange,
    ticks: u64,
}

impl Clock {
    pub fn new(start: Time, stop: Time) -> Self {
        Self {
            start,
            stop: stop.max(start),
            current: start,
            multiplier: 1.0,
            range: ClockRange::Unbounded,
            ticks: 0,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_range(mut self, range: ClockRange) -> Self {
        self.range = range;
        self
    }

    pub fn start(&self) -> Time {
        self.start
    }

    pub fn stop(&self) -> Time {
        self.stop
    }

    pub fn current(&self) -> Time {
        self.current
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn range(&self) -> ClockRange {
        self.range
    }

    pub fn direction(&self) -> Direction {
        Direction::from_multiplier(self.multiplier)
    }

    pub fn set_multiplier(&mut self, multiplier: f64) {
        self.multiplier = multiplier;
    }

    pub fn set_range(&mut self, range: ClockRange) {
        self.range = range;
    }

    /// Moves the clock to `time` without applying range rules (a scrub).
    pub fn set_time(&mut self, time: Time) {
        self.current = time;
    }

    /// The tick for the current state, without advancing.
    pub fn tick(&self) -> ClockTick {
        ClockTick::new(self.ticks, self.current, self.multiplier, self.range)
    }

    /// Advances by `dt_ms` of host time scaled by the multiplier.
    pub fn advance(&mut self, dt_ms: i64) -> ClockTick {
        let delta = (dt_ms as f64 * self.multiplier).round() as i64;
        let next = self.current.offset_by(delta);

        self.current = match self.range {
            ClockRange::Unbounded => next,
            ClockRange::Clamped => next.clamp(self.start, self.stop),
            ClockRange::LoopStop => {
                if next > self.stop && delta >= 0 {
                    self.start
                } else if next < self.start {
                    self.start
                } else {
                    next
                }
            }
        };
        self.ticks += 1;
        self.tick()
    }
}
