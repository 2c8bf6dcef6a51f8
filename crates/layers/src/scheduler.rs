//! Dual-buffer playback of a time-varying imagery entry.
//!
//! At most two layers are resident per entry: `current`, drawn at the
//! entry's opacity and the only pick-enabled one, and `next`, the sample the
//! clock will reach next, loaded at opacity 0 directly above `current`.
//! When the clock enters the next sample the prefetched layer is promoted
//! instead of created, so playback never shows a loading gap.
//!
//! Per-tick order: release the superseded current, promote or create the
//! new current, fix the draw order, prefetch.

use foundation::handles::LayerHandle;
use runtime::clock::{ClockRange, ClockTick, Direction};
use temporal::intervals::IntervalCollection;
use tracing::debug;

use crate::backend::ImageryBackend;
use crate::imagery::LayerFactory;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    /// Disabled, or no axis.
    Empty,
    /// Enabled, but the clock is outside every interval.
    Seeking,
    /// A current layer is shown.
    Playing,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub handle: LayerHandle,
}

/// What one `sync` did.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub state: PlaybackState,
    /// Layer factory calls.
    pub created: usize,
    /// Layers destroyed.
    pub released: usize,
    /// The prefetched layer became current.
    pub promoted: bool,
}

impl TickReport {
    fn new(state: PlaybackState) -> Self {
        Self {
            state,
            created: 0,
            released: 0,
            promoted: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    intervals: IntervalCollection,
    opacity: f64,
    visible: bool,
    direction: Direction,
    state: PlaybackState,
    current: Option<Slot>,
    next: Option<Slot>,
}

impl PlaybackScheduler {
    pub fn new(intervals: IntervalCollection, opacity: f64) -> Self {
        Self {
            intervals,
            opacity,
            visible: true,
            direction: Direction::Forward,
            state: PlaybackState::Seeking,
            current: None,
            next: None,
        }
    }

    pub fn intervals(&self) -> &IntervalCollection {
        &self.intervals
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current(&self) -> Option<Slot> {
        self.current
    }

    pub fn next(&self) -> Option<Slot> {
        self.next
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn handles(&self) -> Vec<LayerHandle> {
        self.current.iter().chain(self.next.iter()).map(|s| s.handle).collect()
    }

    pub fn owns(&self, handle: LayerHandle) -> bool {
        self.current.is_some_and(|s| s.handle == handle) || self.next.is_some_and(|s| s.handle == handle)
    }

    /// Brings the resident layers in line with `tick`.
    ///
    /// Never fails: a backend that lost a handle just sees no-op calls.
    pub fn sync(
        &mut self,
        backend: &mut dyn ImageryBackend,
        factory: &mut dyn LayerFactory,
        tick: &ClockTick,
    ) -> TickReport {
        let mut report = TickReport::new(self.state);

        let direction = tick.direction();
        if direction != self.direction {
            if let Some(stale) = self.next.take() {
                debug!(index = stale.index, "direction changed; dropping prefetched layer");
                self.destroy(backend, stale, &mut report);
            }
            self.direction = direction;
        }

        let current_valid = self
            .current
            .and_then(|c| self.intervals.get(c.index))
            .is_some_and(|interval| interval.contains(tick.time));

        if !current_valid {
            let found = self.intervals.index_of(tick.time);
            if found < 0 {
                if self.state == PlaybackState::Playing {
                    debug!(time = %tick.time, "clock left coverage");
                }
                self.release_layers(backend, &mut report);
                self.state = PlaybackState::Seeking;
                report.state = self.state;
                return report;
            }
            self.show_index(backend, factory, found as usize, &mut report);
            self.state = PlaybackState::Playing;
        }

        self.fix_order(backend);
        self.prefetch(backend, factory, tick.range, &mut report);
        self.fix_order(backend);

        report.state = self.state;
        report
    }

    fn show_index(
        &mut self,
        backend: &mut dyn ImageryBackend,
        factory: &mut dyn LayerFactory,
        index: usize,
        report: &mut TickReport,
    ) {
        if let Some(old) = self.current.take() {
            backend.set_pick_enabled(old.handle, false);
            self.destroy(backend, old, report);
        }

        match self.next.take() {
            Some(next) if next.index == index => {
                debug!(index, "promoting prefetched layer");
                backend.set_opacity(next.handle, self.opacity);
                backend.set_pick_enabled(next.handle, true);
                self.current = Some(next);
                report.promoted = true;
            }
            stale => {
                if let Some(stale) = stale {
                    self.destroy(backend, stale, report);
                }
                let handle = self.create(backend, factory, index, self.opacity, true);
                debug!(index, "created current layer");
                self.current = Some(Slot { index, handle });
                report.created += 1;
            }
        }
    }

    fn prefetch(
        &mut self,
        backend: &mut dyn ImageryBackend,
        factory: &mut dyn LayerFactory,
        range: ClockRange,
        report: &mut TickReport,
    ) {
        let Some(current) = self.current else {
            return;
        };
        let Some(predicted) = self.predicted_next(current.index, range) else {
            return;
        };
        if self.next.is_some_and(|n| n.index == predicted) {
            return;
        }

        if let Some(stale) = self.next.take() {
            self.destroy(backend, stale, report);
        }
        let handle = self.create(backend, factory, predicted, 0.0, false);
        debug!(index = predicted, "prefetched next layer");
        self.next = Some(Slot {
            index: predicted,
            handle,
        });
        report.created += 1;
    }

    /// The interval playback reaches after `index`. Looping playback wraps
    /// from the last interval to the first when moving forward.
    pub fn predicted_next(&self, index: usize, range: ClockRange) -> Option<usize> {
        let len = self.intervals.len();
        let predicted = match self.direction {
            Direction::Forward if index + 1 < len => Some(index + 1),
            Direction::Forward if range == ClockRange::LoopStop => Some(0),
            Direction::Forward => None,
            Direction::Backward => index.checked_sub(1),
        };
        predicted.filter(|p| *p != index)
    }

    /// Moves `next` until it sits exactly one position above `current`.
    pub fn fix_order(&self, backend: &mut dyn ImageryBackend) {
        let (Some(current), Some(next)) = (self.current, self.next) else {
            return;
        };

        for _ in 0..=backend.layer_count() * 2 {
            let (Some(c), Some(n)) = (backend.index_of(current.handle), backend.index_of(next.handle)) else {
                return;
            };
            if n == c + 1 {
                return;
            }
            if n > c {
                backend.lower(next.handle);
            } else {
                backend.raise(next.handle);
            }
        }
    }

    pub fn set_opacity(&mut self, backend: &mut dyn ImageryBackend, opacity: f64) {
        self.opacity = opacity;
        if let Some(current) = self.current {
            backend.set_opacity(current.handle, opacity);
        }
    }

    pub fn set_visible(&mut self, backend: &mut dyn ImageryBackend, visible: bool) {
        self.visible = visible;
        for handle in self.handles() {
            backend.set_visible(handle, visible);
        }
    }

    /// Destroys both layers. The scheduler is `Empty` afterwards.
    pub fn release(&mut self, backend: &mut dyn ImageryBackend) {
        let mut report = TickReport::new(self.state);
        self.release_layers(backend, &mut report);
        self.state = PlaybackState::Empty;
    }

    fn release_layers(&mut self, backend: &mut dyn ImageryBackend, report: &mut TickReport) {
        if let Some(current) = self.current.take() {
            backend.set_pick_enabled(current.handle, false);
            self.destroy(backend, current, report);
        }
        if let Some(next) = self.next.take() {
            self.destroy(backend, next, report);
        }
    }

    fn create(
        &self,
        backend: &mut dyn ImageryBackend,
        factory: &mut dyn LayerFactory,
        index: usize,
        opacity: f64,
        pick: bool,
    ) -> LayerHandle {
        let tag = self.intervals.get(index).map(|i| i.tag.clone());
        let mut source = factory.create_imagery_source(tag.as_ref());
        source.pick_features = pick;
        let handle = backend.create_layer(source, opacity);
        backend.set_visible(handle, self.visible);
        handle
    }

    fn destroy(&self, backend: &mut dyn ImageryBackend, slot: Slot, report: &mut TickReport) {
        backend.destroy_layer(slot.handle);
        report.released += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{PlaybackScheduler, PlaybackState};
    use crate::backend::{FlatMapBackend, GlobeBackend, ImageryBackend};
    use crate::imagery::{ImagerySource, LayerFactory};
    use foundation::time::{Time, TimeTag};
    use runtime::clock::{ClockRange, ClockTick};
    use temporal::axis::build_axis;
    use temporal::intervals::{Interval, IntervalCollection};

    #[derive(Default)]
    struct CountingFactory {
        calls: usize,
    }

    impl LayerFactory for CountingFactory {
        fn create_imagery_source(&mut self, tag: Option<&TimeTag>) -> ImagerySource {
            self.calls += 1;
            ImagerySource {
                provider_id: self.calls as u64,
                name: "test".into(),
                url: String::new(),
                tag: tag.cloned(),
                pick_features: true,
            }
        }
    }

    fn t0() -> Time {
        Time::parse_iso8601("2020-01-01T00:00:00Z").unwrap()
    }

    fn eleven_seconds() -> IntervalCollection {
        build_axis("2020-01-01T00:00:00Z", "2020-01-01T00:00:10Z", None, 1000)
            .unwrap()
            .axis
            .unwrap()
            .to_intervals()
            .unwrap()
    }

    fn gapped() -> IntervalCollection {
        IntervalCollection::new(vec![
            Interval::new(Time(0), Time(10), "a"),
            Interval::new(Time(10), Time(20), "b"),
            Interval::new(Time(40), Time(50), "c"),
        ])
        .unwrap()
    }

    fn tick_at(time: Time, multiplier: f64) -> ClockTick {
        ClockTick::new(0, time, multiplier, ClockRange::Unbounded)
    }

    fn assert_pick_invariant(s: &PlaybackScheduler, backend: &dyn ImageryBackend) {
        let picking: Vec<_> = backend.layers().into_iter().filter(|l| l.pick_enabled).collect();
        assert!(picking.len() <= 1);
        if let Some(layer) = picking.first() {
            assert_eq!(Some(layer.handle), s.current().map(|c| c.handle));
        }
    }

    #[test]
    fn forward_playback_reuses_the_prefetched_layer() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);

        let first = s.sync(&mut backend, &mut factory, &tick_at(t0(), 1.0));
        assert_eq!(first.created, 2);
        assert_eq!(first.state, PlaybackState::Playing);
        assert_eq!(s.current().unwrap().index, 0);
        assert_eq!(s.next().unwrap().index, 1);

        for k in 1..=10i64 {
            let report = s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(k * 1_000), 1.0));
            assert!(report.promoted, "tick {k}");
            assert_eq!(report.created, if k < 10 { 1 } else { 0 }, "tick {k}");
            assert_eq!(s.current().unwrap().index, k as usize);
            assert_pick_invariant(&s, &backend);

            let visible: Vec<_> = backend
                .layers()
                .into_iter()
                .filter(|l| l.visible && l.opacity > 0.0)
                .collect();
            assert_eq!(visible.len(), 1);
            let expected = s.intervals().get(k as usize).unwrap().tag.clone();
            assert_eq!(visible[0].tag.as_ref(), Some(&expected));
        }
        assert_eq!(factory.calls, 11);
        assert_eq!(s.next(), None);
    }

    #[test]
    fn ticks_inside_the_current_interval_do_nothing() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);

        s.sync(&mut backend, &mut factory, &tick_at(t0(), 1.0));
        let report = s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(500), 1.0));
        assert_eq!((report.created, report.released, report.promoted), (0, 0, false));
    }

    #[test]
    fn prefetched_layer_is_transparent_and_not_pickable() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);
        s.sync(&mut backend, &mut factory, &tick_at(t0(), 1.0));

        let layers = backend.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!((layers[0].opacity, layers[0].pick_enabled), (0.6, true));
        assert_eq!((layers[1].opacity, layers[1].pick_enabled), (0.0, false));
        assert!(layers.iter().all(|l| l.visible));
    }

    #[test]
    fn gap_releases_layers_and_reentry_creates_fresh_ones() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(gapped(), 1.0);

        s.sync(&mut backend, &mut factory, &tick_at(Time(5), 1.0));
        let before = s.handles();

        let report = s.sync(&mut backend, &mut factory, &tick_at(Time(25), 1.0));
        assert_eq!(report.state, PlaybackState::Seeking);
        assert_eq!(backend.layer_count(), 0);
        assert_eq!(s.current(), None);

        let report = s.sync(&mut backend, &mut factory, &tick_at(Time(45), 1.0));
        assert_eq!(report.state, PlaybackState::Playing);
        assert!(!report.promoted);
        let current = s.current().unwrap();
        assert_eq!(current.index, 2);
        assert!(!before.contains(&current.handle));
        assert_eq!(s.next(), None);
    }

    #[test]
    fn starting_before_coverage_is_seeking() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(gapped(), 1.0);
        let report = s.sync(&mut backend, &mut factory, &tick_at(Time(-1), 1.0));
        assert_eq!(report.state, PlaybackState::Seeking);
        assert_eq!(factory.calls, 0);
    }

    #[test]
    fn direction_reversal_replaces_the_prefetch() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);
        s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(5_000), 1.0));
        let current = s.current().unwrap();
        assert_eq!(s.next().unwrap().index, 6);

        let report = s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(5_000), -1.0));
        assert_eq!((report.created, report.released), (1, 1));
        assert_eq!(s.current(), Some(current));
        assert_eq!(s.next().unwrap().index, 4);

        let report = s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(4_000), -1.0));
        assert!(report.promoted);
        assert_eq!(s.next().unwrap().index, 3);
    }

    #[test]
    fn looping_playback_prefetches_the_first_interval() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);

        let looping = |time| ClockTick::new(0, time, 1.0, ClockRange::LoopStop);
        s.sync(&mut backend, &mut factory, &looping(t0().offset_by(10_000)));
        assert_eq!(s.next().unwrap().index, 0);

        let report = s.sync(&mut backend, &mut factory, &looping(t0()));
        assert!(report.promoted);
        assert_eq!(s.current().unwrap().index, 0);
    }

    fn next_sits_above_current(backend: &mut dyn ImageryBackend) {
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);
        s.sync(backend, &mut factory, &tick_at(t0(), 1.0));

        // Another entry adds a layer on top between ticks.
        let other = backend.create_layer(factory.create_imagery_source(None), 1.0);

        s.sync(backend, &mut factory, &tick_at(t0().offset_by(1_000), 1.0));
        let current = backend.index_of(s.current().unwrap().handle).unwrap();
        let next = backend.index_of(s.next().unwrap().handle).unwrap();
        assert_eq!(next, current + 1);
        assert_eq!(backend.index_of(other), Some(next + 1));
    }

    #[test]
    fn fix_order_on_globe() {
        next_sits_above_current(&mut GlobeBackend::new());
    }

    #[test]
    fn fix_order_on_flat_map() {
        next_sits_above_current(&mut FlatMapBackend::new());
    }

    #[test]
    fn release_destroys_both_layers() {
        let mut backend = FlatMapBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);
        s.sync(&mut backend, &mut factory, &tick_at(t0(), 1.0));
        s.release(&mut backend);
        assert_eq!(backend.layer_count(), 0);
        assert_eq!(s.state(), PlaybackState::Empty);
    }

    #[test]
    fn opacity_applies_to_current_only() {
        let mut backend = GlobeBackend::new();
        let mut factory = CountingFactory::default();
        let mut s = PlaybackScheduler::new(eleven_seconds(), 0.6);
        s.sync(&mut backend, &mut factory, &tick_at(t0(), 1.0));
        s.set_opacity(&mut backend, 0.3);
        let opacities: Vec<f64> = backend.layers().iter().map(|l| l.opacity).collect();
        assert_eq!(opacities, vec![0.3, 0.0]);

        s.sync(&mut backend, &mut factory, &tick_at(t0().offset_by(1_000), 1.0));
        assert_eq!(backend.layers()[0].opacity, 0.3);
    }
}
