use core::fmt;

use foundation::bounds::Rectangle;
use foundation::handles::LayerHandle;
use foundation::tiling::TilingScheme;
use runtime::clock::{Clock, ClockTick};
use runtime::diagnostics::{DiagnosticKind, Diagnostics};
use temporal::axis::{AxisBuild, AxisError, AxisWarning, TimeDimension};
use temporal::intervals::{IntervalCollection, IntervalError};
use tracing::{info, warn};

use crate::backend::ImageryBackend;
use crate::imagery::LayerFactory;
use crate::scheduler::{PlaybackScheduler, PlaybackState, TickReport};
use crate::tile_errors::{TileErrorAction, TileErrorOptions, TileFailure, TileFailurePolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct EntryOptions {
    pub opacity: f64,
    pub rectangle: Rectangle,
    pub tiling_scheme: TilingScheme,
    pub tile_errors: TileErrorOptions,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            opacity: 0.6,
            rectangle: Rectangle::world(),
            tiling_scheme: TilingScheme::default(),
            tile_errors: TileErrorOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    AlreadyEnabled,
    NotEnabled,
    UnknownEntry(usize),
    NoOwnClock,
    Axis(AxisError),
    Intervals(IntervalError),
}

impl fmt::Display for EntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryError::AlreadyEnabled => write!(f, "entry is already enabled"),
            EntryError::NotEnabled => write!(f, "entry is not enabled"),
            EntryError::UnknownEntry(id) => write!(f, "no entry with id {id}"),
            EntryError::NoOwnClock => write!(f, "entry follows the shared clock"),
            EntryError::Axis(e) => write!(f, "time axis: {e}"),
            EntryError::Intervals(e) => write!(f, "time intervals: {e}"),
        }
    }
}

impl std::error::Error for EntryError {}

impl From<AxisError> for EntryError {
    fn from(value: AxisError) -> Self {
        EntryError::Axis(value)
    }
}

impl From<IntervalError> for EntryError {
    fn from(value: IntervalError) -> Self {
        EntryError::Intervals(value)
    }
}

#[derive(Debug)]
enum Playback {
    Disabled,
    Static { handle: Option<LayerHandle> },
    Dynamic(PlaybackScheduler),
}

/// One imagery item on the workbench.
///
/// Lifecycle: `enable` prepares playback, `show` creates and reveals layers,
/// `hide` keeps them resident but invisible, `disable` destroys them. Entries
/// without intervals render a single untagged layer.
///
/// An entry with its own clock follows that timeline instead of the shared
/// one handed in by the host.
pub struct ImageryEntry {
    name: String,
    options: EntryOptions,
    factory: Box<dyn LayerFactory>,
    intervals: Option<IntervalCollection>,
    own_clock: Option<Clock>,
    playback: Playback,
    shown: bool,
    policy: TileFailurePolicy,
}

impl ImageryEntry {
    pub fn new(name: impl Into<String>, options: EntryOptions, factory: Box<dyn LayerFactory>) -> Self {
        let policy = TileFailurePolicy::new(options.rectangle, options.tiling_scheme, options.tile_errors);
        Self {
            name: name.into(),
            options,
            factory,
            intervals: None,
            own_clock: None,
            playback: Playback::Disabled,
            shown: false,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &EntryOptions {
        &self.options
    }

    pub fn intervals(&self) -> Option<&IntervalCollection> {
        self.intervals.as_ref()
    }

    pub fn is_time_varying(&self) -> bool {
        self.intervals.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.playback, Playback::Disabled)
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn scheduler(&self) -> Option<&PlaybackScheduler> {
        match &self.playback {
            Playback::Dynamic(s) => Some(s),
            _ => None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.playback {
            Playback::Disabled => PlaybackState::Empty,
            Playback::Static { .. } => PlaybackState::Playing,
            Playback::Dynamic(s) => s.state(),
        }
    }

    pub fn own_clock(&self) -> Option<&Clock> {
        self.own_clock.as_ref()
    }

    pub fn own_clock_mut(&mut self) -> Option<&mut Clock> {
        self.own_clock.as_mut()
    }

    /// `None` puts the entry back on the shared clock.
    pub fn set_own_clock(&mut self, clock: Option<Clock>) {
        self.own_clock = clock;
    }

    /// The tick this entry plays at: its own clock's, else `shared`.
    pub fn effective_tick(&self, shared: &ClockTick) -> ClockTick {
        self.own_clock.as_ref().map_or(*shared, Clock::tick)
    }

    /// Advances the own clock by `dt_ms`, if any, and returns the tick to play.
    pub fn advance_clock(&mut self, shared: &ClockTick, dt_ms: i64) -> ClockTick {
        match &mut self.own_clock {
            Some(clock) => clock.advance(dt_ms),
            None => *shared,
        }
    }

    /// Takes effect on the next `enable` or `refresh`.
    pub fn set_intervals(&mut self, intervals: Option<IntervalCollection>) {
        self.intervals = intervals;
    }

    /// Builds intervals from a time dimension, posting any axis warnings.
    pub fn apply_time_dimension(
        &mut self,
        dimension: &TimeDimension,
        max_refresh_intervals: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), EntryError> {
        let build = dimension.build(max_refresh_intervals)?;
        self.apply_axis(build, diagnostics)
    }

    pub fn apply_axis(&mut self, build: AxisBuild, diagnostics: &mut Diagnostics) -> Result<(), EntryError> {
        for warning in &build.warnings {
            let (kind, title) = match warning {
                AxisWarning::Truncated { .. } => (DiagnosticKind::AxisTruncated, "Time axis truncated"),
                AxisWarning::InvalidPeriod(_) => (DiagnosticKind::InvalidPeriod, "Invalid time period"),
            };
            diagnostics.post(kind, self.name.clone(), title, warning.to_string());
        }

        self.intervals = match build.axis {
            Some(axis) => Some(axis.to_intervals()?),
            None => None,
        };
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), EntryError> {
        if self.is_enabled() {
            return Err(EntryError::AlreadyEnabled);
        }
        self.playback = match &self.intervals {
            Some(intervals) => Playback::Dynamic(PlaybackScheduler::new(intervals.clone(), self.options.opacity)),
            None => Playback::Static { handle: None },
        };
        info!(entry = %self.name, time_varying = self.is_time_varying(), "entry enabled");
        Ok(())
    }

    pub fn disable(&mut self, backend: &mut dyn ImageryBackend) {
        match &mut self.playback {
            Playback::Disabled => return,
            Playback::Static { handle } => {
                if let Some(handle) = handle.take() {
                    backend.destroy_layer(handle);
                }
            }
            Playback::Dynamic(scheduler) => scheduler.release(backend),
        }
        self.playback = Playback::Disabled;
        self.shown = false;
        self.policy.reset();
        info!(entry = %self.name, "entry disabled");
    }

    /// Reveals the entry at `tick`. Retry counters start over.
    pub fn show(&mut self, backend: &mut dyn ImageryBackend, tick: &ClockTick) -> Result<(), EntryError> {
        self.shown = true;
        self.policy.reset();
        match &mut self.playback {
            Playback::Disabled => {
                self.shown = false;
                return Err(EntryError::NotEnabled);
            }
            Playback::Static { handle } => {
                let handle = *handle.get_or_insert_with(|| {
                    let source = self.factory.create_imagery_source(None);
                    backend.create_layer(source, self.options.opacity)
                });
                backend.set_visible(handle, true);
            }
            Playback::Dynamic(scheduler) => {
                scheduler.set_visible(backend, true);
                scheduler.sync(backend, self.factory.as_mut(), tick);
            }
        }
        Ok(())
    }

    pub fn hide(&mut self, backend: &mut dyn ImageryBackend) {
        self.shown = false;
        match &mut self.playback {
            Playback::Disabled => {}
            Playback::Static { handle } => {
                if let Some(handle) = handle {
                    backend.set_visible(*handle, false);
                }
            }
            Playback::Dynamic(scheduler) => scheduler.set_visible(backend, false),
        }
    }

    /// Advances playback. Hidden, static or disabled entries do nothing.
    pub fn on_tick(&mut self, backend: &mut dyn ImageryBackend, tick: &ClockTick) -> Option<TickReport> {
        if !self.shown {
            return None;
        }
        let Playback::Dynamic(scheduler) = &mut self.playback else {
            return None;
        };
        let report = scheduler.sync(backend, self.factory.as_mut(), tick);
        self.policy.retain(&scheduler.handles());
        Some(report)
    }

    pub fn set_opacity(&mut self, backend: &mut dyn ImageryBackend, opacity: f64) {
        self.options.opacity = opacity;
        match &mut self.playback {
            Playback::Disabled => {}
            Playback::Static { handle } => {
                if let Some(handle) = handle {
                    backend.set_opacity(*handle, opacity);
                }
            }
            Playback::Dynamic(scheduler) => scheduler.set_opacity(backend, opacity),
        }
    }

    /// Rebuilds the layers from scratch, keeping visibility.
    pub fn refresh(&mut self, backend: &mut dyn ImageryBackend, tick: &ClockTick) -> Result<(), EntryError> {
        if !self.is_enabled() {
            return Err(EntryError::NotEnabled);
        }
        let was_shown = self.shown;
        self.disable(backend);
        self.enable()?;
        if was_shown {
            self.show(backend, tick)?;
        }
        Ok(())
    }

    pub fn owns(&self, handle: LayerHandle) -> bool {
        match &self.playback {
            Playback::Disabled => false,
            Playback::Static { handle: own } => *own == Some(handle),
            Playback::Dynamic(scheduler) => scheduler.owns(handle),
        }
    }

    /// Applies the tile failure policy. Giving up for the first time on a
    /// layer hides the entry and posts one diagnostic.
    pub fn handle_tile_failure(
        &mut self,
        backend: &mut dyn ImageryBackend,
        handle: LayerHandle,
        failure: &TileFailure,
        diagnostics: &mut Diagnostics,
    ) -> TileErrorAction {
        if !self.shown || !self.owns(handle) {
            return TileErrorAction::Ignore;
        }

        let action = self.policy.classify(handle, failure);
        if let TileErrorAction::GiveUp { escalate: true } = action {
            warn!(
                entry = %self.name,
                status = ?failure.status_code,
                x = failure.tile.x,
                y = failure.tile.y,
                level = failure.tile.level,
                "imagery tiles keep failing; hiding entry"
            );
            let status = failure
                .status_code
                .map_or_else(|| "unknown".to_string(), |s| s.to_string());
            diagnostics.post(
                DiagnosticKind::TileFailure,
                self.name.clone(),
                "Error accessing imagery server",
                format!(
                    "An error occurred while accessing imagery tiles for {} (status {status}). The layer has been hidden.",
                    self.name
                ),
            );
            self.hide(backend);
        }
        action
    }

    pub fn record_tile_success(&mut self, handle: LayerHandle) {
        self.policy.record_success(handle);
    }
}

impl fmt::Debug for ImageryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageryEntry")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("own_clock", &self.own_clock)
            .field("playback", &self.playback)
            .field("shown", &self.shown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::{EntryError, EntryOptions, ImageryEntry};
    use crate::backend::{GlobeBackend, ImageryBackend};
    use crate::imagery::{ImagerySource, LayerFactory};
    use crate::scheduler::PlaybackState;
    use crate::tile_errors::{TileErrorAction, TileFailure};
    use foundation::handles::LayerHandle;
    use foundation::tiling::TileCoord;
    use foundation::time::{Time, TimeTag};
    use runtime::clock::{Clock, ClockTick};
    use runtime::diagnostics::{DiagnosticKind, Diagnostics};
    use temporal::axis::TimeDimension;

    struct SharedCounter(Rc<Cell<usize>>);

    impl LayerFactory for SharedCounter {
        fn create_imagery_source(&mut self, tag: Option<&TimeTag>) -> ImagerySource {
            self.0.set(self.0.get() + 1);
            ImagerySource {
                provider_id: self.0.get() as u64,
                name: "test".into(),
                url: String::new(),
                tag: tag.cloned(),
                pick_features: true,
            }
        }
    }

    fn entry(dimension: Option<&str>) -> (ImageryEntry, Rc<Cell<usize>>, Diagnostics) {
        let calls = Rc::new(Cell::new(0));
        let mut entry = ImageryEntry::new(
            "Sea surface temperature",
            EntryOptions::default(),
            Box::new(SharedCounter(calls.clone())),
        );
        let mut diagnostics = Diagnostics::new();
        if let Some(extent) = dimension {
            let dim = TimeDimension::parse_extent(extent).unwrap();
            entry.apply_time_dimension(&dim, 1000, &mut diagnostics).unwrap();
        }
        (entry, calls, diagnostics)
    }

    const DAILY: &str = "2020-01-01/2020-01-10/P1D";

    fn at(iso: &str) -> ClockTick {
        ClockTick::at(Time::parse_iso8601(iso).unwrap())
    }

    #[test]
    fn enable_twice_is_an_error() {
        let (mut e, _, _) = entry(Some(DAILY));
        e.enable().unwrap();
        assert_eq!(e.enable(), Err(EntryError::AlreadyEnabled));
    }

    #[test]
    fn show_requires_enable() {
        let (mut e, _, _) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        assert_eq!(e.show(&mut backend, &at("2020-01-02")), Err(EntryError::NotEnabled));
        assert!(!e.is_shown());
    }

    #[test]
    fn dynamic_lifecycle() {
        let (mut e, calls, _) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        assert_eq!(backend.layer_count(), 0);

        e.show(&mut backend, &at("2020-01-02")).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(e.state(), PlaybackState::Playing);

        e.hide(&mut backend);
        assert!(backend.layers().iter().all(|l| !l.visible));
        assert_eq!(e.on_tick(&mut backend, &at("2020-01-03")), None);
        assert_eq!(calls.get(), 2);

        e.show(&mut backend, &at("2020-01-03")).unwrap();
        assert!(backend.layers().iter().all(|l| l.visible));
        assert_eq!(calls.get(), 3);

        e.disable(&mut backend);
        assert_eq!(backend.layer_count(), 0);
        assert_eq!(e.state(), PlaybackState::Empty);
    }

    #[test]
    fn single_instant_extent_is_static() {
        let (mut e, calls, _) = entry(Some("2020-01-01/2020-01-01/P1D"));
        assert!(!e.is_time_varying());

        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        e.show(&mut backend, &at("2020-06-01")).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(backend.layers()[0].tag, None);
        assert_eq!(e.on_tick(&mut backend, &at("2020-06-02")), None);
    }

    #[test]
    fn truncation_is_reported_once() {
        let calls = Rc::new(Cell::new(0));
        let mut e = ImageryEntry::new("Rain", EntryOptions::default(), Box::new(SharedCounter(calls)));
        let mut diagnostics = Diagnostics::new();
        let dim = TimeDimension::parse_extent("2020-01-01/2020-12-31/P1D").unwrap();
        e.apply_time_dimension(&dim, 30, &mut diagnostics).unwrap();

        assert_eq!(diagnostics.count(DiagnosticKind::AxisTruncated), 1);
        assert_eq!(diagnostics.events()[0].entry_name, "Rain");
        assert_eq!(e.intervals().unwrap().len(), 31);
    }

    #[test]
    fn three_tile_failures_hide_the_entry_once() {
        let (mut e, _, mut diagnostics) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        e.show(&mut backend, &at("2020-01-02")).unwrap();
        let current = e.scheduler().unwrap().current().unwrap().handle;
        let failure = TileFailure::new(Some(500), TileCoord::new(0, 0, 1));

        for _ in 0..2 {
            let action = e.handle_tile_failure(&mut backend, current, &failure, &mut diagnostics);
            assert!(matches!(action, TileErrorAction::Retry { .. }));
        }
        let action = e.handle_tile_failure(&mut backend, current, &failure, &mut diagnostics);
        assert_eq!(action, TileErrorAction::GiveUp { escalate: true });
        assert!(!e.is_shown());
        assert!(backend.layers().iter().all(|l| !l.visible));

        let action = e.handle_tile_failure(&mut backend, current, &failure, &mut diagnostics);
        assert_eq!(action, TileErrorAction::Ignore);
        assert_eq!(diagnostics.count(DiagnosticKind::TileFailure), 1);

        e.show(&mut backend, &at("2020-01-02")).unwrap();
        let action = e.handle_tile_failure(&mut backend, current, &failure, &mut diagnostics);
        assert_eq!(action, TileErrorAction::Retry { attempt: 1 });
    }

    #[test]
    fn foreign_handles_are_ignored() {
        let (mut e, _, mut diagnostics) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        e.show(&mut backend, &at("2020-01-02")).unwrap();
        let failure = TileFailure::new(Some(500), TileCoord::new(0, 0, 1));
        let action = e.handle_tile_failure(&mut backend, LayerHandle::new(404), &failure, &mut diagnostics);
        assert_eq!(action, TileErrorAction::Ignore);
    }

    #[test]
    fn refresh_rebuilds_layers_and_keeps_visibility() {
        let (mut e, calls, _) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        e.show(&mut backend, &at("2020-01-02")).unwrap();
        let before = e.scheduler().unwrap().handles();

        e.refresh(&mut backend, &at("2020-01-02")).unwrap();
        assert!(e.is_shown());
        assert_eq!(calls.get(), 4);
        let after = e.scheduler().unwrap().handles();
        assert!(after.iter().all(|h| !before.contains(h)));
        assert_eq!(backend.layer_count(), 2);
    }

    #[test]
    fn own_clock_overrides_the_shared_tick() {
        let (mut e, _, _) = entry(Some(DAILY));
        let shared = at("2020-01-02");
        assert_eq!(e.effective_tick(&shared), shared);
        assert_eq!(e.advance_clock(&shared, 1_000), shared);

        let start = Time::parse_iso8601("2020-01-05").unwrap();
        e.set_own_clock(Some(Clock::new(start, start.offset_by(86_400_000)).with_multiplier(3_600.0)));
        assert_eq!(e.effective_tick(&shared).time, start);
        let tick = e.advance_clock(&shared, 1_000);
        assert_eq!(tick.time, start.offset_by(3_600_000));
        assert_eq!(e.own_clock().unwrap().current(), tick.time);

        e.set_own_clock(None);
        assert_eq!(e.effective_tick(&shared), shared);
    }

    #[test]
    fn opacity_reaches_the_current_layer() {
        let (mut e, _, _) = entry(Some(DAILY));
        let mut backend = GlobeBackend::new();
        e.enable().unwrap();
        e.show(&mut backend, &at("2020-01-02")).unwrap();
        e.set_opacity(&mut backend, 0.9);
        assert_eq!(backend.layers()[0].opacity, 0.9);
        assert_eq!(backend.layers()[1].opacity, 0.0);
    }
}
