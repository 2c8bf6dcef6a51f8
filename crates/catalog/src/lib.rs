//! Declarative catalog of imagery entries.
//!
//! A catalog is a JSON document listing entries with their URL templates and
//! time availability. Building it yields a [`Workbench`] with one
//! [`ImageryEntry`] per catalog entry, in document order.

use std::env;
use std::path::Path;

use foundation::bounds::Rectangle;
use foundation::tiling::TilingScheme;
use foundation::time::Time;
use layers::backend::BackendKind;
use layers::entry::{EntryError, EntryOptions, ImageryEntry};
use layers::imagery::TemplateLayerFactory;
use layers::tile_errors::TileErrorOptions;
use layers::workbench::{EntryId, Workbench};
use runtime::clock::{Clock, ClockRange};
use runtime::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use temporal::axis::{AxisError, build_axis_from_list};
use tracing::{info, warn};

pub const MAX_REFRESH_INTERVALS_ENV: &str = "ATLAS_MAX_REFRESH_INTERVALS";

fn default_max_refresh_intervals() -> usize {
    1000
}

fn default_opacity() -> f64 {
    0.6
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Sample cap for every time axis built from this catalog.
    #[serde(default = "default_max_refresh_intervals")]
    pub max_refresh_intervals: usize,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub range: ClockRange,
    /// Defaults to the earliest entry start.
    #[serde(default)]
    pub start: Option<String>,
    /// Defaults to the latest entry stop.
    #[serde(default)]
    pub stop: Option<String>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            range: ClockRange::default(),
            start: None,
            stop: None,
        }
    }
}

/// Where playback of an entry starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialTime {
    #[default]
    Start,
    /// Start of the last available interval.
    End,
    /// An instant, snapped to the nearest available time.
    At(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    /// `{time}` is replaced by each sample's tag.
    pub url_template: String,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "Rectangle::world")]
    pub rectangle: Rectangle,
    #[serde(default)]
    pub tiling_scheme: TilingScheme,
    /// Dimension value list: `start/stop[/period]` ranges and bare instants,
    /// comma separated.
    #[serde(default)]
    pub time: Option<String>,
    /// Explicit instants, merged with `time`.
    #[serde(default)]
    pub times: Vec<String>,
    #[serde(default)]
    pub tile_errors: TileErrorOptions,
    #[serde(default)]
    pub initial_time: InitialTime,
    /// Plays on a clock of its own spanning this entry's coverage, with the
    /// catalog clock's multiplier and range.
    #[serde(default)]
    pub use_own_clock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    Io(String),
    Parse(String),
    UnknownEntry(String),
    InvalidTime(String),
    Axis { entry: String, source: AxisError },
    Entry { entry: String, source: EntryError },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(msg) => write!(f, "catalog read failed: {msg}"),
            CatalogError::Parse(msg) => write!(f, "catalog is not valid: {msg}"),
            CatalogError::UnknownEntry(id) => write!(f, "no catalog entry with id {id:?}"),
            CatalogError::InvalidTime(msg) => write!(f, "invalid time: {msg}"),
            CatalogError::Axis { entry, source } => write!(f, "entry {entry:?}: {source}"),
            CatalogError::Entry { entry, source } => write!(f, "entry {entry:?}: {source}"),
        }
    }
}

impl std::error::Error for CatalogError {}

/// A catalog turned into live entries.
pub struct LoadedCatalog {
    pub workbench: Workbench,
    pub ids: Vec<(String, EntryId)>,
}

impl LoadedCatalog {
    pub fn id(&self, catalog_id: &str) -> Option<EntryId> {
        self.ids.iter().find(|(id, _)| id == catalog_id).map(|(_, e)| *e)
    }
}

impl CatalogConfig {
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let config: Self = serde_json::from_str(json).map_err(|e| CatalogError::Parse(e.to_string()))?;
        if config.max_refresh_intervals == 0 {
            return Err(CatalogError::Parse("max_refresh_intervals must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Applies `ATLAS_MAX_REFRESH_INTERVALS` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Same as `apply_env_overrides` with an explicit variable lookup.
    /// Unparseable or zero values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let Some(raw) = lookup(MAX_REFRESH_INTERVALS_ENV) else {
            return;
        };
        match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => self.max_refresh_intervals = n,
            _ => warn!(var = MAX_REFRESH_INTERVALS_ENV, value = %raw, "ignoring invalid override"),
        }
    }

    pub fn entry(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Builds a disabled entry, posting axis warnings to `diagnostics`.
    pub fn build_entry(
        &self,
        entry: &CatalogEntry,
        diagnostics: &mut Diagnostics,
    ) -> Result<ImageryEntry, CatalogError> {
        let options = EntryOptions {
            opacity: entry.opacity,
            rectangle: entry.rectangle,
            tiling_scheme: entry.tiling_scheme,
            tile_errors: entry.tile_errors,
        };
        let factory = TemplateLayerFactory::new(entry.name.clone(), entry.url_template.clone());
        let mut imagery = ImageryEntry::new(entry.name.clone(), options, Box::new(factory));

        let values: Vec<&str> = entry
            .time
            .iter()
            .map(String::as_str)
            .chain(entry.times.iter().map(String::as_str))
            .collect();
        if !values.is_empty() {
            let build = build_axis_from_list(&values.join(","), self.max_refresh_intervals).map_err(|source| {
                CatalogError::Axis {
                    entry: entry.id.clone(),
                    source,
                }
            })?;
            imagery
                .apply_axis(build, diagnostics)
                .map_err(|source| CatalogError::Entry {
                    entry: entry.id.clone(),
                    source,
                })?;
        }
        Ok(imagery)
    }

    /// Playback start for a built entry, or `None` if it is not time-varying.
    pub fn initial_time(&self, entry: &CatalogEntry, imagery: &ImageryEntry) -> Result<Option<Time>, CatalogError> {
        let Some(intervals) = imagery.intervals() else {
            return Ok(None);
        };
        match &entry.initial_time {
            InitialTime::Start => Ok(intervals.start()),
            InitialTime::End => Ok(intervals.get(intervals.len().saturating_sub(1)).map(|i| i.span.start)),
            InitialTime::At(iso) => {
                let t = Time::parse_iso8601(iso).map_err(|e| CatalogError::InvalidTime(e.to_string()))?;
                Ok(intervals.snap_nearest(t))
            }
        }
    }

    /// Builds every entry (disabled) on a fresh workbench. The shared clock
    /// spans the configured range, or the union of shared-clock entry
    /// coverage, and starts at the first such entry's initial time.
    /// Entries with `use_own_clock` get a clock over their own coverage.
    pub fn build_workbench(&self) -> Result<LoadedCatalog, CatalogError> {
        let mut diagnostics = Diagnostics::new();
        let mut built = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let mut imagery = self.build_entry(entry, &mut diagnostics)?;
            if entry.use_own_clock {
                let own = self.own_clock(entry, &imagery)?;
                imagery.set_own_clock(own);
            }
            built.push(imagery);
        }

        let shared: Vec<(&CatalogEntry, &ImageryEntry)> = self
            .entries
            .iter()
            .zip(&built)
            .filter(|(_, imagery)| imagery.own_clock().is_none())
            .collect();
        let coverage_start = shared.iter().filter_map(|(_, e)| e.intervals()?.start()).min();
        let coverage_stop = shared.iter().filter_map(|(_, e)| e.intervals()?.stop()).max();
        let start = match &self.clock.start {
            Some(iso) => parse_time(iso)?,
            None => coverage_start.unwrap_or(Time(0)),
        };
        let stop = match &self.clock.stop {
            Some(iso) => parse_time(iso)?,
            None => coverage_stop.unwrap_or(start),
        };

        let mut current = None;
        for (entry, imagery) in &shared {
            if let Some(t) = self.initial_time(entry, imagery)? {
                current = Some(t);
                break;
            }
        }

        let mut clock = Clock::new(start, stop)
            .with_multiplier(self.clock.multiplier)
            .with_range(self.clock.range);
        clock.set_time(current.unwrap_or(start));

        let mut workbench = Workbench::new(self.backend, clock);
        workbench.diagnostics_mut().extend(diagnostics.drain());

        let ids = self
            .entries
            .iter()
            .zip(built)
            .map(|(entry, imagery)| (entry.id.clone(), workbench.add_entry(imagery)))
            .collect();

        info!(
            entries = self.entries.len(),
            backend = ?self.backend,
            start = %start,
            stop = %stop,
            "catalog loaded"
        );
        Ok(LoadedCatalog { workbench, ids })
    }
}

impl CatalogConfig {
    /// A clock over `imagery`'s coverage, or `None` for a static entry.
    fn own_clock(&self, entry: &CatalogEntry, imagery: &ImageryEntry) -> Result<Option<Clock>, CatalogError> {
        let Some(intervals) = imagery.intervals() else {
            return Ok(None);
        };
        let (Some(start), Some(stop)) = (intervals.start(), intervals.stop()) else {
            return Ok(None);
        };
        let mut clock = Clock::new(start, stop)
            .with_multiplier(self.clock.multiplier)
            .with_range(self.clock.range);
        if let Some(t) = self.initial_time(entry, imagery)? {
            clock.set_time(t);
        }
        Ok(Some(clock))
    }
}

fn parse_time(iso: &str) -> Result<Time, CatalogError> {
    Time::parse_iso8601(iso).map_err(|e| CatalogError::InvalidTime(e.to_string()))
}
