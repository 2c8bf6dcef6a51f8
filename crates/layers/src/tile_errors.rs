use std::collections::BTreeMap;

use foundation::bounds::Rectangle;
use foundation::handles::LayerHandle;
use foundation::tiling::{TileCoord, TilingScheme};
use serde::{Deserialize, Serialize};

/// A failed tile request reported by a backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TileFailure {
    /// HTTP status, if the transport got one.
    pub status_code: Option<u16>,
    pub tile: TileCoord,
}

impl TileFailure {
    pub fn new(status_code: Option<u16>, tile: TileCoord) -> Self {
        Self { status_code, tile }
    }
}

fn default_true() -> bool {
    true
}

fn default_retry_limit() -> u32 {
    3
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileErrorOptions {
    #[serde(default)]
    pub treat_404_as_error: bool,
    #[serde(default = "default_true")]
    pub treat_403_as_error: bool,
    #[serde(default)]
    pub ignore_unknown_tile_errors: bool,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
}

impl Default for TileErrorOptions {
    fn default() -> Self {
        Self {
            treat_404_as_error: false,
            treat_403_as_error: true,
            ignore_unknown_tile_errors: false,
            retry_limit: default_retry_limit(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileErrorAction {
    Ignore,
    /// Request the tile again; `attempt` counts failures so far.
    Retry { attempt: u32 },
    /// Stop requesting the tile. `escalate` is true only the first time a
    /// layer gives up.
    GiveUp { escalate: bool },
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
struct RetryCounter {
    failures: u32,
    escalated: bool,
}

/// Retry-then-escalate bookkeeping for the layers of one entry.
#[derive(Debug, Clone)]
pub struct TileFailurePolicy {
    rectangle: Rectangle,
    scheme: TilingScheme,
    options: TileErrorOptions,
    counters: BTreeMap<LayerHandle, RetryCounter>,
}

impl TileFailurePolicy {
    pub fn new(rectangle: Rectangle, scheme: TilingScheme, options: TileErrorOptions) -> Self {
        Self {
            rectangle,
            scheme,
            options,
            counters: BTreeMap::new(),
        }
    }

    pub fn options(&self) -> &TileErrorOptions {
        &self.options
    }

    /// True when the failure says nothing about the source's health.
    pub fn is_ignorable(&self, failure: &TileFailure) -> bool {
        let footprint = self.scheme.tile_rectangle(failure.tile);
        if !footprint.intersects(&self.rectangle) {
            return true;
        }
        match failure.status_code {
            Some(404) => !self.options.treat_404_as_error,
            Some(403) => !self.options.treat_403_as_error,
            None => self.options.ignore_unknown_tile_errors,
            Some(_) => false,
        }
    }

    pub fn classify(&mut self, handle: LayerHandle, failure: &TileFailure) -> TileErrorAction {
        if self.is_ignorable(failure) {
            return TileErrorAction::Ignore;
        }

        let counter = self.counters.entry(handle).or_default();
        counter.failures = counter.failures.saturating_add(1);
        if counter.failures < self.options.retry_limit {
            return TileErrorAction::Retry {
                attempt: counter.failures,
            };
        }

        let escalate = !counter.escalated;
        counter.escalated = true;
        TileErrorAction::GiveUp { escalate }
    }

    /// A tile of `handle` loaded; its consecutive-failure count restarts.
    pub fn record_success(&mut self, handle: LayerHandle) {
        if let Some(counter) = self.counters.get_mut(&handle) {
            counter.failures = 0;
        }
    }

    pub fn failures(&self, handle: LayerHandle) -> u32 {
        self.counters.get(&handle).map_or(0, |c| c.failures)
    }

    /// Drops counters for layers that are no longer resident.
    pub fn retain(&mut self, live: &[LayerHandle]) {
        self.counters.retain(|h, _| live.contains(h));
    }

    pub fn reset(&mut self) {
        self.counters.clear();
    }
}
