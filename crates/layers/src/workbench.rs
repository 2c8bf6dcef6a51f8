use foundation::handles::LayerHandle;
use foundation::time::Time;
use runtime::clock::{Clock, ClockTick};
use runtime::diagnostics::Diagnostics;

use crate::backend::{BackendKind, ImageryBackend};
use crate::entry::{EntryError, ImageryEntry};
use crate::scheduler::TickReport;
use crate::tile_errors::{TileErrorAction, TileFailure};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(pub usize);

/// Host loop for imagery entries sharing one backend and one clock.
///
/// Ordering contract:
/// - entries are ticked in insertion order.
/// - `tick` never fails; problems surface through `diagnostics`.
/// - entries with their own clock advance it by the same host `dt_ms` and
///   ignore `set_time` on the shared clock.
pub struct Workbench {
    backend: Box<dyn ImageryBackend>,
    clock: Clock,
    entries: Vec<ImageryEntry>,
    diagnostics: Diagnostics,
}

impl Workbench {
    pub fn new(kind: BackendKind, clock: Clock) -> Self {
        Self::with_backend(kind.build(), clock)
    }

    pub fn with_backend(backend: Box<dyn ImageryBackend>, clock: Clock) -> Self {
        Self {
            backend,
            clock,
            entries: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn backend(&self) -> &dyn ImageryBackend {
        self.backend.as_ref()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn add_entry(&mut self, entry: ImageryEntry) -> EntryId {
        self.entries.push(entry);
        EntryId(self.entries.len() - 1)
    }

    pub fn entry(&self, id: EntryId) -> Option<&ImageryEntry> {
        self.entries.get(id.0)
    }

    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &ImageryEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (EntryId(i), e))
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut ImageryEntry, EntryError> {
        self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))
    }

    pub fn enable(&mut self, id: EntryId) -> Result<(), EntryError> {
        self.entry_mut(id)?.enable()
    }

    pub fn disable(&mut self, id: EntryId) -> Result<(), EntryError> {
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        entry.disable(self.backend.as_mut());
        Ok(())
    }

    pub fn show(&mut self, id: EntryId) -> Result<(), EntryError> {
        let shared = self.clock.tick();
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        let tick = entry.effective_tick(&shared);
        entry.show(self.backend.as_mut(), &tick)
    }

    pub fn hide(&mut self, id: EntryId) -> Result<(), EntryError> {
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        entry.hide(self.backend.as_mut());
        Ok(())
    }

    pub fn refresh(&mut self, id: EntryId) -> Result<(), EntryError> {
        let shared = self.clock.tick();
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        let tick = entry.effective_tick(&shared);
        entry.refresh(self.backend.as_mut(), &tick)
    }

    pub fn set_opacity(&mut self, id: EntryId, opacity: f64) -> Result<(), EntryError> {
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        entry.set_opacity(self.backend.as_mut(), opacity);
        Ok(())
    }

    /// Advances the clock by `dt_ms` of host time and syncs every entry.
    pub fn tick(&mut self, dt_ms: i64) -> Vec<(EntryId, TickReport)> {
        let tick = self.clock.advance(dt_ms);
        self.sync_all(&tick, dt_ms)
    }

    /// Jumps the shared clock to `time` and syncs every entry.
    pub fn set_time(&mut self, time: Time) -> Vec<(EntryId, TickReport)> {
        self.clock.set_time(time);
        let tick = self.clock.tick();
        self.sync_all(&tick, 0)
    }

    /// Jumps one entry's own clock to `time` and syncs that entry.
    pub fn set_entry_time(&mut self, id: EntryId, time: Time) -> Result<Option<TickReport>, EntryError> {
        let shared = self.clock.tick();
        let entry = self.entries.get_mut(id.0).ok_or(EntryError::UnknownEntry(id.0))?;
        let Some(clock) = entry.own_clock_mut() else {
            return Err(EntryError::NoOwnClock);
        };
        clock.set_time(time);
        let tick = entry.effective_tick(&shared);
        Ok(entry.on_tick(self.backend.as_mut(), &tick))
    }

    fn sync_all(&mut self, shared: &ClockTick, dt_ms: i64) -> Vec<(EntryId, TickReport)> {
        let backend = self.backend.as_mut();
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(i, entry)| {
                let tick = if dt_ms == 0 {
                    entry.effective_tick(shared)
                } else {
                    entry.advance_clock(shared, dt_ms)
                };
                entry.on_tick(backend, &tick).map(|r| (EntryId(i), r))
            })
            .collect()
    }

    /// Routes a tile failure to the entry owning `handle`.
    pub fn report_tile_failure(&mut self, handle: LayerHandle, failure: TileFailure) -> TileErrorAction {
        let backend = self.backend.as_mut();
        match self.entries.iter_mut().find(|e| e.owns(handle)) {
            Some(entry) => entry.handle_tile_failure(backend, handle, &failure, &mut self.diagnostics),
            None => TileErrorAction::Ignore,
        }
    }

    pub fn record_tile_success(&mut self, handle: LayerHandle) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.owns(handle)) {
            entry.record_tile_success(handle);
        }
    }
}
