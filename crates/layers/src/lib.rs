//! Time-dynamic imagery layers.
//!
//! An [`ImageryEntry`] owns the intervals of one data source and, once shown,
//! keeps at most two layers resident on an [`ImageryBackend`] through the
//! [`PlaybackScheduler`]. A [`Workbench`] drives every entry from one clock.

pub mod backend;
pub mod entry;
pub mod imagery;
pub mod scheduler;
pub mod tile_errors;
pub mod workbench;

pub use backend::*;
pub use entry::*;
pub use imagery::*;
pub use scheduler::*;
pub use tile_errors::*;
pub use workbench::*;
