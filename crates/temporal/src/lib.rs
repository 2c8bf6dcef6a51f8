//! Time axes for time-varying imagery.
//!
//! Metadata describes availability as `start/stop[/period]` extents; this
//! crate turns those into a bounded list of tagged samples and then into an
//! ordered collection of half-open intervals the playback scheduler can
//! search.

pub mod axis;
pub mod duration;
pub mod intervals;

pub use axis::*;
pub use duration::*;
pub use intervals::*;
