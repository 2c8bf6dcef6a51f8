//! Geographic extents.

use serde::{Deserialize, Serialize};

/// Geographic rectangle in degrees (WGS84).
///
/// Antimeridian-crossing extents are not supported: `west <= east` is
/// expected.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Rectangle {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    pub fn world() -> Self {
        Self::new(-180.0, -90.0, 180.0, 90.0)
    }

    /// Overlapping area, if any. Rectangles that only share an edge do not
    /// intersect.
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        if west < east && south < north {
            Some(Rectangle::new(west, south, east, north))
        } else {
            None
        }
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.intersection(other).is_some()
    }
}
