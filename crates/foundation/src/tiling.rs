//! Tile addressing and footprints.

use serde::{Deserialize, Serialize};

use crate::bounds::Rectangle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub level: u32,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, level: u32) -> Self {
        Self { x, y, level }
    }
}

/// How a tile address maps onto the globe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TilingScheme {
    /// Equirectangular, two root tiles side by side (EPSG:4326).
    #[default]
    Geographic,
    /// Spherical mercator, one root tile (EPSG:3857).
    WebMercator,
}

impl TilingScheme {
    pub fn tiles_x(self, level: u32) -> u64 {
        match self {
            TilingScheme::Geographic => 2u64 << level.min(62),
            TilingScheme::WebMercator => 1u64 << level.min(62),
        }
    }

    pub fn tiles_y(self, level: u32) -> u64 {
        1u64 << level.min(62)
    }

    /// Footprint of `tile` in degrees.
    pub fn tile_rectangle(self, tile: TileCoord) -> Rectangle {
        let nx = self.tiles_x(tile.level) as f64;
        let ny = self.tiles_y(tile.level) as f64;
        let west = tile.x as f64 / nx * 360.0 - 180.0;
        let east = (tile.x as f64 + 1.0) / nx * 360.0 - 180.0;

        match self {
            TilingScheme::Geographic => {
                let north = 90.0 - tile.y as f64 / ny * 180.0;
                let south = 90.0 - (tile.y as f64 + 1.0) / ny * 180.0;
                Rectangle::new(west, south, east, north)
            }
            TilingScheme::WebMercator => {
                let north = mercator_y_to_lat(tile.y as f64, ny);
                let south = mercator_y_to_lat(tile.y as f64 + 1.0, ny);
                Rectangle::new(west, south, east, north)
            }
        }
    }
}

fn mercator_y_to_lat(y: f64, n: f64) -> f64 {
    let v = std::f64::consts::PI - 2.0 * std::f64::consts::PI * y / n;
    v.sinh().atan().to_degrees()
}
