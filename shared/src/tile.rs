use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pixels::PixelData;

/// Default edge length of one tile cell in world units.
pub const DEFAULT_TILE_SIZE: f64 = 32.0;

/// Grid coordinates beyond this are rejected as malformed input.
pub const COORD_LIMIT: i32 = 1_000_000;

/// One placed tile. Grid coordinates `(x, y)` are the unique key; an update
/// replaces the whole record, records are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub x: i32,
    pub y: i32,
    pub pixels: PixelData,
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TileRecord {
    pub fn key(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Structural validation for records arriving from outside; content
    /// beyond the coordinate range and pixel length stays opaque here.
    pub fn validate(&self) -> Result<(), String> {
        if self.x.abs() > COORD_LIMIT || self.y.abs() > COORD_LIMIT {
            return Err(format!("tile ({}, {}) is out of range", self.x, self.y));
        }
        if self.pixels.as_str().len() != crate::pixels::PIXEL_COUNT {
            return Err(format!(
                "tile ({}, {}) has malformed pixel data",
                self.x, self.y
            ));
        }
        Ok(())
    }
}

/// World coordinate to tile-grid coordinate. Floors toward negative infinity
/// so cells at negative world coordinates land in the right column/row.
pub fn world_to_tile(w: f64, tile_size: f64) -> i32 {
    (w / tile_size).floor() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: i32, y: i32) -> TileRecord {
        TileRecord {
            x,
            y,
            pixels: PixelData::solid(1),
            creator: None,
            created_at: None,
        }
    }

    #[test]
    fn world_to_tile_floors_negative_coordinates() {
        assert_eq!(world_to_tile(-50.0, 32.0), -2);
        assert_eq!(world_to_tile(-25.0, 32.0), -1);
        assert_eq!(world_to_tile(0.0, 32.0), 0);
        assert_eq!(world_to_tile(31.9, 32.0), 0);
        assert_eq!(world_to_tile(32.0, 32.0), 1);
        assert_eq!(world_to_tile(-32.0, 32.0), -1);
        assert_eq!(world_to_tile(-33.0, 32.0), -2);
    }

    #[test]
    fn validate_accepts_ordinary_records() {
        assert!(record(0, 0).validate().is_ok());
        assert!(record(-4096, 8000).validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_coordinates() {
        assert!(record(COORD_LIMIT + 1, 0).validate().is_err());
        assert!(record(0, -COORD_LIMIT - 1).validate().is_err());
    }

    #[test]
    fn validate_rejects_truncated_pixels() {
        let mut bad = record(1, 2);
        bad.pixels = PixelData::new("0f");
        assert!(bad.validate().is_err());
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = format!(r#"{{"x":3,"y":-7,"pixels":"{}"}}"#, PixelData::solid(0).as_str());
        let tile: TileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(tile.key(), (3, -7));
        assert!(tile.creator.is_none());
        assert!(tile.created_at.is_none());
    }
}
