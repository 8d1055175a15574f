use serde::{Deserialize, Serialize};

use crate::tile::{DEFAULT_TILE_SIZE, TileRecord};

/// Canvas metadata delivered with the snapshot: world-unit bounds and the
/// tile cell size the grid math uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasInfo {
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_tile_size")]
    pub tile_size: f64,
    #[serde(default)]
    pub name: String,
}

fn default_tile_size() -> f64 {
    DEFAULT_TILE_SIZE
}

/// Events on the live stream. `seq` is a monotonically increasing stream
/// sequence; `0` marks a legacy payload without sequencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CanvasEvent {
    Snapshot {
        #[serde(default)]
        seq: u64,
        canvas: CanvasInfo,
        tiles: Vec<TileRecord>,
    },
    Created {
        #[serde(default)]
        seq: u64,
        tile: TileRecord,
    },
    Updated {
        #[serde(default)]
        seq: u64,
        tile: TileRecord,
    },
    Removed {
        #[serde(default)]
        seq: u64,
        x: i32,
        y: i32,
    },
}

impl CanvasEvent {
    pub fn seq(&self) -> u64 {
        match self {
            CanvasEvent::Snapshot { seq, .. }
            | CanvasEvent::Created { seq, .. }
            | CanvasEvent::Updated { seq, .. }
            | CanvasEvent::Removed { seq, .. } => *seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::PixelData;

    #[test]
    fn tagged_events_round_trip() {
        let event = CanvasEvent::Created {
            seq: 12,
            tile: TileRecord {
                x: -3,
                y: 9,
                pixels: PixelData::solid(7),
                creator: Some("ada".into()),
                created_at: None,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Created""#));
        let back: CanvasEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq(), 12);
        match back {
            CanvasEvent::Created { tile, .. } => assert_eq!(tile.key(), (-3, 9)),
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn missing_seq_defaults_to_zero() {
        let json = r#"{"type":"Removed","x":1,"y":2}"#;
        let event: CanvasEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.seq(), 0);
    }

    #[test]
    fn canvas_info_defaults_tile_size() {
        let info: CanvasInfo = serde_json::from_str(r#"{"width":4096,"height":4096}"#).unwrap();
        assert_eq!(info.tile_size, DEFAULT_TILE_SIZE);
        assert!(info.name.is_empty());
    }
}
