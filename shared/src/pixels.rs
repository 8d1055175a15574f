use serde::{Deserialize, Serialize};

/// Tile artwork edge length in pixels.
pub const TILE_PIXELS: usize = 16;

/// Number of pixels in one tile's artwork.
pub const PIXEL_COUNT: usize = TILE_PIXELS * TILE_PIXELS;

/// Fixed 16-color palette. A pixel stores a palette index (one hex nibble).
pub const PALETTE: [(u8, u8, u8); 16] = [
    (255, 255, 255), // 0 white
    (228, 228, 228), // 1 light gray
    (136, 136, 136), // 2 gray
    (34, 34, 34),    // 3 near-black
    (255, 167, 209), // 4 pink
    (229, 0, 0),     // 5 red
    (229, 149, 0),   // 6 orange
    (160, 106, 66),  // 7 brown
    (229, 217, 0),   // 8 yellow
    (148, 224, 68),  // 9 light green
    (2, 190, 1),     // 10 green
    (0, 211, 221),   // 11 cyan
    (0, 131, 199),   // 12 blue
    (0, 0, 234),     // 13 dark blue
    (207, 110, 228), // 14 lavender
    (130, 0, 128),   // 15 purple
];

/// A tile's artwork: an opaque 16x16 grid of palette indices, carried on the
/// wire as a 256-character hex string (one nibble per pixel, row-major).
///
/// The encoding is treated as opaque until draw time; [`PixelData::decode`]
/// validates and expands it, and clients cache the decoded form per tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelData(String);

impl PixelData {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// A grid filled with a single palette index. Index is masked to 4 bits.
    pub fn solid(index: u8) -> Self {
        let nibble = char::from_digit((index & 0x0f) as u32, 16).unwrap_or('0');
        Self(nibble.to_string().repeat(PIXEL_COUNT))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expand to row-major palette indices. Rejects wrong lengths and
    /// non-hex characters rather than guessing at partial artwork.
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        if self.0.len() != PIXEL_COUNT {
            return Err(format!(
                "pixel data has {} characters, expected {PIXEL_COUNT}",
                self.0.len()
            ));
        }
        self.0
            .chars()
            .map(|c| {
                c.to_digit(16)
                    .map(|d| d as u8)
                    .ok_or_else(|| format!("invalid pixel character {c:?}"))
            })
            .collect()
    }
}

/// Palette lookup; out-of-range indices are masked to 4 bits.
pub fn palette_rgb(index: u8) -> (u8, u8, u8) {
    PALETTE[(index & 0x0f) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_grid_decodes_to_uniform_indices() {
        let data = PixelData::solid(5);
        let pixels = data.decode().expect("solid grid decodes");
        assert_eq!(pixels.len(), PIXEL_COUNT);
        assert!(pixels.iter().all(|&p| p == 5));
    }

    #[test]
    fn solid_masks_out_of_range_index() {
        assert_eq!(PixelData::solid(0x15), PixelData::solid(5));
    }

    #[test]
    fn decode_rejects_wrong_length() {
        let err = PixelData::new("0f0f").decode().unwrap_err();
        assert!(err.contains("4 characters"), "unexpected error: {err}");
    }

    #[test]
    fn decode_rejects_non_hex_characters() {
        let mut raw = "0".repeat(PIXEL_COUNT);
        raw.replace_range(10..11, "g");
        let err = PixelData::new(raw).decode().unwrap_err();
        assert!(err.contains("invalid pixel character"), "unexpected error: {err}");
    }

    #[test]
    fn decode_preserves_row_major_order() {
        let mut raw = "0".repeat(PIXEL_COUNT);
        raw.replace_range(0..1, "f");
        raw.replace_range(17..18, "a");
        let pixels = PixelData::new(raw).decode().unwrap();
        assert_eq!(pixels[0], 15);
        assert_eq!(pixels[17], 10);
        assert_eq!(pixels[1], 0);
    }

    #[test]
    fn serde_is_transparent() {
        let data = PixelData::solid(3);
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, format!("\"{}\"", data.as_str()));
        let back: PixelData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn palette_lookup_masks_index() {
        assert_eq!(palette_rgb(0), (255, 255, 255));
        assert_eq!(palette_rgb(16), palette_rgb(0));
        assert_eq!(palette_rgb(0xff), palette_rgb(15));
    }
}
