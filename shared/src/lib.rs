pub mod colors;
pub mod events;
pub mod pixels;
pub mod tile;

pub use colors::creator_color;
pub use events::*;
pub use pixels::{PALETTE, PixelData, TILE_PIXELS};
pub use tile::*;
