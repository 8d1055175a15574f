use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use fresco_shared::{TileRecord, world_to_tile};

use crate::viewport::Viewport;

/// Hard cap on tiles returned by a visible query, so a pathological zoom-out
/// cannot make a single frame unbounded. Truncation happens in insertion
/// order, not spatial priority; callers wanting "nearest first" must pre-sort
/// what they load.
pub const MAX_VISIBLE_TILES: usize = 768;

/// Signature of the viewport state a cached visible set was computed for:
/// floored offsets plus the zoom at two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VisibleKey {
    ox: i64,
    oy: i64,
    zoom_centi: i64,
}

impl VisibleKey {
    fn of(vp: &Viewport) -> Self {
        Self {
            ox: vp.offset_x.floor() as i64,
            oy: vp.offset_y.floor() as i64,
            zoom_centi: (vp.zoom * 100.0).round() as i64,
        }
    }
}

/// Insertion-ordered mapping from tile-grid coordinate to tile record, with
/// a memoized "currently visible" query.
///
/// The memo is correctness-critical, not a time-based cache: every mutation
/// clears it as its last step, unconditionally, so a stale visible set can
/// never be served. It lives behind a `RefCell` so queries take `&self`.
pub struct TileStore {
    tiles: IndexMap<(i32, i32), TileRecord>,
    revision: u64,
    visible: RefCell<Option<(VisibleKey, Rc<Vec<TileRecord>>)>>,
}

impl Default for TileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TileStore {
    pub fn new() -> Self {
        Self {
            tiles: IndexMap::new(),
            revision: 0,
            visible: RefCell::new(None),
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Bumped on every content mutation; mirrored into the reactive layer
    /// so effects can track store changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, x: i32, y: i32) -> Option<&TileRecord> {
        self.tiles.get(&(x, y))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.tiles.contains_key(&(x, y))
    }

    /// Insert or replace. Records are replaced whole, never merged.
    pub fn upsert(&mut self, tile: TileRecord) {
        self.tiles.insert(tile.key(), tile);
        self.revision = self.revision.wrapping_add(1);
        self.invalidate_visible();
    }

    pub fn remove(&mut self, x: i32, y: i32) -> Option<TileRecord> {
        let removed = self.tiles.shift_remove(&(x, y));
        if removed.is_some() {
            self.revision = self.revision.wrapping_add(1);
        }
        self.invalidate_visible();
        removed
    }

    /// Replace the whole store contents (canvas open / live resync).
    pub fn bulk_load(&mut self, tiles: Vec<TileRecord>) {
        self.tiles.clear();
        for tile in tiles {
            self.tiles.insert(tile.key(), tile);
        }
        self.revision = self.revision.wrapping_add(1);
        self.invalidate_visible();
    }

    /// Drop the visible memo. Mutations do this themselves; the coordinator
    /// also calls it when the surface is resized, since the signature does
    /// not encode surface dimensions.
    pub fn invalidate_visible(&self) {
        *self.visible.borrow_mut() = None;
    }

    /// Tiles whose cells intersect the viewport, capped at `max`.
    ///
    /// Serves the memoized set while the viewport signature matches;
    /// otherwise rescans the store, stores the new signature and result,
    /// and returns it.
    pub fn query_visible(
        &self,
        vp: &Viewport,
        surface_w: f64,
        surface_h: f64,
        tile_size: f64,
        max: usize,
    ) -> Rc<Vec<TileRecord>> {
        let key = VisibleKey::of(vp);
        if let Some((cached_key, cached)) = &*self.visible.borrow()
            && *cached_key == key
        {
            return cached.clone();
        }

        let (gx0, gy0, gx1, gy1) = visible_grid_rect(vp, surface_w, surface_h, tile_size);
        let mut out = Vec::new();
        for tile in self.tiles.values() {
            if tile.x >= gx0 && tile.x <= gx1 && tile.y >= gy0 && tile.y <= gy1 {
                out.push(tile.clone());
                if out.len() >= max {
                    break;
                }
            }
        }

        let result = Rc::new(out);
        *self.visible.borrow_mut() = Some((key, result.clone()));
        result
    }
}

/// Inclusive tile-grid rectangle covering the viewport:
/// (left, top, right, bottom) cell coordinates.
pub fn visible_grid_rect(
    vp: &Viewport,
    surface_w: f64,
    surface_h: f64,
    tile_size: f64,
) -> (i32, i32, i32, i32) {
    let (wl, wt, wr, wb) = vp.world_bounds(surface_w, surface_h);
    (
        world_to_tile(wl, tile_size),
        world_to_tile(wt, tile_size),
        (wr / tile_size).ceil() as i32,
        (wb / tile_size).ceil() as i32,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fresco_shared::PixelData;

    fn tile(x: i32, y: i32) -> TileRecord {
        TileRecord {
            x,
            y,
            pixels: PixelData::solid(2),
            creator: None,
            created_at: None,
        }
    }

    fn viewport() -> Viewport {
        Viewport {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
        }
    }

    #[test]
    fn upsert_replaces_by_grid_key() {
        let mut store = TileStore::new();
        store.upsert(tile(1, 1));
        let mut replacement = tile(1, 1);
        replacement.creator = Some("ada".into());
        store.upsert(replacement);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1, 1).unwrap().creator.as_deref(), Some("ada"));
    }

    #[test]
    fn query_visible_serves_memo_until_signature_moves() {
        let mut store = TileStore::new();
        store.upsert(tile(0, 0));
        let vp = viewport();
        let first = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        let second = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(Rc::ptr_eq(&first, &second));

        let mut moved = vp.clone();
        moved.pan_by(64.0, 0.0);
        let third = store.query_visible(&moved, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn mutations_always_invalidate_the_memo() {
        let mut store = TileStore::new();
        store.upsert(tile(0, 0));
        let vp = viewport();

        let before = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        store.upsert(tile(1, 0));
        let after_upsert = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(!Rc::ptr_eq(&before, &after_upsert));
        assert_eq!(after_upsert.len(), 2);

        store.remove(1, 0);
        let after_remove = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(!Rc::ptr_eq(&after_upsert, &after_remove));
        assert_eq!(after_remove.len(), 1);

        // Removing a key that is not present still invalidates.
        let cached = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        store.remove(99, 99);
        let recomputed = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(!Rc::ptr_eq(&cached, &recomputed));

        store.bulk_load(vec![tile(2, 2)]);
        let after_bulk = store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert!(!Rc::ptr_eq(&recomputed, &after_bulk));
    }

    #[test]
    fn query_filters_to_the_covering_grid_rect() {
        let mut store = TileStore::new();
        store.upsert(tile(-2, -1));
        store.upsert(tile(0, 0));
        store.upsert(tile(500, 500));
        let vp = Viewport {
            offset_x: -100.0,
            offset_y: -50.0,
            zoom: 2.0,
        };
        let visible = store.query_visible(&vp, 200.0, 100.0, 32.0, MAX_VISIBLE_TILES);
        let keys: Vec<(i32, i32)> = visible.iter().map(|t| t.key()).collect();
        assert!(keys.contains(&(-2, -1)));
        assert!(keys.contains(&(0, 0)));
        assert!(!keys.contains(&(500, 500)));
    }

    #[test]
    fn truncation_follows_insertion_order() {
        let mut store = TileStore::new();
        for x in 0..10 {
            store.upsert(tile(x, 0));
        }
        let vp = viewport();
        let visible = store.query_visible(&vp, 800.0, 600.0, 32.0, 3);
        let keys: Vec<(i32, i32)> = visible.iter().map(|t| t.key()).collect();
        assert_eq!(keys, vec![(0, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn revision_tracks_mutations_only() {
        let mut store = TileStore::new();
        let r0 = store.revision();
        store.upsert(tile(0, 0));
        let r1 = store.revision();
        assert_ne!(r0, r1);
        let vp = viewport();
        store.query_visible(&vp, 800.0, 600.0, 32.0, MAX_VISIBLE_TILES);
        assert_eq!(store.revision(), r1);
        store.remove(50, 50);
        assert_eq!(store.revision(), r1);
        store.remove(0, 0);
        assert_ne!(store.revision(), r1);
    }

    #[test]
    fn grid_rect_covers_negative_world_space() {
        let vp = Viewport {
            offset_x: -100.0,
            offset_y: -50.0,
            zoom: 2.0,
        };
        let (gx0, gy0, gx1, gy1) = visible_grid_rect(&vp, 200.0, 100.0, 32.0);
        assert_eq!((gx0, gy0), (-4, -2));
        assert_eq!((gx1, gy1), (0, 0));
    }
}
