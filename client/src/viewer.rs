use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;

use fresco_shared::{CanvasInfo, DEFAULT_TILE_SIZE, TileRecord, world_to_tile};

use crate::animation::{
    AnimationKind, AnimationQueue, CREATE_DURATION_MS, REMOVE_DURATION_MS, UPDATE_DURATION_MS,
};
use crate::app::canvas_dimensions;
use crate::interaction::Intent;
use crate::store::TileStore;
use crate::viewport::Viewport;

/// Zoom applied by the zoom-in/zoom-out controls, matching a wheel notch.
const BUTTON_ZOOM_IN: f64 = 1.1;
const BUTTON_ZOOM_OUT: f64 = 0.9;
/// A double-tap dives toward the tapped point.
const DOUBLE_TAP_ZOOM: f64 = 2.0;

/// What a click or hover resolved to: the tile-grid cell plus the record
/// there. `record` is `None` for an empty cell, so callers always get the
/// cell coordinates even when nothing is placed.
#[derive(Debug, Clone, PartialEq)]
pub struct TileHit {
    pub x: i32,
    pub y: i32,
    pub record: Option<TileRecord>,
}

impl TileHit {
    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }
}

/// Callbacks exposed to the embedding application. Unset slots are no-ops.
#[derive(Default)]
pub struct ViewerCallbacks {
    pub on_tile_click: RefCell<Option<Box<dyn Fn(&TileHit)>>>,
    pub on_tile_hover: RefCell<Option<Box<dyn Fn(&TileHit)>>>,
    pub on_viewport_change: RefCell<Option<Box<dyn Fn(f64, f64, f64)>>>,
}

/// Render-layer visibility toggles.
#[derive(Clone, Copy)]
pub struct LayerToggles {
    pub grid: RwSignal<bool>,
    pub outlines: RwSignal<bool>,
    pub labels: RwSignal<bool>,
}

/// The coordinator: owns the viewport, the tile store, the animation queue,
/// and is the single consumer of interaction intents. Everything the rest of
/// the application does to the canvas goes through here.
///
/// The store lives behind `Rc<RefCell<_>>`; `store_rev` is its reactive
/// shadow, bumped after every mutation so effects can track changes without
/// the store itself living inside a signal.
#[derive(Clone)]
pub struct Viewer {
    pub viewport: RwSignal<Viewport>,
    pub store: Rc<RefCell<TileStore>>,
    pub store_rev: RwSignal<u64>,
    pub canvas: RwSignal<Option<CanvasInfo>>,
    pub hovered: RwSignal<Option<TileHit>>,
    pub selected: RwSignal<Option<TileHit>>,
    pub layers: LayerToggles,
    pub animations: Rc<RefCell<AnimationQueue>>,
    /// Bumped on enqueue; the canvas component watches it to (re)start the
    /// animation ticker.
    pub animation_nonce: RwSignal<u64>,
    pub callbacks: Rc<ViewerCallbacks>,
}

impl Viewer {
    pub fn new(show_grid: bool, show_outlines: bool, show_labels: bool) -> Self {
        Self {
            viewport: RwSignal::new(Viewport::default()),
            store: Rc::new(RefCell::new(TileStore::new())),
            store_rev: RwSignal::new(0),
            canvas: RwSignal::new(None),
            hovered: RwSignal::new(None),
            selected: RwSignal::new(None),
            layers: LayerToggles {
                grid: RwSignal::new(show_grid),
                outlines: RwSignal::new(show_outlines),
                labels: RwSignal::new(show_labels),
            },
            animations: Rc::new(RefCell::new(AnimationQueue::new())),
            animation_nonce: RwSignal::new(0),
            callbacks: Rc::new(ViewerCallbacks::default()),
        }
    }

    pub fn tile_size(&self) -> f64 {
        self.canvas
            .with_untracked(|c| c.as_ref().map(|c| c.tile_size))
            .unwrap_or(DEFAULT_TILE_SIZE)
    }

    /// Apply a viewport mutation; writes the signal and fires the viewport
    /// callback only when the mutator reports an actual change, so clamped
    /// no-ops stay silent.
    fn mutate_viewport(&self, f: impl FnOnce(&mut Viewport) -> bool) -> bool {
        let mut vp = self.viewport.get_untracked();
        if !f(&mut vp) {
            return false;
        }
        let (ox, oy, zoom) = (vp.offset_x, vp.offset_y, vp.zoom);
        self.viewport.set(vp);
        if let Some(cb) = self.callbacks.on_viewport_change.borrow().as_ref() {
            cb(ox, oy, zoom);
        }
        true
    }

    /// Run a store mutation and publish the store's revision to the
    /// reactive layer.
    fn mutate_store(&self, f: impl FnOnce(&mut TileStore)) {
        let rev = {
            let mut store = self.store.borrow_mut();
            f(&mut store);
            store.revision()
        };
        self.store_rev.set(rev);
    }

    fn enqueue_animation(&self, kind: AnimationKind, x: i32, y: i32, duration: f64) {
        self.animations.borrow_mut().enqueue(kind, x, y, duration);
        self.animation_nonce.update(|n| *n = n.wrapping_add(1));
    }

    // --- Public contract -------------------------------------------------

    /// Install canvas metadata (world bounds, tile size). Malformed input is
    /// logged and ignored.
    pub fn set_canvas_data(&self, info: CanvasInfo) {
        if !(info.width > 0.0 && info.height > 0.0 && info.tile_size > 0.0) {
            web_sys::console::warn_1(
                &format!(
                    "Ignoring malformed canvas data: {}x{} tile_size={}",
                    info.width, info.height, info.tile_size
                )
                .into(),
            );
            return;
        }
        self.canvas.set(Some(info));
    }

    /// Replace the tile set wholesale (initial load, live resync). Invalid
    /// records are dropped with a log line; the rest load normally.
    pub fn load_tiles(&self, tiles: Vec<TileRecord>) {
        let mut valid = Vec::with_capacity(tiles.len());
        for tile in tiles {
            match tile.validate() {
                Ok(()) => valid.push(tile),
                Err(reason) => {
                    web_sys::console::warn_1(&format!("Skipping tile: {reason}").into());
                }
            }
        }
        self.mutate_store(|store| store.bulk_load(valid));
    }

    /// Insert or replace one tile, optionally animating its arrival.
    pub fn add_tile(&self, tile: TileRecord, animate: bool) {
        if let Err(reason) = tile.validate() {
            web_sys::console::warn_1(&format!("Rejecting tile: {reason}").into());
            return;
        }
        let (x, y) = tile.key();
        let existed = self.store.borrow().contains(x, y);
        self.mutate_store(|store| store.upsert(tile));
        if animate {
            if existed {
                self.enqueue_animation(AnimationKind::Update, x, y, UPDATE_DURATION_MS);
            } else {
                self.enqueue_animation(AnimationKind::Create, x, y, CREATE_DURATION_MS);
            }
        }
    }

    /// Remove a tile. With `animate` the record stays in the store, fading,
    /// until the removal animation completes; without, it goes immediately.
    pub fn remove_tile(&self, x: i32, y: i32, animate: bool) {
        if animate && self.store.borrow().contains(x, y) {
            self.enqueue_animation(AnimationKind::Remove, x, y, REMOVE_DURATION_MS);
        } else {
            self.mutate_store(|store| {
                store.remove(x, y);
            });
        }
    }

    pub fn get_tile_at_screen_position(&self, sx: f64, sy: f64) -> TileHit {
        let vp = self.viewport.get_untracked();
        resolve_hit(&vp, &self.store.borrow(), self.tile_size(), sx, sy)
    }

    pub fn center_view(&self) {
        let Some((content_w, content_h)) =
            self.canvas.with_untracked(|c| c.as_ref().map(|c| (c.width, c.height)))
        else {
            return;
        };
        let (sw, sh) = canvas_dimensions();
        self.mutate_viewport(|vp| vp.center(content_w, content_h, sw, sh));
    }

    pub fn reset_view(&self) {
        self.mutate_viewport(|vp| vp.reset());
    }

    pub fn zoom_in(&self) {
        let (sw, sh) = canvas_dimensions();
        self.mutate_viewport(|vp| vp.zoom_toward(sw / 2.0, sh / 2.0, BUTTON_ZOOM_IN));
    }

    pub fn zoom_out(&self) {
        let (sw, sh) = canvas_dimensions();
        self.mutate_viewport(|vp| vp.zoom_toward(sw / 2.0, sh / 2.0, BUTTON_ZOOM_OUT));
    }

    /// Back to 1:1 zoom, keeping the surface center fixed.
    pub fn reset_zoom(&self) {
        let (sw, sh) = canvas_dimensions();
        self.mutate_viewport(|vp| {
            let factor = 1.0 / vp.zoom;
            vp.zoom_toward(sw / 2.0, sh / 2.0, factor)
        });
    }

    pub fn toggle_grid(&self) {
        self.layers.grid.update(|v| *v = !*v);
    }

    pub fn toggle_outlines(&self) {
        self.layers.outlines.update(|v| *v = !*v);
    }

    pub fn toggle_labels(&self) {
        self.layers.labels.update(|v| *v = !*v);
    }

    // --- Intent application ----------------------------------------------

    /// The single consumer of interaction intents.
    pub fn apply_intent(&self, intent: Intent) {
        match intent {
            Intent::Pan { dx, dy } => {
                self.mutate_viewport(|vp| vp.pan_by(dx, dy));
            }
            Intent::Zoom { sx, sy, factor } => {
                self.mutate_viewport(|vp| vp.zoom_toward(sx, sy, factor));
            }
            Intent::Click { sx, sy } => {
                let hit = self.get_tile_at_screen_position(sx, sy);
                if let Some(cb) = self.callbacks.on_tile_click.borrow().as_ref() {
                    cb(&hit);
                }
                self.selected.set(Some(hit));
            }
            Intent::Hover { sx, sy } => {
                let hit = self.get_tile_at_screen_position(sx, sy);
                if let Some(cb) = self.callbacks.on_tile_hover.borrow().as_ref() {
                    cb(&hit);
                }
                if self.hovered.with_untracked(|h| h.as_ref() != Some(&hit)) {
                    self.hovered.set(Some(hit));
                }
            }
            Intent::HoverCleared => {
                if self.hovered.with_untracked(|h| h.is_some()) {
                    self.hovered.set(None);
                }
            }
            Intent::DoubleTap { sx, sy } => {
                let hit = self.get_tile_at_screen_position(sx, sy);
                self.selected.set(Some(hit));
                self.mutate_viewport(|vp| vp.zoom_toward(sx, sy, DOUBLE_TAP_ZOOM));
            }
        }
    }

    pub fn apply_intents(&self, intents: Vec<Intent>) {
        for intent in intents {
            self.apply_intent(intent);
        }
    }

    // --- Animation driver -------------------------------------------------

    /// One animation-clock tick: advance the queue, apply completed
    /// removals, report whether the ticker should keep running. The canvas
    /// component follows each tick with a forced render.
    pub fn animation_tick(&self, now_ms: f64) -> bool {
        let completed = self.animations.borrow_mut().advance(now_ms);
        let mut deleted = false;
        for anim in completed {
            if anim.kind == AnimationKind::Remove {
                self.store.borrow_mut().remove(anim.x, anim.y);
                deleted = true;
            }
        }
        if deleted {
            self.store_rev.set(self.store.borrow().revision());
        }
        !self.animations.borrow().is_idle()
    }

    // --- Recovery ---------------------------------------------------------

    /// Surface-loss recovery: reinitialize viewport, visible memo, and
    /// transient visual state without touching tile data.
    pub fn emergency_reset(&self) {
        self.mutate_viewport(|vp| vp.reset());
        self.store.borrow().invalidate_visible();
        self.animations.borrow_mut().clear();
        self.hovered.set(None);
        self.selected.set(None);
        // Same revision, fresh notification: observers repaint from the
        // reset state.
        self.store_rev.set(self.store.borrow().revision());
    }
}

/// Resolve a surface position to the tile-grid cell under it. All hit
/// testing funnels through this one function and the viewport's conversion.
pub fn resolve_hit(
    vp: &Viewport,
    store: &TileStore,
    tile_size: f64,
    sx: f64,
    sy: f64,
) -> TileHit {
    let (wx, wy) = vp.screen_to_world(sx, sy);
    let x = world_to_tile(wx, tile_size);
    let y = world_to_tile(wy, tile_size);
    TileHit {
        x,
        y,
        record: store.get(x, y).cloned(),
    }
}
