use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use leptos::prelude::*;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, PointerEvent, TouchEvent, WheelEvent};

use fresco_shared::pixels::{TILE_PIXELS, palette_rgb};
use fresco_shared::{CanvasInfo, TileRecord, creator_color};

use crate::animation::{AnimationKind, AnimationQueue};
use crate::app::ControllerHandle;
use crate::colors::{brighten, rgb_css, rgba_css};
use crate::interaction::PointerButton;
use crate::live::ConnectionStatus;
use crate::render_loop::{FrameTicker, RenderScheduler};
use crate::store::{MAX_VISIBLE_TILES, visible_grid_rect};
use crate::viewer::{TileHit, Viewer};
use crate::viewport::Viewport;

const BACKGROUND_CSS: &str = "#11141c";
const BOUNDS_BORDER_CSS: &str = "rgba(245,197,66,0.45)";
const GRID_LINE_CSS: &str = "rgba(255,255,255,0.07)";
const EMPTY_CELL_CSS: &str = "rgba(255,255,255,0.025)";
const OUTLINE_CSS: &str = "rgba(255,255,255,0.18)";
const HOVER_OUTLINE_CSS: &str = "rgba(255,255,255,0.65)";
const SELECTED_OUTLINE_CSS: &str = "rgba(245,197,66,0.9)";
const HUD_FONT: &str = "12px monospace";
const LABEL_FONT: &str = "11px monospace";

/// Grid lines appear once a cell spans at least this many screen pixels.
const GRID_MIN_CELL_PX: f64 = 8.0;
/// Empty-cell placeholders appear at this cell size.
const EMPTY_CELL_MIN_PX: f64 = 24.0;
/// Creator labels appear at this cell size.
const LABEL_MIN_CELL_PX: f64 = 48.0;
const LABEL_MAX_CHARS: usize = 14;

/// Decoded tile artwork, rasterized once per content change onto a small
/// offscreen canvas and blitted scaled from there. Keyed by grid cell; the
/// stored hash detects replaced artwork. Cleared wholesale when it grows
/// past the cap.
const BITMAP_CACHE_MAX_ENTRIES: usize = 2048;
type TileBitmapCache = HashMap<(i32, i32), (u64, HtmlCanvasElement)>;

fn pixels_signature(encoded: &str) -> u64 {
    encoded.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| {
        (acc ^ b as u64).wrapping_mul(0x1_0000_01b3)
    })
}

/// The rendering surface plus its input handlers. Raw DOM events feed the
/// interaction state machine; the resulting intents go to the coordinator,
/// which is the only thing that mutates viewport or store.
#[component]
pub fn CanvasViewer(
    viewer: Viewer,
    controller: ControllerHandle,
    status: RwSignal<ConnectionStatus>,
    resize_nonce: RwSignal<u64>,
    escape_nonce: RwSignal<u64>,
) -> impl IntoView {
    let ControllerHandle(controller) = controller;

    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();

    // Cached 2D context (invalidated on canvas resize) and surface-loss flag.
    let cached_ctx: Rc<RefCell<Option<CanvasRenderingContext2d>>> = Rc::new(RefCell::new(None));
    let had_ctx = Rc::new(Cell::new(false));

    let bitmaps: Rc<RefCell<TileBitmapCache>> = Rc::new(RefCell::new(HashMap::new()));

    // Render function: sizes the backing store to the container, then runs
    // the layer pipeline. A draw failure is caught here, logged, and
    // replaced by an error placeholder; the scheduler stays usable.
    let scheduler = {
        let viewer = viewer.clone();
        let cached_ctx = cached_ctx.clone();
        let had_ctx = had_ctx.clone();
        let bitmaps = bitmaps.clone();
        Rc::new(RenderScheduler::new(move || {
            let Some(canvas) = canvas_ref.get_untracked() else {
                return;
            };
            let canvas: &HtmlCanvasElement = &canvas;
            let Some(parent) = canvas.parent_element() else {
                return;
            };
            let w = parent.client_width().max(0) as u32;
            let h = parent.client_height().max(0) as u32;
            if w == 0 || h == 0 {
                return;
            }
            let dpr = web_sys::window()
                .map(|win| win.device_pixel_ratio())
                .unwrap_or(1.0)
                .max(1.0);
            let pw = (w as f64 * dpr).round() as u32;
            let ph = (h as f64 * dpr).round() as u32;
            if canvas.width() != pw || canvas.height() != ph {
                canvas.set_width(pw);
                canvas.set_height(ph);
                // Resize resets 2D context state; drop the cached handle.
                *cached_ctx.borrow_mut() = None;
            }

            let ctx = {
                let mut slot = cached_ctx.borrow_mut();
                if slot.is_none() {
                    let fresh = canvas
                        .get_context("2d")
                        .ok()
                        .flatten()
                        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok());
                    match fresh {
                        Some(ctx) => {
                            ctx.scale(dpr, dpr).ok();
                            had_ctx.set(true);
                            *slot = Some(ctx);
                        }
                        None => {
                            // Context was available before and now is not:
                            // the surface is gone. Reset transient state so
                            // a replacement surface starts clean.
                            if had_ctx.get() {
                                had_ctx.set(false);
                                web_sys::console::error_1(
                                    &"Rendering context lost; resetting view state".into(),
                                );
                                viewer.emergency_reset();
                            }
                            return;
                        }
                    }
                }
                let Some(ctx) = slot.clone() else {
                    return;
                };
                ctx
            };

            let result = draw_frame(
                &ctx,
                w as f64,
                h as f64,
                &viewer,
                status.get_untracked(),
                &mut bitmaps.borrow_mut(),
            );
            if let Err(err) = result {
                web_sys::console::error_1(&err);
                paint_error_placeholder(&ctx, w as f64, h as f64);
            }
        }))
    };

    // Animation clock: separate from the coalesced path so animation frames
    // are never throttled away. Each tick forces exactly one draw.
    let ticker = {
        let viewer = viewer.clone();
        let scheduler = scheduler.clone();
        Rc::new(FrameTicker::new(move |now_ms| {
            let keep_going = viewer.animation_tick(now_ms);
            scheduler.render_now();
            keep_going
        }))
    };

    // State changes coalesce into render requests.
    {
        let scheduler = scheduler.clone();
        let viewer_fx = viewer.clone();
        Effect::new(move || {
            viewer_fx.viewport.track();
            viewer_fx.store_rev.track();
            viewer_fx.canvas.track();
            viewer_fx.hovered.track();
            viewer_fx.selected.track();
            viewer_fx.layers.grid.track();
            viewer_fx.layers.outlines.track();
            viewer_fx.layers.labels.track();
            status.track();
            scheduler.request_render();
        });
    }

    // Surface resize: the visible memo's signature does not cover surface
    // dimensions, so drop it explicitly before repainting.
    {
        let scheduler = scheduler.clone();
        let viewer_fx = viewer.clone();
        Effect::new(move || {
            resize_nonce.track();
            viewer_fx.store.borrow().invalidate_visible();
            scheduler.request_render();
        });
    }

    // New animations start (or keep) the ticker running.
    {
        let ticker = ticker.clone();
        let viewer_fx = viewer.clone();
        Effect::new(move || {
            viewer_fx.animation_nonce.track();
            if !viewer_fx.animations.borrow().is_idle() {
                ticker.ensure_running();
            }
        });
    }

    // Escape recovery may have interrupted a drag; unstick the cursor.
    {
        let scheduler = scheduler.clone();
        Effect::new(move || {
            escape_nonce.track();
            if let Some(canvas) = canvas_ref.get_untracked() {
                let canvas: &web_sys::HtmlElement = &canvas;
                canvas.style().set_property("cursor", "grab").ok();
            }
            scheduler.request_render();
        });
    }

    // --- Input handlers ---

    let local_pos = move |client_x: f64, client_y: f64| -> (f64, f64) {
        canvas_ref
            .get_untracked()
            .map(|el| {
                let rect = el.get_bounding_client_rect();
                (client_x - rect.left(), client_y - rect.top())
            })
            .unwrap_or((client_x, client_y))
    };

    let on_wheel = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: WheelEvent| {
            e.prevent_default();
            let (sx, sy) = local_pos(e.client_x() as f64, e.client_y() as f64);
            let intents = controller.borrow_mut().wheel(sx, sy, e.delta_y());
            viewer.apply_intents(intents);
        }
    };

    let on_pointer_down = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let button = match e.button() {
                1 => PointerButton::Pan,
                2 => PointerButton::Secondary,
                _ => PointerButton::Primary,
            };
            if button == PointerButton::Pan {
                e.prevent_default();
            }
            let (sx, sy) = local_pos(e.client_x() as f64, e.client_y() as f64);
            let intents = controller.borrow_mut().pointer_down(sx, sy, button);
            viewer.apply_intents(intents);

            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
                if controller.borrow().is_panning() {
                    el.style().set_property("cursor", "grabbing").ok();
                }
            }
        }
    };

    let on_pointer_move = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let (sx, sy) = local_pos(e.client_x() as f64, e.client_y() as f64);
            let intents = controller
                .borrow_mut()
                .pointer_move(sx, sy, js_sys::Date::now());
            viewer.apply_intents(intents);
        }
    };

    let on_pointer_up = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let (sx, sy) = local_pos(e.client_x() as f64, e.client_y() as f64);
            let intents = controller.borrow_mut().pointer_up(sx, sy);
            viewer.apply_intents(intents);

            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.style().set_property("cursor", "grab").ok();
            }
        }
    };

    let on_pointer_leave = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let intents = controller.borrow_mut().pointer_leave();
            viewer.apply_intents(intents);
        }
    };

    let touch_points = move |e: &TouchEvent| -> Vec<(f64, f64)> {
        let list = e.touches();
        (0..list.length())
            .filter_map(|i| list.get(i))
            .map(|t| local_pos(t.client_x() as f64, t.client_y() as f64))
            .collect()
    };

    let on_touch_start = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let points = touch_points(&e);
            let intents = controller
                .borrow_mut()
                .touch_start(&points, js_sys::Date::now());
            viewer.apply_intents(intents);
        }
    };

    let on_touch_move = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let points = touch_points(&e);
            let intents = controller
                .borrow_mut()
                .touch_move(&points, js_sys::Date::now());
            viewer.apply_intents(intents);
        }
    };

    let on_touch_end = {
        let viewer = viewer.clone();
        let controller = controller.clone();
        move |e: TouchEvent| {
            // e.touches() already excludes the lifted fingers.
            let remaining = touch_points(&e);
            let intents = controller
                .borrow_mut()
                .touch_end(&remaining, js_sys::Date::now());
            viewer.apply_intents(intents);
        }
    };

    view! {
        <div
            style="position: relative; width: 100%; height: 100%; overflow: hidden;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointerleave=on_pointer_leave
            on:touchstart=on_touch_start
            on:touchmove=on_touch_move
            on:touchend=on_touch_end
        >
            <canvas
                node_ref=canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; image-rendering: pixelated; cursor: grab;"
            />
        </div>
    }
}

// --- Layer pipeline ---

/// Fixed draw order: background, bounds border, grid, empty placeholders,
/// tile content, outlines, creator labels, HUD. Missing canvas metadata
/// short-circuits to a loading placeholder.
fn draw_frame(
    ctx: &CanvasRenderingContext2d,
    w: f64,
    h: f64,
    viewer: &Viewer,
    status: ConnectionStatus,
    bitmaps: &mut TileBitmapCache,
) -> Result<(), JsValue> {
    ctx.set_fill_style_str(BACKGROUND_CSS);
    ctx.fill_rect(0.0, 0.0, w, h);

    let Some(info) = viewer.canvas.get_untracked() else {
        paint_loading_placeholder(ctx, w, h)?;
        return Ok(());
    };
    let vp = viewer.viewport.get_untracked();
    let store = viewer.store.borrow();
    let animations = viewer.animations.borrow();
    let cell_px = info.tile_size * vp.zoom;

    paint_bounds_border(ctx, &vp, &info);

    if viewer.layers.grid.get_untracked() && cell_px >= GRID_MIN_CELL_PX {
        paint_grid(ctx, &vp, &info, w, h);
    }

    if cell_px >= EMPTY_CELL_MIN_PX {
        paint_empty_cells(ctx, &vp, &info, |x, y| store.contains(x, y), w, h);
    }

    let visible = store.query_visible(&vp, w, h, info.tile_size, MAX_VISIBLE_TILES);
    ctx.set_image_smoothing_enabled(false);
    for tile in visible.iter() {
        paint_tile(ctx, &vp, &info, &animations, bitmaps, tile);
    }

    if viewer.layers.outlines.get_untracked() {
        ctx.set_stroke_style_str(OUTLINE_CSS);
        ctx.set_line_width(1.0);
        for tile in visible.iter() {
            let (px, py) = vp.world_to_screen(
                tile.x as f64 * info.tile_size,
                tile.y as f64 * info.tile_size,
            );
            ctx.stroke_rect(px, py, cell_px, cell_px);
        }
    }

    paint_highlights(
        ctx,
        &vp,
        &info,
        viewer.hovered.get_untracked().as_ref(),
        viewer.selected.get_untracked().as_ref(),
    );

    if viewer.layers.labels.get_untracked() && cell_px >= LABEL_MIN_CELL_PX {
        paint_labels(ctx, &vp, &info, &visible)?;
    }

    paint_hud(
        ctx,
        &vp,
        store.len(),
        status,
        viewer.hovered.get_untracked().as_ref(),
    )?;
    Ok(())
}

fn paint_loading_placeholder(
    ctx: &CanvasRenderingContext2d,
    w: f64,
    h: f64,
) -> Result<(), JsValue> {
    ctx.set_fill_style_str("rgba(255,255,255,0.55)");
    ctx.set_font(HUD_FONT);
    ctx.set_text_align("center");
    ctx.fill_text("Loading canvas…", w / 2.0, h / 2.0)?;
    ctx.set_text_align("left");
    Ok(())
}

/// Last-resort frame drawn when the pipeline raised; the next request
/// repaints normally (draw errors are non-sticky).
fn paint_error_placeholder(ctx: &CanvasRenderingContext2d, w: f64, h: f64) {
    ctx.set_fill_style_str(BACKGROUND_CSS);
    ctx.fill_rect(0.0, 0.0, w, h);
    ctx.set_fill_style_str("rgba(229,57,53,0.12)");
    ctx.fill_rect(0.0, 0.0, w, h);
    ctx.set_fill_style_str("rgba(255,255,255,0.75)");
    ctx.set_font(HUD_FONT);
    ctx.set_text_align("center");
    ctx.fill_text("Render failed, recovering on next frame", w / 2.0, h / 2.0)
        .ok();
    ctx.set_text_align("left");
}

fn paint_bounds_border(ctx: &CanvasRenderingContext2d, vp: &Viewport, info: &CanvasInfo) {
    let (x0, y0) = vp.world_to_screen(0.0, 0.0);
    let (x1, y1) = vp.world_to_screen(info.width, info.height);
    ctx.set_stroke_style_str(BOUNDS_BORDER_CSS);
    ctx.set_line_width(1.5);
    ctx.stroke_rect(x0, y0, x1 - x0, y1 - y0);
}

fn paint_grid(ctx: &CanvasRenderingContext2d, vp: &Viewport, info: &CanvasInfo, w: f64, h: f64) {
    let (gx0, gy0, gx1, gy1) = canvas_cell_range(vp, info, w, h);
    if gx1 < gx0 || gy1 < gy0 {
        return;
    }
    ctx.set_stroke_style_str(GRID_LINE_CSS);
    ctx.set_line_width(1.0);
    ctx.begin_path();
    for gx in gx0..=(gx1 + 1) {
        let wx = gx as f64 * info.tile_size;
        let (sx, sy0) = vp.world_to_screen(wx, gy0 as f64 * info.tile_size);
        let (_, sy1) = vp.world_to_screen(wx, (gy1 + 1) as f64 * info.tile_size);
        ctx.move_to(sx, sy0);
        ctx.line_to(sx, sy1);
    }
    for gy in gy0..=(gy1 + 1) {
        let wy = gy as f64 * info.tile_size;
        let (sx0, sy) = vp.world_to_screen(gx0 as f64 * info.tile_size, wy);
        let (sx1, _) = vp.world_to_screen((gx1 + 1) as f64 * info.tile_size, wy);
        ctx.move_to(sx0, sy);
        ctx.line_to(sx1, sy);
    }
    ctx.stroke();
}

fn paint_empty_cells(
    ctx: &CanvasRenderingContext2d,
    vp: &Viewport,
    info: &CanvasInfo,
    occupied: impl Fn(i32, i32) -> bool,
    w: f64,
    h: f64,
) {
    let (gx0, gy0, gx1, gy1) = canvas_cell_range(vp, info, w, h);
    let cell = info.tile_size * vp.zoom;
    ctx.set_fill_style_str(EMPTY_CELL_CSS);
    for gy in gy0..=gy1 {
        for gx in gx0..=gx1 {
            if occupied(gx, gy) {
                continue;
            }
            let (px, py) = vp.world_to_screen(gx as f64 * info.tile_size, gy as f64 * info.tile_size);
            ctx.fill_rect(px + 1.0, py + 1.0, cell - 2.0, cell - 2.0);
        }
    }
}

fn paint_tile(
    ctx: &CanvasRenderingContext2d,
    vp: &Viewport,
    info: &CanvasInfo,
    animations: &AnimationQueue,
    bitmaps: &mut TileBitmapCache,
    tile: &TileRecord,
) {
    let cell = info.tile_size * vp.zoom;
    let (px, py) = vp.world_to_screen(tile.x as f64 * info.tile_size, tile.y as f64 * info.tile_size);

    let mut alpha = 1.0;
    let mut scale = 1.0;
    let mut flash = 0.0;
    if let Some(anim) = animations.active_for(tile.x, tile.y) {
        match anim.kind {
            AnimationKind::Create => {
                alpha = anim.eased();
                scale = 0.6 + 0.4 * anim.eased();
            }
            AnimationKind::Remove => {
                alpha = 1.0 - anim.progress();
                scale = 1.0 - 0.2 * anim.progress();
            }
            AnimationKind::Update => {
                flash = (1.0 - anim.eased()) * 0.6;
            }
        }
    }

    let dw = cell * scale;
    let dx = px + (cell - dw) / 2.0;
    let dy = py + (cell - dw) / 2.0;

    ctx.set_global_alpha(alpha);
    match tile_bitmap(bitmaps, tile) {
        Ok(bitmap) => {
            ctx.draw_image_with_html_canvas_element_and_dw_and_dh(&bitmap, dx, dy, dw, dw)
                .ok();
        }
        Err(reason) => {
            // Undecodable artwork: a visible per-tile placeholder, and the
            // rest of the frame carries on.
            web_sys::console::warn_1(
                &format!("Tile ({}, {}): {reason}", tile.x, tile.y).into(),
            );
            ctx.set_fill_style_str("rgba(229,57,53,0.25)");
            ctx.fill_rect(dx, dy, dw, dw);
            ctx.set_stroke_style_str("rgba(229,57,53,0.7)");
            ctx.set_line_width(1.0);
            ctx.begin_path();
            ctx.move_to(dx, dy);
            ctx.line_to(dx + dw, dy + dw);
            ctx.move_to(dx + dw, dy);
            ctx.line_to(dx, dy + dw);
            ctx.stroke();
        }
    }
    if flash > 0.0 {
        ctx.set_fill_style_str(&rgba_css(255, 255, 255, flash));
        ctx.fill_rect(dx, dy, dw, dw);
    }
    ctx.set_global_alpha(1.0);
}

fn paint_highlights(
    ctx: &CanvasRenderingContext2d,
    vp: &Viewport,
    info: &CanvasInfo,
    hovered: Option<&TileHit>,
    selected: Option<&TileHit>,
) {
    let cell = info.tile_size * vp.zoom;
    let outline = |hit: &TileHit, css: &str, width: f64| {
        let (px, py) = vp.world_to_screen(hit.x as f64 * info.tile_size, hit.y as f64 * info.tile_size);
        ctx.set_stroke_style_str(css);
        ctx.set_line_width(width);
        ctx.stroke_rect(px, py, cell, cell);
    };
    if let Some(hit) = hovered {
        outline(hit, HOVER_OUTLINE_CSS, 1.0);
    }
    if let Some(hit) = selected {
        outline(hit, SELECTED_OUTLINE_CSS, 2.0);
    }
}

fn paint_labels(
    ctx: &CanvasRenderingContext2d,
    vp: &Viewport,
    info: &CanvasInfo,
    visible: &[TileRecord],
) -> Result<(), JsValue> {
    let cell = info.tile_size * vp.zoom;
    ctx.set_font(LABEL_FONT);
    ctx.set_text_align("center");
    ctx.set_line_width(3.0);
    ctx.set_stroke_style_str("rgba(10,12,18,0.85)");
    for tile in visible {
        let Some(creator) = tile.creator.as_deref() else {
            continue;
        };
        let label = truncate_label(creator);
        let base = creator_color(creator);
        let (r, g, b) = brighten(base.0, base.1, base.2, 1.15);
        let (px, py) = vp.world_to_screen(tile.x as f64 * info.tile_size, tile.y as f64 * info.tile_size);
        let tx = px + cell / 2.0;
        let ty = py + cell - 4.0;
        ctx.stroke_text(&label, tx, ty)?;
        ctx.set_fill_style_str(&rgb_css(r, g, b));
        ctx.fill_text(&label, tx, ty)?;
    }
    ctx.set_text_align("left");
    Ok(())
}

fn paint_hud(
    ctx: &CanvasRenderingContext2d,
    vp: &Viewport,
    tile_count: usize,
    status: ConnectionStatus,
    hovered: Option<&TileHit>,
) -> Result<(), JsValue> {
    let lines = [
        format!("zoom {:.0}%", vp.zoom * 100.0),
        format!("{tile_count} tiles"),
        format!("offset ({:.0}, {:.0})", vp.offset_x, vp.offset_y),
    ];
    let (status_label, status_css) = match status {
        ConnectionStatus::Connecting => ("connecting", "rgba(229,217,0,0.9)"),
        ConnectionStatus::Live => ("live", "rgba(2,190,1,0.9)"),
        ConnectionStatus::Reconnecting => ("reconnecting", "rgba(229,57,53,0.9)"),
    };
    let hover_line = hovered.map(|hit| match &hit.record {
        Some(record) => {
            let who = record.creator.as_deref().unwrap_or("anonymous");
            match record.created_at {
                Some(created) => {
                    let age = (chrono::Utc::now() - created).num_seconds().max(0);
                    format!("({}, {}) {who} {}", hit.x, hit.y, format_age(age))
                }
                None => format!("({}, {}) {who}", hit.x, hit.y),
            }
        }
        None => format!("({}, {}) empty", hit.x, hit.y),
    });

    let height = if hover_line.is_some() { 92.0 } else { 76.0 };
    ctx.set_fill_style_str("rgba(10,12,18,0.78)");
    ctx.fill_rect(12.0, 12.0, 188.0, height);
    ctx.set_font(HUD_FONT);
    ctx.set_fill_style_str("rgba(235,233,225,0.9)");
    for (i, line) in lines.iter().enumerate() {
        ctx.fill_text(line, 22.0, 30.0 + i as f64 * 16.0)?;
    }
    if let Some(line) = &hover_line {
        ctx.fill_text(line, 22.0, 94.0)?;
    }
    ctx.set_fill_style_str(status_css);
    ctx.fill_rect(22.0, 72.0, 6.0, 6.0);
    ctx.fill_text(status_label, 34.0, 78.0)?;
    Ok(())
}

/// Compact age for the HUD attribution line.
fn format_age(seconds: i64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3_600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h", seconds / 3_600)
    } else {
        format!("{}d", seconds / 86_400)
    }
}

/// Visible cell range clamped to the canvas bounds (inclusive).
fn canvas_cell_range(
    vp: &Viewport,
    info: &CanvasInfo,
    w: f64,
    h: f64,
) -> (i32, i32, i32, i32) {
    let (gx0, gy0, gx1, gy1) = visible_grid_rect(vp, w, h, info.tile_size);
    let max_x = (info.width / info.tile_size).ceil() as i32 - 1;
    let max_y = (info.height / info.tile_size).ceil() as i32 - 1;
    (
        gx0.max(0),
        gy0.max(0),
        gx1.min(max_x),
        gy1.min(max_y),
    )
}

fn truncate_label(name: &str) -> String {
    if name.chars().count() <= LABEL_MAX_CHARS {
        return name.to_string();
    }
    let head: String = name.chars().take(LABEL_MAX_CHARS - 1).collect();
    format!("{head}…")
}

/// Rasterize (or fetch) the offscreen bitmap for a tile's artwork.
fn tile_bitmap(
    cache: &mut TileBitmapCache,
    tile: &TileRecord,
) -> Result<HtmlCanvasElement, String> {
    let signature = pixels_signature(tile.pixels.as_str());
    if let Some((cached_sig, canvas)) = cache.get(&tile.key())
        && *cached_sig == signature
    {
        return Ok(canvas.clone());
    }

    let pixels = tile.pixels.decode()?;
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| "document unavailable".to_string())?;
    let canvas = document
        .create_element("canvas")
        .map_err(|_| "offscreen canvas creation failed".to_string())?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| "offscreen canvas creation failed".to_string())?;
    canvas.set_width(TILE_PIXELS as u32);
    canvas.set_height(TILE_PIXELS as u32);
    let ctx = canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
        .ok_or_else(|| "offscreen 2d context unavailable".to_string())?;

    for (i, &index) in pixels.iter().enumerate() {
        let (r, g, b) = palette_rgb(index);
        ctx.set_fill_style_str(&rgb_css(r, g, b));
        ctx.fill_rect(
            (i % TILE_PIXELS) as f64,
            (i / TILE_PIXELS) as f64,
            1.0,
            1.0,
        );
    }

    if cache.len() >= BITMAP_CACHE_MAX_ENTRIES {
        cache.clear();
    }
    cache.insert(tile.key(), (signature, canvas.clone()));
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixels_signature_differs_on_content_change() {
        let a = pixels_signature(&"0".repeat(256));
        let mut changed = "0".repeat(256);
        changed.replace_range(100..101, "f");
        assert_ne!(a, pixels_signature(&changed));
        assert_eq!(a, pixels_signature(&"0".repeat(256)));
    }

    #[test]
    fn age_formatting_picks_the_coarsest_unit() {
        assert_eq!(format_age(0), "0s");
        assert_eq!(format_age(59), "59s");
        assert_eq!(format_age(60), "1m");
        assert_eq!(format_age(3_599), "59m");
        assert_eq!(format_age(7_200), "2h");
        assert_eq!(format_age(200_000), "2d");
    }

    #[test]
    fn labels_truncate_long_names() {
        assert_eq!(truncate_label("ada"), "ada");
        let long = "averyverylongcreatorname";
        let cut = truncate_label(long);
        assert!(cut.chars().count() <= LABEL_MAX_CHARS);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn cell_range_clamps_to_canvas_bounds() {
        let vp = Viewport {
            offset_x: -64.0,
            offset_y: -64.0,
            zoom: 1.0,
        };
        let info = CanvasInfo {
            width: 128.0,
            height: 96.0,
            tile_size: 32.0,
            name: String::new(),
        };
        let (gx0, gy0, gx1, gy1) = canvas_cell_range(&vp, &info, 800.0, 600.0);
        assert_eq!((gx0, gy0), (0, 0));
        assert_eq!((gx1, gy1), (3, 2));
    }
}
