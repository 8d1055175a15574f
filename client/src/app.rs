use std::cell::RefCell;
use std::rc::Rc;

use gloo_storage::Storage;
use leptos::prelude::*;
use wasm_bindgen::JsCast;

use crate::canvas::CanvasViewer;
use crate::interaction::InteractionController;
use crate::live::{self, ConnectionStatus};
use crate::viewer::Viewer;
use crate::{api, viewport::Viewport};

const SETTINGS_KEY: &str = "fresco:settings";

pub(crate) fn canvas_dimensions() -> (f64, f64) {
    let Some(window) = web_sys::window() else {
        return (1200.0, 800.0);
    };
    let w = window
        .inner_width()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(1200.0);
    let h = window
        .inner_height()
        .ok()
        .and_then(|v| v.as_f64())
        .unwrap_or(800.0);
    (w, h)
}

/// The interaction state machine, shared between the canvas event glue and
/// the global Escape recovery handler.
#[derive(Clone)]
pub(crate) struct ControllerHandle(pub Rc<RefCell<InteractionController>>);

struct KeydownBinding {
    window: web_sys::Window,
    _handler: wasm_bindgen::closure::Closure<dyn Fn(web_sys::KeyboardEvent)>,
}

struct ResizeBinding {
    window: web_sys::Window,
    _handler: wasm_bindgen::closure::Closure<dyn Fn()>,
}

thread_local! {
    static KEYDOWN_BINDING: RefCell<Option<KeydownBinding>> = const { RefCell::new(None) };
    static RESIZE_BINDING: RefCell<Option<ResizeBinding>> = const { RefCell::new(None) };
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct Settings {
    show_grid: bool,
    show_outlines: bool,
    show_labels: bool,
    offset_x: f64,
    offset_y: f64,
    zoom: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_grid: true,
            show_outlines: true,
            show_labels: false,
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0,
        }
    }
}

fn load_settings() -> Settings {
    gloo_storage::LocalStorage::get(SETTINGS_KEY).unwrap_or_default()
}

fn save_settings(settings: &Settings) {
    let _ = gloo_storage::LocalStorage::set(SETTINGS_KEY, settings);
}

fn install_keydown(viewer: Viewer, controller: ControllerHandle, escape_nonce: RwSignal<u64>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let handler = wasm_bindgen::closure::Closure::<dyn Fn(web_sys::KeyboardEvent)>::new(
        move |e: web_sys::KeyboardEvent| {
            if e.ctrl_key() || e.meta_key() || e.alt_key() {
                return;
            }
            match e.key().as_str() {
                "Escape" => {
                    // Recovery for releases missed outside the surface:
                    // everything back to idle, whatever state was stuck.
                    let intents = controller.0.borrow_mut().escape();
                    viewer.apply_intents(intents);
                    escape_nonce.update(|n| *n = n.wrapping_add(1));
                }
                "+" | "=" => viewer.zoom_in(),
                "-" | "_" => viewer.zoom_out(),
                "0" => viewer.reset_zoom(),
                "c" => viewer.center_view(),
                "g" => viewer.toggle_grid(),
                "o" => viewer.toggle_outlines(),
                "l" => viewer.toggle_labels(),
                _ => {}
            }
        },
    );
    if window
        .add_event_listener_with_callback("keydown", handler.as_ref().unchecked_ref())
        .is_ok()
    {
        KEYDOWN_BINDING.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(old) = slot.take() {
                old.window
                    .remove_event_listener_with_callback(
                        "keydown",
                        old._handler.as_ref().unchecked_ref(),
                    )
                    .ok();
            }
            *slot = Some(KeydownBinding {
                window,
                _handler: handler,
            });
        });
    }
}

fn install_resize(resize_nonce: RwSignal<u64>) {
    let Some(window) = web_sys::window() else {
        return;
    };
    let handler = wasm_bindgen::closure::Closure::<dyn Fn()>::new(move || {
        resize_nonce.update(|n| *n = n.wrapping_add(1));
    });
    if window
        .add_event_listener_with_callback("resize", handler.as_ref().unchecked_ref())
        .is_ok()
    {
        RESIZE_BINDING.with(|slot| {
            let mut slot = slot.borrow_mut();
            if let Some(old) = slot.take() {
                old.window
                    .remove_event_listener_with_callback(
                        "resize",
                        old._handler.as_ref().unchecked_ref(),
                    )
                    .ok();
            }
            *slot = Some(ResizeBinding {
                window,
                _handler: handler,
            });
        });
    }
}

#[component]
pub fn App() -> impl IntoView {
    let saved = load_settings();
    let viewer = Viewer::new(saved.show_grid, saved.show_outlines, saved.show_labels);
    viewer.viewport.set(Viewport {
        offset_x: saved.offset_x,
        offset_y: saved.offset_y,
        zoom: saved.zoom.clamp(crate::viewport::MIN_ZOOM, crate::viewport::MAX_ZOOM),
    });

    let status: RwSignal<ConnectionStatus> = RwSignal::new(ConnectionStatus::Connecting);
    let resize_nonce = RwSignal::new(0u64);
    let escape_nonce = RwSignal::new(0u64);
    let controller = ControllerHandle(Rc::new(RefCell::new(InteractionController::new())));

    // The viewport callback is the persistence hook: every real viewport
    // change (never a clamped no-op) lands in local storage, so a reload
    // comes back where the user left off.
    {
        let layers = viewer.layers;
        *viewer.callbacks.on_viewport_change.borrow_mut() =
            Some(Box::new(move |offset_x, offset_y, zoom| {
                save_settings(&Settings {
                    show_grid: layers.grid.get_untracked(),
                    show_outlines: layers.outlines.get_untracked(),
                    show_labels: layers.labels.get_untracked(),
                    offset_x,
                    offset_y,
                    zoom,
                });
            }));
    }

    // Layer toggles persist alongside the viewport.
    {
        let viewer_fx = viewer.clone();
        Effect::new(move || {
            let settings = Settings {
                show_grid: viewer_fx.layers.grid.get(),
                show_outlines: viewer_fx.layers.outlines.get(),
                show_labels: viewer_fx.layers.labels.get(),
                offset_x: viewer_fx.viewport.with_untracked(|vp| vp.offset_x),
                offset_y: viewer_fx.viewport.with_untracked(|vp| vp.offset_y),
                zoom: viewer_fx.viewport.with_untracked(|vp| vp.zoom),
            };
            save_settings(&settings);
        });
    }

    install_keydown(viewer.clone(), controller.clone(), escape_nonce);
    install_resize(resize_nonce);

    api::load_initial(viewer.clone());
    live::connect(viewer.clone(), status);

    view! {
        <div style="position: fixed; inset: 0; background: #11141c;">
            <CanvasViewer
                viewer=viewer
                controller=controller
                status=status
                resize_nonce=resize_nonce
                escape_nonce=escape_nonce
            />
        </div>
    }
}
