use std::cell::{Cell, RefCell};

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{EventSource, MessageEvent};

use fresco_shared::CanvasEvent;

use crate::api;
use crate::viewer::Viewer;

const RESYNC_RETRY_BASE_MS: f64 = 500.0;
const RESYNC_RETRY_MAX_MS: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Live,
    Reconnecting,
}

struct LiveConnection {
    es: EventSource,
    on_open: Closure<dyn Fn()>,
    on_error: Closure<dyn Fn()>,
    snapshot_handler: Closure<dyn Fn(MessageEvent)>,
    update_handler: Closure<dyn Fn(MessageEvent)>,
}

impl LiveConnection {
    fn close(self) {
        let _ = self.on_open.as_ref();
        let _ = self.on_error.as_ref();
        self.es.set_onopen(None);
        self.es.set_onerror(None);
        self.es
            .remove_event_listener_with_callback(
                "snapshot",
                self.snapshot_handler.as_ref().unchecked_ref(),
            )
            .ok();
        self.es
            .remove_event_listener_with_callback(
                "update",
                self.update_handler.as_ref().unchecked_ref(),
            )
            .ok();
        self.es.close();
    }
}

#[derive(Debug, Clone, Copy)]
struct ResyncState {
    consecutive_failures: u32,
    in_flight: bool,
}

impl ResyncState {
    const fn new() -> Self {
        Self {
            consecutive_failures: 0,
            in_flight: false,
        }
    }
}

thread_local! {
    static LIVE_CONNECTION: RefCell<Option<LiveConnection>> = const { RefCell::new(None) };
    static LAST_SEQ: Cell<Option<u64>> = const { Cell::new(None) };
    static RESYNC: Cell<ResyncState> = const { Cell::new(ResyncState::new()) };
}

pub fn disconnect() {
    LIVE_CONNECTION.with(|slot| {
        if let Some(connection) = slot.borrow_mut().take() {
            connection.close();
        }
    });
    LAST_SEQ.set(None);
    RESYNC.set(ResyncState::new());
}

/// A missed sequence number means dropped updates; the store can only be
/// trusted again after a full refetch.
fn has_seq_gap(last_seq: Option<u64>, incoming: u64) -> bool {
    matches!(last_seq, Some(last) if incoming > last + 1)
}

fn resync_backoff_ms(consecutive_failures: u32) -> f64 {
    let exponent = consecutive_failures.min(6);
    let factor = 1u32 << exponent;
    (RESYNC_RETRY_BASE_MS * factor as f64).min(RESYNC_RETRY_MAX_MS)
}

/// Refetch the full tile set after a delay that backs off with consecutive
/// failures. At most one resync is in flight at a time.
fn schedule_resync(viewer: Viewer) {
    let state = RESYNC.get();
    if state.in_flight {
        return;
    }
    RESYNC.set(ResyncState {
        in_flight: true,
        ..state
    });

    let delay_ms = resync_backoff_ms(state.consecutive_failures) as u32;
    Timeout::new(delay_ms, move || {
        spawn_local(async move {
            match api::fetch_tiles().await {
                Ok(tiles) => {
                    viewer.load_tiles(tiles);
                    LAST_SEQ.set(None);
                    RESYNC.set(ResyncState::new());
                }
                Err(e) => {
                    let failures = RESYNC.get().consecutive_failures.saturating_add(1);
                    RESYNC.set(ResyncState {
                        consecutive_failures: failures,
                        in_flight: false,
                    });
                    web_sys::console::warn_1(
                        &format!("Tile resync failed (attempt {failures}): {e}").into(),
                    );
                    schedule_resync(viewer);
                }
            }
        });
    })
    .forget();
}

/// Connect to the live event stream and forward tile notifications into the
/// coordinator. Snapshots replace the store; updates mutate it with
/// animations attached.
pub fn connect(viewer: Viewer, status: RwSignal<ConnectionStatus>) {
    status.set(ConnectionStatus::Connecting);

    let es = match EventSource::new("/api/events") {
        Ok(es) => es,
        Err(_) => {
            status.set(ConnectionStatus::Reconnecting);
            return;
        }
    };

    let on_open = Closure::<dyn Fn()>::new(move || {
        status.set(ConnectionStatus::Live);
    });
    es.set_onopen(Some(on_open.as_ref().unchecked_ref()));

    let viewer_snapshot = viewer.clone();
    let snapshot_handler = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
        let Some(data) = e.data().as_string() else {
            return;
        };
        let Ok(CanvasEvent::Snapshot { seq, canvas, tiles }) =
            serde_json::from_str::<CanvasEvent>(&data)
        else {
            return;
        };
        viewer_snapshot.set_canvas_data(canvas);
        viewer_snapshot.load_tiles(tiles);
        LAST_SEQ.set((seq > 0).then_some(seq));
        RESYNC.set(ResyncState::new());
    });
    es.add_event_listener_with_callback("snapshot", snapshot_handler.as_ref().unchecked_ref())
        .ok();

    let viewer_update = viewer.clone();
    let update_handler = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
        let Some(data) = e.data().as_string() else {
            return;
        };
        let Ok(event) = serde_json::from_str::<CanvasEvent>(&data) else {
            return;
        };

        let seq = event.seq();
        let last = LAST_SEQ.get();
        if seq > 0 {
            if let Some(last) = last
                && seq <= last
            {
                // Replayed or reordered event; already applied.
                return;
            }
            if has_seq_gap(last, seq) {
                web_sys::console::warn_1(
                    &format!(
                        "Event stream gap (last_seq={}, incoming_seq={seq}); resyncing",
                        last.unwrap_or(0)
                    )
                    .into(),
                );
                LAST_SEQ.set(Some(seq));
                schedule_resync(viewer_update.clone());
                return;
            }
            LAST_SEQ.set(Some(seq));
        }

        match event {
            CanvasEvent::Created { tile, .. } | CanvasEvent::Updated { tile, .. } => {
                viewer_update.add_tile(tile, true);
            }
            CanvasEvent::Removed { x, y, .. } => {
                viewer_update.remove_tile(x, y, true);
            }
            CanvasEvent::Snapshot { .. } => {}
        }
    });
    es.add_event_listener_with_callback("update", update_handler.as_ref().unchecked_ref())
        .ok();

    let viewer_error = viewer;
    let on_error = Closure::<dyn Fn()>::new(move || {
        status.set(ConnectionStatus::Reconnecting);
        // EventSource reconnects on its own; refetch covers whatever the
        // stream dropped meanwhile.
        schedule_resync(viewer_error.clone());
    });
    es.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    // Replace any existing connection, unregistering its handlers cleanly.
    LIVE_CONNECTION.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(old) = slot.take() {
            old.close();
        }
        *slot = Some(LiveConnection {
            es,
            on_open,
            on_error,
            snapshot_handler,
            update_handler,
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sequence_gap() {
        assert!(!has_seq_gap(Some(10), 11));
        assert!(has_seq_gap(Some(10), 12));
        assert!(!has_seq_gap(Some(10), 10));
        assert!(!has_seq_gap(None, 7));
    }

    #[test]
    fn backoff_grows_and_saturates() {
        assert_eq!(resync_backoff_ms(0), 500.0);
        assert_eq!(resync_backoff_ms(1), 1000.0);
        assert_eq!(resync_backoff_ms(3), 4000.0);
        assert_eq!(resync_backoff_ms(10), RESYNC_RETRY_MAX_MS);
    }
}
