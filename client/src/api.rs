use wasm_bindgen_futures::spawn_local;

use fresco_shared::{CanvasInfo, TileRecord};

use crate::viewer::Viewer;

pub async fn fetch_canvas() -> Result<CanvasInfo, String> {
    let resp = gloo_net::http::Request::get("/api/canvas")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.ok() {
        return Err(format!("canvas fetch failed: HTTP {}", resp.status()));
    }
    resp.json().await.map_err(|e| e.to_string())
}

pub async fn fetch_tiles() -> Result<Vec<TileRecord>, String> {
    let resp = gloo_net::http::Request::get("/api/tiles")
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.ok() {
        return Err(format!("tile fetch failed: HTTP {}", resp.status()));
    }
    resp.json().await.map_err(|e| e.to_string())
}

/// First paint data: canvas metadata, then the current tile set. Either
/// fetch failing leaves the app usable; the live stream's snapshot will
/// fill the gap when it arrives.
pub fn load_initial(viewer: Viewer) {
    spawn_local(async move {
        match fetch_canvas().await {
            Ok(info) => viewer.set_canvas_data(info),
            Err(e) => {
                web_sys::console::warn_1(&format!("Canvas fetch failed: {e}").into());
            }
        }
        match fetch_tiles().await {
            Ok(tiles) => viewer.load_tiles(tiles),
            Err(e) => {
                web_sys::console::warn_1(&format!("Tile fetch failed: {e}").into());
            }
        }
    });
}
