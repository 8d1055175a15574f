use std::cell::{Cell, RefCell};
use std::rc::Rc;

use wasm_bindgen::prelude::*;

/// Minimum interval between coalesced draws.
pub const MIN_FRAME_INTERVAL_MS: f64 = 16.0;

/// Admits at most one draw per interval. A rejected tick is a plain no-op:
/// it does not reschedule itself, the next request re-arms the loop.
#[derive(Debug)]
pub struct FrameGate {
    last_draw_ms: f64,
    min_interval_ms: f64,
}

impl FrameGate {
    pub fn new(min_interval_ms: f64) -> Self {
        Self {
            last_draw_ms: f64::NEG_INFINITY,
            min_interval_ms,
        }
    }

    /// True when enough time has passed; records the draw time on success.
    pub fn try_admit(&mut self, now_ms: f64) -> bool {
        if now_ms - self.last_draw_ms >= self.min_interval_ms {
            self.last_draw_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// Record a draw that bypassed the gate (the uncoalesced path).
    pub fn force(&mut self, now_ms: f64) {
        self.last_draw_ms = now_ms;
    }
}

/// Batches render requests via `requestAnimationFrame`.
///
/// `request_render()` coalesces: any number of requests collapse into at
/// most one pending rAF, and the frame only draws if the [`FrameGate`]
/// admits it. `render_now()` bypasses both the coalescing and the gate;
/// it exists for the animation ticker, whose smoothness must not depend
/// on the coalescing window.
pub struct RenderScheduler {
    inner: Rc<Inner>,
}

struct Inner {
    window: Option<web_sys::Window>,
    render: Box<dyn Fn()>,
    pending: Cell<bool>,
    scheduled: Cell<bool>,
    raf_id: Cell<Option<i32>>,
    gate: RefCell<FrameGate>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl Inner {
    fn schedule(&self) {
        if self.scheduled.get() {
            return;
        }
        self.scheduled.set(true);
        let cb_ref = self.callback.borrow();
        let Some(cb) = cb_ref.as_ref() else {
            self.scheduled.set(false);
            return;
        };
        let Some(window) = self.window.as_ref() else {
            self.scheduled.set(false);
            return;
        };
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.scheduled.set(false),
        }
    }
}

impl RenderScheduler {
    pub fn new(render_fn: impl Fn() + 'static) -> Self {
        let inner = Rc::new(Inner {
            window: web_sys::window(),
            render: Box::new(render_fn),
            pending: Cell::new(false),
            scheduled: Cell::new(false),
            raf_id: Cell::new(None),
            gate: RefCell::new(FrameGate::new(MIN_FRAME_INTERVAL_MS)),
            callback: RefCell::new(None),
        });

        let inner_cb = inner.clone();
        let cb = Closure::<dyn FnMut()>::new(move || {
            inner_cb.scheduled.set(false);
            inner_cb.raf_id.set(None);
            if !inner_cb.pending.get() {
                return;
            }
            let now = js_sys::Date::now();
            if inner_cb.gate.borrow_mut().try_admit(now) {
                inner_cb.pending.set(false);
                (inner_cb.render)();
            }
            // Gated: the request stays pending but this tick does not
            // reschedule; the next request_render re-arms.
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    /// Ask for a draw on the next eligible frame. Cheap and idempotent.
    pub fn request_render(&self) {
        self.inner.pending.set(true);
        self.inner.schedule();
    }

    /// Draw immediately, outside the coalescing window. Used by the
    /// animation ticker only.
    pub fn render_now(&self) {
        self.inner.pending.set(false);
        self.inner.gate.borrow_mut().force(js_sys::Date::now());
        (self.inner.render)();
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        self.inner.scheduled.set(false);
        self.inner.pending.set(false);
        // Break the callback->inner reference cycle on teardown.
        self.inner.callback.borrow_mut().take();
    }
}

/// A continuous rAF loop: `tick(now_ms)` runs every frame for as long as it
/// returns `true`. Drives the animation clock, which calls
/// [`RenderScheduler::render_now`] itself and must keep ticking even when
/// no interaction requests arrive.
pub struct FrameTicker {
    inner: Rc<TickerInner>,
}

struct TickerInner {
    window: Option<web_sys::Window>,
    running: Cell<bool>,
    raf_id: Cell<Option<i32>>,
    callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

impl TickerInner {
    fn schedule(&self) {
        let cb_ref = self.callback.borrow();
        let Some(cb) = cb_ref.as_ref() else {
            self.running.set(false);
            return;
        };
        let Some(window) = self.window.as_ref() else {
            self.running.set(false);
            return;
        };
        match window.request_animation_frame(cb.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => self.running.set(false),
        }
    }
}

impl FrameTicker {
    pub fn new(tick: impl Fn(f64) -> bool + 'static) -> Self {
        let inner = Rc::new(TickerInner {
            window: web_sys::window(),
            running: Cell::new(false),
            raf_id: Cell::new(None),
            callback: RefCell::new(None),
        });

        let inner_cb = inner.clone();
        let cb = Closure::<dyn FnMut()>::new(move || {
            inner_cb.raf_id.set(None);
            if !inner_cb.running.get() {
                return;
            }
            if tick(js_sys::Date::now()) {
                inner_cb.schedule();
            } else {
                inner_cb.running.set(false);
            }
        });
        *inner.callback.borrow_mut() = Some(cb);

        Self { inner }
    }

    /// Start the loop if it is not already running.
    pub fn ensure_running(&self) {
        if self.inner.running.get() {
            return;
        }
        self.inner.running.set(true);
        self.inner.schedule();
    }
}

impl Drop for FrameTicker {
    fn drop(&mut self) {
        self.inner.running.set(false);
        if let Some(raf_id) = self.inner.raf_id.replace(None)
            && let Some(window) = self.inner.window.as_ref()
        {
            let _ = window.cancel_animation_frame(raf_id);
        }
        self.inner.callback.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_first_draw_immediately() {
        let mut gate = FrameGate::new(16.0);
        assert!(gate.try_admit(0.0));
    }

    #[test]
    fn gate_rejects_within_interval_without_rescheduling_state() {
        let mut gate = FrameGate::new(16.0);
        assert!(gate.try_admit(1000.0));
        assert!(!gate.try_admit(1010.0));
        // The rejection did not count as a draw.
        assert!(gate.try_admit(1016.0));
    }

    #[test]
    fn forced_draws_reset_the_window() {
        let mut gate = FrameGate::new(16.0);
        assert!(gate.try_admit(1000.0));
        gate.force(1020.0);
        assert!(!gate.try_admit(1030.0));
        assert!(gate.try_admit(1036.0));
    }

    #[test]
    fn burst_collapses_to_one_admission_per_window() {
        let mut gate = FrameGate::new(16.0);
        let admitted = (0..100)
            .filter(|i| gate.try_admit(1000.0 + *i as f64))
            .count();
        // 100ms of every-ms ticks at a 16ms gate.
        assert_eq!(admitted, 7);
    }
}
