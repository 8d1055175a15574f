//! Pointer/touch/wheel classification. Raw input events come in, typed
//! intents come out; the coordinator is the only consumer. Nothing in here
//! touches the DOM, so the whole machine is host-testable.

/// Cumulative displacement at release below which a press counts as a click.
pub const CLICK_DRAG_THRESHOLD_PX: f64 = 15.0;
/// Minimum interval between hover intents while the pointer is idle.
pub const HOVER_DEBOUNCE_MS: f64 = 100.0;
/// A touch held longer than this is never a tap.
pub const TAP_MAX_DURATION_MS: f64 = 200.0;
/// Maximum finger travel for a touch to stay tap-eligible.
const TAP_SLOP_PX: f64 = 10.0;
/// Second tap within this window and radius of the first is a double-tap.
pub const DOUBLE_TAP_WINDOW_MS: f64 = 300.0;
pub const DOUBLE_TAP_RADIUS_PX: f64 = 30.0;
/// Wheel zoom per notch: 1.1 in, its inverse-of-intent 0.9 out.
pub const WHEEL_ZOOM_IN: f64 = 1.1;
pub const WHEEL_ZOOM_OUT: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left mouse button; candidate for a click.
    Primary,
    /// The designated pan input (middle button).
    Pan,
    /// Right button; left to the browser (context menu).
    Secondary,
}

/// A classified user intent, in surface coordinates. Click/hover tile
/// resolution happens in the coordinator, through the viewport.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Pan { dx: f64, dy: f64 },
    Zoom { sx: f64, sy: f64, factor: f64 },
    Click { sx: f64, sy: f64 },
    Hover { sx: f64, sy: f64 },
    HoverCleared,
    DoubleTap { sx: f64, sy: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TouchPress {
    started_ms: f64,
    origin: (f64, f64),
    /// Greatest displacement from the origin seen so far; once past
    /// TAP_SLOP_PX the touch can no longer end in a tap.
    travel: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GestureState {
    Idle,
    /// Primary button is down; pan-vs-click is decided at release.
    PressedUndetermined { origin: (f64, f64), last: (f64, f64) },
    /// Pan input (middle button or sole finger) is down.
    Panning {
        last: (f64, f64),
        /// Present when a touch drives the pan; carries tap bookkeeping.
        touch: Option<TouchPress>,
    },
    Pinching { dist: f64, center: (f64, f64) },
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

fn midpoint(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// Per-surface interaction state machine. One instance per rendering
/// surface; `escape()` is the recovery path for releases that happened
/// outside it.
pub struct InteractionController {
    state: GestureState,
    hover_active: bool,
    last_hover_ms: f64,
    last_tap: Option<(f64, (f64, f64))>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            state: GestureState::Idle,
            hover_active: false,
            last_hover_ms: f64::NEG_INFINITY,
            last_tap: None,
        }
    }

    /// Whether the viewport is being dragged (drives the grab cursor).
    pub fn is_panning(&self) -> bool {
        matches!(self.state, GestureState::Panning { .. })
    }

    fn clear_hover(&mut self, intents: &mut Vec<Intent>) {
        if self.hover_active {
            self.hover_active = false;
            intents.push(Intent::HoverCleared);
        }
    }

    pub fn pointer_down(&mut self, sx: f64, sy: f64, button: PointerButton) -> Vec<Intent> {
        let mut intents = Vec::new();
        self.clear_hover(&mut intents);
        match button {
            PointerButton::Pan => {
                self.state = GestureState::Panning {
                    last: (sx, sy),
                    touch: None,
                };
            }
            PointerButton::Primary => {
                self.state = GestureState::PressedUndetermined {
                    origin: (sx, sy),
                    last: (sx, sy),
                };
            }
            PointerButton::Secondary => {}
        }
        intents
    }

    pub fn pointer_move(&mut self, sx: f64, sy: f64, now_ms: f64) -> Vec<Intent> {
        match &mut self.state {
            GestureState::Panning { last, touch } => {
                let dx = sx - last.0;
                let dy = sy - last.1;
                *last = (sx, sy);
                if let Some(press) = touch {
                    press.travel = press.travel.max(dist((sx, sy), press.origin));
                }
                vec![Intent::Pan { dx, dy }]
            }
            GestureState::PressedUndetermined { last, .. } => {
                // No viewport movement and no commitment yet; the press
                // stays click-eligible until release settles it.
                *last = (sx, sy);
                Vec::new()
            }
            GestureState::Pinching { .. } => Vec::new(),
            GestureState::Idle => {
                if now_ms - self.last_hover_ms >= HOVER_DEBOUNCE_MS {
                    self.last_hover_ms = now_ms;
                    self.hover_active = true;
                    vec![Intent::Hover { sx, sy }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    pub fn pointer_up(&mut self, sx: f64, sy: f64) -> Vec<Intent> {
        let prior = self.state;
        self.state = GestureState::Idle;
        match prior {
            GestureState::PressedUndetermined { origin, .. } => {
                if dist((sx, sy), origin) < CLICK_DRAG_THRESHOLD_PX {
                    vec![Intent::Click { sx, sy }]
                } else {
                    // Moved too far: an aborted drag, not a click.
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// Pointer left the surface: abandon any active press and clear hover.
    pub fn pointer_leave(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        self.state = GestureState::Idle;
        self.clear_hover(&mut intents);
        intents
    }

    /// Wheel always zooms toward the pointer, never clicks.
    pub fn wheel(&mut self, sx: f64, sy: f64, delta_y: f64) -> Vec<Intent> {
        if delta_y == 0.0 {
            return Vec::new();
        }
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_IN
        } else {
            WHEEL_ZOOM_OUT
        };
        vec![Intent::Zoom { sx, sy, factor }]
    }

    pub fn touch_start(&mut self, touches: &[(f64, f64)], now_ms: f64) -> Vec<Intent> {
        let mut intents = Vec::new();
        self.clear_hover(&mut intents);
        match touches {
            [] => {}
            [only] => {
                self.state = GestureState::Panning {
                    last: *only,
                    touch: Some(TouchPress {
                        started_ms: now_ms,
                        origin: *only,
                        travel: 0.0,
                    }),
                };
            }
            [a, b, ..] => {
                // A second finger promotes any single-finger state.
                self.state = GestureState::Pinching {
                    dist: dist(*a, *b),
                    center: midpoint(*a, *b),
                };
            }
        }
        intents
    }

    pub fn touch_move(&mut self, touches: &[(f64, f64)], _now_ms: f64) -> Vec<Intent> {
        match (&mut self.state, touches) {
            (GestureState::Pinching { dist: d, center }, [a, b, ..]) => {
                let new_dist = dist(*a, *b);
                let old_dist = *d;
                *d = new_dist;
                if old_dist > 0.0 && new_dist > 0.0 {
                    let (sx, sy) = *center;
                    vec![Intent::Zoom {
                        sx,
                        sy,
                        factor: new_dist / old_dist,
                    }]
                } else {
                    Vec::new()
                }
            }
            (GestureState::Panning { .. }, [a, b, ..]) => {
                // Missed touchstart for the second finger; promote here too.
                self.state = GestureState::Pinching {
                    dist: dist(*a, *b),
                    center: midpoint(*a, *b),
                };
                Vec::new()
            }
            (GestureState::Panning { last, touch }, [only]) => {
                let dx = only.0 - last.0;
                let dy = only.1 - last.1;
                *last = *only;
                if let Some(press) = touch {
                    press.travel = press.travel.max(dist(*only, press.origin));
                }
                vec![Intent::Pan { dx, dy }]
            }
            _ => Vec::new(),
        }
    }

    /// `remaining` holds the fingers still on the surface after the lift.
    pub fn touch_end(&mut self, remaining: &[(f64, f64)], now_ms: f64) -> Vec<Intent> {
        match (self.state, remaining) {
            (GestureState::Pinching { .. }, [left]) => {
                // Back to single-finger panning anchored at the surviving
                // finger, so the next move produces no jump. The gesture
                // already zoomed; it can no longer end in a tap.
                self.state = GestureState::Panning {
                    last: *left,
                    touch: Some(TouchPress {
                        started_ms: now_ms,
                        origin: *left,
                        travel: f64::MAX,
                    }),
                };
                Vec::new()
            }
            (GestureState::Panning { last, touch }, []) => {
                self.state = GestureState::Idle;
                let Some(press) = touch else {
                    return Vec::new();
                };
                let duration = now_ms - press.started_ms;
                if duration >= TAP_MAX_DURATION_MS || press.travel >= TAP_SLOP_PX {
                    return Vec::new();
                }
                if let Some((tap_ms, tap_pos)) = self.last_tap
                    && now_ms - tap_ms <= DOUBLE_TAP_WINDOW_MS
                    && dist(last, tap_pos) <= DOUBLE_TAP_RADIUS_PX
                {
                    self.last_tap = None;
                    return vec![Intent::DoubleTap {
                        sx: last.0,
                        sy: last.1,
                    }];
                }
                self.last_tap = Some((now_ms, last));
                vec![Intent::Click {
                    sx: last.0,
                    sy: last.1,
                }]
            }
            (_, []) => {
                self.state = GestureState::Idle;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Global recovery: force everything back to idle regardless of what
    /// release events were missed.
    pub fn escape(&mut self) -> Vec<Intent> {
        let mut intents = Vec::new();
        self.state = GestureState::Idle;
        self.last_tap = None;
        self.clear_hover(&mut intents);
        intents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> InteractionController {
        InteractionController::new()
    }

    #[test]
    fn middle_button_pans_continuously_without_threshold() {
        let mut c = controller();
        c.pointer_down(100.0, 100.0, PointerButton::Pan);
        assert!(c.is_panning());
        assert_eq!(
            c.pointer_move(101.0, 100.5, 0.0),
            vec![Intent::Pan { dx: 1.0, dy: 0.5 }]
        );
        assert_eq!(
            c.pointer_move(99.0, 101.5, 10.0),
            vec![Intent::Pan { dx: -2.0, dy: 1.0 }]
        );
        assert!(c.pointer_up(99.0, 101.5).is_empty());
        assert!(!c.is_panning());
    }

    #[test]
    fn primary_press_never_pans() {
        let mut c = controller();
        c.pointer_down(100.0, 100.0, PointerButton::Primary);
        assert!(c.pointer_move(140.0, 100.0, 0.0).is_empty());
        assert!(!c.is_panning());
    }

    #[test]
    fn short_drag_still_resolves_to_click_at_release_position() {
        let mut c = controller();
        c.pointer_down(100.0, 100.0, PointerButton::Primary);
        c.pointer_move(106.0, 108.0, 0.0);
        let intents = c.pointer_up(106.0, 108.0);
        assert_eq!(
            intents,
            vec![Intent::Click {
                sx: 106.0,
                sy: 108.0
            }]
        );
    }

    #[test]
    fn long_drag_is_an_aborted_click() {
        let mut c = controller();
        c.pointer_down(100.0, 100.0, PointerButton::Primary);
        c.pointer_move(120.0, 100.0, 0.0);
        assert!(c.pointer_up(120.0, 100.0).is_empty());
    }

    #[test]
    fn wiggle_that_returns_near_origin_still_clicks() {
        // Classification is deferred to release: mid-gesture excursions
        // beyond the threshold do not disqualify the press.
        let mut c = controller();
        c.pointer_down(100.0, 100.0, PointerButton::Primary);
        c.pointer_move(130.0, 100.0, 0.0);
        c.pointer_move(102.0, 101.0, 10.0);
        assert_eq!(
            c.pointer_up(102.0, 101.0),
            vec![Intent::Click {
                sx: 102.0,
                sy: 101.0
            }]
        );
    }

    #[test]
    fn secondary_button_is_ignored() {
        let mut c = controller();
        assert!(c.pointer_down(50.0, 50.0, PointerButton::Secondary).is_empty());
        assert!(c.pointer_up(50.0, 50.0).is_empty());
    }

    #[test]
    fn hover_is_debounced_while_idle() {
        let mut c = controller();
        assert_eq!(
            c.pointer_move(10.0, 10.0, 1000.0),
            vec![Intent::Hover { sx: 10.0, sy: 10.0 }]
        );
        assert!(c.pointer_move(11.0, 10.0, 1050.0).is_empty());
        assert_eq!(
            c.pointer_move(12.0, 10.0, 1100.0),
            vec![Intent::Hover { sx: 12.0, sy: 10.0 }]
        );
    }

    #[test]
    fn hover_is_suppressed_while_pressed() {
        let mut c = controller();
        c.pointer_move(10.0, 10.0, 0.0);
        c.pointer_down(10.0, 10.0, PointerButton::Primary);
        assert!(c.pointer_move(12.0, 10.0, 500.0).is_empty());
    }

    #[test]
    fn press_clears_active_hover() {
        let mut c = controller();
        c.pointer_move(10.0, 10.0, 1000.0);
        let intents = c.pointer_down(10.0, 10.0, PointerButton::Primary);
        assert_eq!(intents, vec![Intent::HoverCleared]);
    }

    #[test]
    fn wheel_zooms_toward_pointer_and_never_clicks() {
        let mut c = controller();
        assert_eq!(
            c.wheel(320.0, 240.0, -100.0),
            vec![Intent::Zoom {
                sx: 320.0,
                sy: 240.0,
                factor: WHEEL_ZOOM_IN
            }]
        );
        assert_eq!(
            c.wheel(320.0, 240.0, 100.0),
            vec![Intent::Zoom {
                sx: 320.0,
                sy: 240.0,
                factor: WHEEL_ZOOM_OUT
            }]
        );
        assert!(c.wheel(320.0, 240.0, 0.0).is_empty());
    }

    #[test]
    fn sole_finger_pans() {
        let mut c = controller();
        c.touch_start(&[(50.0, 50.0)], 0.0);
        assert!(c.is_panning());
        assert_eq!(
            c.touch_move(&[(55.0, 52.0)], 16.0),
            vec![Intent::Pan { dx: 5.0, dy: 2.0 }]
        );
    }

    #[test]
    fn second_finger_promotes_to_pinch_and_zooms_by_distance_ratio() {
        let mut c = controller();
        c.touch_start(&[(100.0, 100.0)], 0.0);
        c.touch_start(&[(100.0, 100.0), (200.0, 100.0)], 50.0);
        let intents = c.touch_move(&[(90.0, 100.0), (210.0, 100.0)], 66.0);
        assert_eq!(intents.len(), 1);
        match &intents[0] {
            Intent::Zoom { sx, sy, factor } => {
                assert_eq!((*sx, *sy), (150.0, 100.0));
                assert!((factor - 1.2).abs() < 1e-9);
            }
            other => panic!("expected zoom, got {other:?}"),
        }
    }

    #[test]
    fn lifting_one_finger_resumes_panning_without_jump() {
        let mut c = controller();
        c.touch_start(&[(100.0, 100.0), (200.0, 100.0)], 0.0);
        c.touch_end(&[(200.0, 100.0)], 100.0);
        assert!(c.is_panning());
        // The first move after the lift is measured from the surviving
        // finger's position, not from any stale origin.
        assert_eq!(
            c.touch_move(&[(203.0, 101.0)], 116.0),
            vec![Intent::Pan { dx: 3.0, dy: 1.0 }]
        );
        // And a quick lift right after a pinch is not a tap.
        assert!(c.touch_end(&[], 130.0).is_empty());
    }

    #[test]
    fn quick_still_touch_is_a_tap_click() {
        let mut c = controller();
        c.touch_start(&[(80.0, 90.0)], 1000.0);
        let intents = c.touch_end(&[], 1100.0);
        assert_eq!(intents, vec![Intent::Click { sx: 80.0, sy: 90.0 }]);
    }

    #[test]
    fn slow_or_travelled_touches_are_not_taps() {
        let mut c = controller();
        c.touch_start(&[(80.0, 90.0)], 1000.0);
        assert!(c.touch_end(&[], 1300.0).is_empty());

        c.touch_start(&[(80.0, 90.0)], 2000.0);
        c.touch_move(&[(120.0, 90.0)], 2050.0);
        c.touch_move(&[(81.0, 90.0)], 2080.0);
        assert!(c.touch_end(&[], 2100.0).is_empty());
    }

    #[test]
    fn two_quick_nearby_taps_make_a_double_tap() {
        let mut c = controller();
        c.touch_start(&[(80.0, 90.0)], 1000.0);
        assert_eq!(
            c.touch_end(&[], 1080.0),
            vec![Intent::Click { sx: 80.0, sy: 90.0 }]
        );
        c.touch_start(&[(85.0, 92.0)], 1200.0);
        assert_eq!(
            c.touch_end(&[], 1280.0),
            vec![Intent::DoubleTap { sx: 85.0, sy: 92.0 }]
        );
        // The pair is consumed; a third tap starts over as a single.
        c.touch_start(&[(85.0, 92.0)], 1400.0);
        assert_eq!(
            c.touch_end(&[], 1450.0),
            vec![Intent::Click { sx: 85.0, sy: 92.0 }]
        );
    }

    #[test]
    fn distant_or_late_second_tap_stays_a_single() {
        let mut c = controller();
        c.touch_start(&[(80.0, 90.0)], 1000.0);
        c.touch_end(&[], 1080.0);
        c.touch_start(&[(200.0, 90.0)], 1150.0);
        assert_eq!(
            c.touch_end(&[], 1200.0),
            vec![Intent::Click { sx: 200.0, sy: 90.0 }]
        );

        let mut c = controller();
        c.touch_start(&[(80.0, 90.0)], 1000.0);
        c.touch_end(&[], 1080.0);
        c.touch_start(&[(80.0, 90.0)], 2000.0);
        assert_eq!(
            c.touch_end(&[], 2050.0),
            vec![Intent::Click { sx: 80.0, sy: 90.0 }]
        );
    }

    #[test]
    fn escape_recovers_from_any_state() {
        let mut c = controller();
        c.pointer_down(10.0, 10.0, PointerButton::Pan);
        c.escape();
        assert!(!c.is_panning());
        // A move after recovery is plain hover, not a pan.
        assert_eq!(
            c.pointer_move(12.0, 10.0, 1000.0),
            vec![Intent::Hover { sx: 12.0, sy: 10.0 }]
        );

        c.pointer_down(10.0, 10.0, PointerButton::Primary);
        c.escape();
        assert!(c.pointer_up(10.0, 10.0).is_empty());
    }

    #[test]
    fn pointer_leave_abandons_press_and_clears_hover() {
        let mut c = controller();
        c.pointer_move(10.0, 10.0, 1000.0);
        c.pointer_down(10.0, 10.0, PointerButton::Primary);
        let intents = c.pointer_leave();
        assert!(intents.is_empty());
        assert!(c.pointer_up(10.0, 10.0).is_empty());

        let mut c = controller();
        c.pointer_move(10.0, 10.0, 1000.0);
        assert_eq!(c.pointer_leave(), vec![Intent::HoverCleared]);
    }
}
