/// Tile transition animations: spawned on create/update/remove, advanced by
/// wall-clock deltas on a frame ticker that is independent of the coalesced
/// render path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    Create,
    Update,
    Remove,
}

pub const CREATE_DURATION_MS: f64 = 300.0;
pub const UPDATE_DURATION_MS: f64 = 250.0;
pub const REMOVE_DURATION_MS: f64 = 400.0;

#[derive(Debug, Clone)]
pub struct TileAnimation {
    pub kind: AnimationKind,
    pub x: i32,
    pub y: i32,
    pub elapsed: f64,
    pub duration: f64,
}

impl TileAnimation {
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    /// Eased progress for rendering (decelerating to zero velocity).
    pub fn eased(&self) -> f64 {
        cubic_ease_out(self.progress())
    }
}

/// Cubic ease-out: decelerating to zero velocity.
pub fn cubic_ease_out(t: f64) -> f64 {
    let t = t - 1.0;
    t * t * t + 1.0
}

/// Queue of active animations. Two animations for the same tile run to
/// completion independently; whichever `Remove` finishes last wins the
/// deletion. Rendering reads the most recently enqueued entry for a tile.
pub struct AnimationQueue {
    items: Vec<TileAnimation>,
    last_tick_ms: Option<f64>,
}

impl Default for AnimationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationQueue {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            last_tick_ms: None,
        }
    }

    pub fn enqueue(&mut self, kind: AnimationKind, x: i32, y: i32, duration: f64) {
        self.items.push(TileAnimation {
            kind,
            x,
            y,
            elapsed: 0.0,
            duration,
        });
    }

    pub fn is_idle(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// The animation to render for a tile: the most recently enqueued one.
    pub fn active_for(&self, x: i32, y: i32) -> Option<&TileAnimation> {
        self.items.iter().rev().find(|a| a.x == x && a.y == y)
    }

    /// Advance every animation by the wall-clock delta since the previous
    /// tick and return the completed ones, removed from the queue in
    /// enqueue order. The first tick after idle sees a zero delta so queue
    /// idle time never counts against a fresh animation.
    pub fn advance(&mut self, now_ms: f64) -> Vec<TileAnimation> {
        let dt = (now_ms - self.last_tick_ms.unwrap_or(now_ms)).max(0.0);
        self.last_tick_ms = Some(now_ms);

        for item in &mut self.items {
            item.elapsed += dt;
        }

        let mut completed = Vec::new();
        self.items.retain(|item| {
            if item.elapsed >= item.duration {
                completed.push(item.clone());
                false
            } else {
                true
            }
        });

        if self.items.is_empty() {
            self.last_tick_ms = None;
        }
        completed
    }

    /// Drop everything without completing it (emergency reset).
    pub fn clear(&mut self) {
        self.items.clear();
        self.last_tick_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_completes_after_its_duration() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Remove, 2, 3, 400.0);

        assert!(queue.advance(1000.0).is_empty());
        assert!(queue.advance(1399.0).is_empty());
        let done = queue.advance(1401.0);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].kind, AnimationKind::Remove);
        assert_eq!((done[0].x, done[0].y), (2, 3));
        assert!(queue.is_idle());
    }

    #[test]
    fn first_tick_after_idle_has_zero_delta() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Create, 0, 0, 100.0);
        // Even with a huge wall-clock value, the first tick only anchors the
        // clock; the animation must not jump to completion.
        assert!(queue.advance(1_000_000.0).is_empty());
        let done = queue.advance(1_000_150.0);
        assert_eq!(done.len(), 1);

        // Going idle resets the anchor for the next enqueue.
        queue.enqueue(AnimationKind::Create, 1, 1, 100.0);
        assert!(queue.advance(2_000_000.0).is_empty());
    }

    #[test]
    fn advance_uses_wall_clock_deltas_not_fixed_steps() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Update, 0, 0, 100.0);
        queue.advance(0.0);
        queue.advance(30.0);
        queue.advance(45.0);
        assert_eq!(queue.active_for(0, 0).unwrap().elapsed, 45.0);
        let done = queue.advance(145.0);
        assert_eq!(done.len(), 1);
    }

    #[test]
    fn duplicate_animations_for_one_tile_all_run() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Create, 5, 5, 100.0);
        queue.advance(0.0);
        queue.advance(50.0);
        queue.enqueue(AnimationKind::Remove, 5, 5, 100.0);

        // Rendering reads the newest entry.
        assert_eq!(queue.active_for(5, 5).unwrap().kind, AnimationKind::Remove);
        assert_eq!(queue.len(), 2);

        let first = queue.advance(101.0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, AnimationKind::Create);

        let second = queue.advance(151.0);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].kind, AnimationKind::Remove);
        assert!(queue.is_idle());
    }

    #[test]
    fn backwards_clock_is_treated_as_zero_delta() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Create, 0, 0, 100.0);
        queue.advance(500.0);
        queue.advance(400.0);
        assert_eq!(queue.active_for(0, 0).unwrap().elapsed, 0.0);
    }

    #[test]
    fn eased_progress_is_bounded_and_complete() {
        let anim = TileAnimation {
            kind: AnimationKind::Create,
            x: 0,
            y: 0,
            elapsed: 0.0,
            duration: 100.0,
        };
        assert_eq!(anim.eased(), 0.0);
        let done = TileAnimation {
            elapsed: 100.0,
            ..anim.clone()
        };
        assert_eq!(done.eased(), 1.0);
        let over = TileAnimation {
            elapsed: 250.0,
            ..anim.clone()
        };
        assert_eq!(over.progress(), 1.0);
        let mid = TileAnimation {
            elapsed: 50.0,
            ..anim
        };
        assert!(mid.eased() > 0.5 && mid.eased() < 1.0);
    }

    #[test]
    fn clear_discards_without_completion() {
        let mut queue = AnimationQueue::new();
        queue.enqueue(AnimationKind::Remove, 1, 1, 100.0);
        queue.clear();
        assert!(queue.is_idle());
        assert!(queue.advance(10_000.0).is_empty());
    }
}
