//! Windowed rate admission for `tps`-configured systems.
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Admits the first `limit` requests of each one-second window.
///
/// Decisions are deterministic within a process: the window opens on first
/// use, ties go toward admission, and the counter resets when the window
/// rolls over. One limiter exists per registered system, guarded by its own
/// mutex so systems never contend with each other.
pub(crate) struct RateLimiter {
    window: Mutex<Window>,
}

struct Window {
    start: Instant,
    taken: u64,
}

impl RateLimiter {
    pub(crate) fn new() -> Self {
        RateLimiter {
            window: Mutex::new(Window {
                start: Instant::now(),
                taken: 0,
            }),
        }
    }

    pub(crate) fn try_acquire(&self, limit: u64) -> bool {
        let mut window = self.window.lock();
        let now = Instant::now();
        if now.duration_since(window.start) >= Duration::from_secs(1) {
            window.start = now;
            window.taken = 0;
        }
        if window.taken < limit {
            window.taken += 1;
            true
        } else {
            false
        }
    }
}
