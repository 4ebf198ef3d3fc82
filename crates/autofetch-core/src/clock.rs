use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of time for every blocking wait in the engine.
pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);

    /// Instant `after` from now; `None` when that lies past what `Instant`
    /// can represent, which callers treat as no deadline at all.
    fn deadline(&self, after: Duration) -> Option<Instant> {
        self.now().checked_add(after)
    }

    fn reached(&self, deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|at| self.now() >= at)
    }
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Simulated clock: `sleep` advances time instantly. Clones share the same
/// timeline, so a simulated directory and the watcher observe identical time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Time elapsed on this timeline since the clock was created.
    pub fn elapsed(&self) -> Duration {
        match self.offset.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut guard = match self.offset.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = guard.saturating_add(duration);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
