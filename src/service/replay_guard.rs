use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for [`ReplayGuard`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Remembers authorization codes for a time window so a code cannot be
/// exchanged twice by this process.
///
/// Entries older than `window` are evicted lazily on every access; when the
/// set is full the oldest entry makes room. Process-local only.
pub struct ReplayGuard {
    window: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    seen: HashMap<String, Instant>,
}

impl ReplayGuard {
    pub fn new(window: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            capacity: capacity.max(1),
            clock,
            seen: HashMap::new(),
        }
    }

    pub fn with_system_clock(window: Duration, capacity: usize) -> Self {
        Self::new(window, capacity, Arc::new(SystemClock))
    }

    /// Record `code` as seen. Returns `false` if it was already seen within the window.
    pub fn register(&mut self, code: &str) -> bool {
        let now = self.clock.now();
        self.evict_expired(now);

        if self.seen.contains_key(code) {
            return false;
        }

        if self.seen.len() >= self.capacity {
            self.evict_oldest();
        }
        self.seen.insert(code.to_string(), now);
        true
    }

    #[cfg(test)]
    fn contains(&mut self, code: &str) -> bool {
        let now = self.clock.now();
        self.evict_expired(now);
        self.seen.contains_key(code)
    }

    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn evict_expired(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < window);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .seen
            .iter()
            .min_by_key(|(_, first_seen)| **first_seen)
            .map(|(code, _)| code.clone());
        if let Some(code) = oldest {
            self.seen.remove(&code);
        }
    }
}
