//! De-duplication of repeated log causes

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Remembered causes before the set is cleared
pub const DEFAULT_LOG_ONCE_CAPACITY: usize = 1024;

/// Remembers which cause keys were already reported
///
/// Once more than `capacity` keys are stored the set is cleared, so a
/// long-running process re-reports old causes eventually instead of
/// growing without bound.
#[derive(Debug)]
pub struct LogOnce {
    seen: Mutex<FxHashSet<String>>,
    capacity: usize,
}

impl LogOnce {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_ONCE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: Mutex::new(FxHashSet::default()),
            capacity: capacity.max(1),
        }
    }

    /// True the first time `key` is seen
    pub fn first(&self, key: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(key) {
            return false;
        }
        if seen.len() >= self.capacity {
            seen.clear();
        }
        seen.insert(key.to_string());
        true
    }

    /// Forget `key` so its next occurrence is reported again
    pub fn forget(&self, key: &str) {
        self.seen.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl Default for LogOnce {
    fn default() -> Self {
        Self::new()
    }
}
