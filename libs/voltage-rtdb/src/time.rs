//! Time provider abstraction for cache timestamps
//!
//! Separates time acquisition from storage so tests can pin or advance the
//! clock that stamps cache writes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Time provider trait for generating timestamps
pub trait TimeProvider: Send + Sync + 'static {
    /// Get current timestamp in milliseconds since Unix epoch
    fn now_millis(&self) -> i64;
}

/// System time provider using local clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Manually driven time provider for testing
///
/// Returns a predetermined timestamp until moved with [`set`](Self::set) or
/// [`advance`](Self::advance).
#[derive(Debug)]
pub struct FixedTimeProvider {
    timestamp_ms: AtomicI64,
}

impl FixedTimeProvider {
    /// Create a new fixed time provider with the given timestamp
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms: AtomicI64::new(timestamp_ms),
        }
    }

    pub fn set(&self, timestamp_ms: i64) {
        self.timestamp_ms.store(timestamp_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.timestamp_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_millis(&self) -> i64 {
        self.timestamp_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_provider() {
        let provider = SystemTimeProvider;
        let time1 = provider.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let time2 = provider.now_millis();

        assert!(time2 >= time1);
        assert!(time2 - time1 >= 10);
    }

    #[test]
    fn test_fixed_time_provider() {
        let fixed_time = 1700000000000_i64;
        let provider = FixedTimeProvider::new(fixed_time);

        assert_eq!(provider.now_millis(), fixed_time);
        assert_eq!(provider.now_millis(), fixed_time); // Always returns same value

        provider.advance(500);
        assert_eq!(provider.now_millis(), fixed_time + 500);
        provider.set(5);
        assert_eq!(provider.now_millis(), 5);
    }
}
