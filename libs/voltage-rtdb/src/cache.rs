//! Live value cache
//!
//! Continuously updated `id -> value` map with a parallel `id -> timestamp`
//! map. Written by the external push path and by fresh reads, read by the
//! snapshot builder. Clones share the same storage.

use crate::time::{SystemTimeProvider, TimeProvider};
use dashmap::DashMap;
use std::sync::Arc;
use voltage_model::Value;

#[derive(Clone)]
pub struct ValueCache {
    values: Arc<DashMap<String, Value>>,
    timestamps: Arc<DashMap<String, i64>>,
    time: Arc<dyn TimeProvider>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::with_time_provider(Arc::new(SystemTimeProvider))
    }

    /// Cache whose writes are stamped by `time`
    pub fn with_time_provider(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            timestamps: Arc::new(DashMap::new()),
            time,
        }
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.values.get(id).map(|v| v.clone())
    }

    /// Timestamp of the last write, in ms since epoch
    pub fn timestamp(&self, id: &str) -> Option<i64> {
        self.timestamps.get(id).map(|ts| *ts)
    }

    /// Store a value stamped with the current time
    pub fn set(&self, id: &str, value: Value) {
        let now = self.time.now_millis();
        self.set_with_timestamp(id, value, now);
    }

    pub fn set_with_timestamp(&self, id: &str, value: Value, timestamp_ms: i64) {
        self.values.insert(id.to_string(), value);
        self.timestamps.insert(id.to_string(), timestamp_ms);
    }

    pub fn remove(&self, id: &str) -> Option<Value> {
        self.timestamps.remove(id);
        self.values.remove(id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Current time according to the cache clock
    pub fn now_millis(&self) -> i64 {
        self.time.now_millis()
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) {
        self.values.clear();
        self.timestamps.clear();
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache")
            .field("len", &self.values.len())
            .finish()
    }
}
