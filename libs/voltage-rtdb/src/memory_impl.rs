//! In-memory collaborator implementations
//!
//! Uses DashMap for concurrent access. [`CacheSink`] is the long-running
//! sink of the service binary and keeps only current values. The other
//! types record every call so tests can inject failures and delays per id
//! and inspect the history.

use crate::cache::ValueCache;
use crate::error::RtdbError;
use crate::traits::{OutputSink, SourceReader, Subscriber};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voltage_model::{ItemConfig, Value};

/// Authoritative store answering fresh reads
#[derive(Default)]
pub struct MemorySource {
    values: DashMap<String, Value>,
    failing: DashSet<String>,
    reads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, value: Value) {
        self.values.insert(id.to_string(), value);
    }

    /// Make every read of `id` fail
    pub fn fail_reads_for(&self, id: &str) {
        self.failing.insert(id.to_string());
    }

    /// Number of read attempts so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn read(&self, id: &str) -> Result<Option<Value>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing.contains(id) {
            return Err(RtdbError::ReadFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(self.values.get(id).map(|v| v.clone()))
    }
}

/// Subscription registry
#[derive(Default)]
pub struct MemorySubscriber {
    subscribed: DashSet<String>,
    failing: DashSet<String>,
    calls: Mutex<Vec<SubscriptionCall>>,
}

/// One recorded subscribe/unsubscribe call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionCall {
    Subscribe(String),
    Unsubscribe(String),
}

impl MemorySubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        self.subscribed.contains(id)
    }

    /// Subscribed ids, sorted
    pub fn subscribed(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscribed.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Calls in the order they were made
    pub fn calls(&self) -> Vec<SubscriptionCall> {
        self.calls.lock().clone()
    }

    pub fn fail_subscribe_for(&self, id: &str) {
        self.failing.insert(id.to_string());
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    async fn subscribe(&self, id: &str) -> Result<()> {
        self.calls
            .lock()
            .push(SubscriptionCall::Subscribe(id.to_string()));
        if self.failing.contains(id) {
            return Err(RtdbError::SubscribeFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.subscribed.insert(id.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.calls
            .lock()
            .push(SubscriptionCall::Unsubscribe(id.to_string()));
        self.subscribed.remove(id);
        Ok(())
    }
}

/// One recorded output write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub id: String,
    pub value: Value,
    pub computed: bool,
}

/// Output sink recording every write
///
/// Optionally mirrors written values into a [`ValueCache`] so outputs can
/// feed other items, and optionally sleeps on each write.
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<WriteRecord>>,
    latest: DashMap<String, Value>,
    objects: DashMap<String, ItemConfig>,
    failing: DashSet<String>,
    mirror: Option<ValueCache>,
    write_delay: Option<Duration>,
    hooks: Mutex<Vec<WriteHook>>,
}

type WriteHook = Arc<dyn Fn(&str, &Value) + Send + Sync>;

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror every successful write into `cache`
    pub fn with_mirror(mut self, cache: ValueCache) -> Self {
        self.mirror = Some(cache);
        self
    }

    /// Sleep for `delay` inside every write
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Run `hook` after every successful write
    pub fn on_write(&self, hook: impl Fn(&str, &Value) + Send + Sync + 'static) {
        self.hooks.lock().push(Arc::new(hook));
    }

    pub fn fail_writes_for(&self, id: &str) {
        self.failing.insert(id.to_string());
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    /// Values written for `id`, oldest first
    pub fn writes_for(&self, id: &str) -> Vec<Value> {
        self.writes
            .lock()
            .iter()
            .filter(|w| w.id == id)
            .map(|w| w.value.clone())
            .collect()
    }

    pub fn last(&self, id: &str) -> Option<Value> {
        self.latest.get(id).map(|v| v.clone())
    }

    /// Output ids registered through `ensure_object`, sorted
    pub fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        self.writes.lock().clear();
        self.latest.clear();
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn write(&self, id: &str, value: &Value, computed: bool) -> Result<()> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(id) {
            return Err(RtdbError::WriteFailed {
                id: id.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        self.writes.lock().push(WriteRecord {
            id: id.to_string(),
            value: value.clone(),
            computed,
        });
        self.latest.insert(id.to_string(), value.clone());
        if let Some(cache) = &self.mirror {
            cache.set(id, value.clone());
        }

        let hooks: Vec<WriteHook> = self.hooks.lock().clone();
        for hook in hooks {
            hook(id, value);
        }
        Ok(())
    }

    async fn ensure_object(&self, id: &str, item: &ItemConfig) -> Result<()> {
        self.objects
            .entry(id.to_string())
            .or_insert_with(|| item.clone());
        Ok(())
    }
}

/// Output sink publishing straight into a [`ValueCache`]
///
/// Only the latest value per id is kept, so memory stays bounded by the
/// number of outputs. Published values become readable by other items.
pub struct CacheSink {
    cache: ValueCache,
    objects: DashMap<String, ItemConfig>,
}

impl CacheSink {
    pub fn new(cache: ValueCache) -> Self {
        Self {
            cache,
            objects: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    /// Number of registered output objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl OutputSink for CacheSink {
    async fn write(&self, id: &str, value: &Value, computed: bool) -> Result<()> {
        tracing::debug!("CacheSink: {} = {} (computed: {})", id, value, computed);
        self.cache.set(id, value.clone());
        Ok(())
    }

    async fn ensure_object(&self, id: &str, item: &ItemConfig) -> Result<()> {
        if !self.objects.contains_key(id) {
            tracing::trace!("CacheSink: registered output {}", id);
            self.objects.insert(id.to_string(), item.clone());
        }
        Ok(())
    }
}
