//! Point-in-time snapshot of source values
//!
//! Built once per tick from the live cache (optionally after fresh reads)
//! and never mutated afterwards, so every item in a tick sees the same
//! value for a shared source.

use crate::config::SnapshotConfig;
use crate::log_once::LogOnce;
use futures::stream::{self, StreamExt};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use voltage_calc::Environment;
use voltage_model::Value;
use voltage_rtdb::{SourceReader, ValueCache};

/// Cached value of one source at snapshot time
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub value: Option<Value>,
    pub timestamp_ms: Option<i64>,
}

/// Immutable `id -> value` map for one tick
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Arc<FxHashMap<String, SnapshotEntry>>,
    taken_at_ms: i64,
}

impl Snapshot {
    /// Materialize the current cache contents for `ids`
    pub fn capture(ids: &[String], cache: &ValueCache) -> Self {
        let entries = ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    SnapshotEntry {
                        value: cache.get(id),
                        timestamp_ms: cache.timestamp(id),
                    },
                )
            })
            .collect();
        Self {
            entries: Arc::new(entries),
            taken_at_ms: cache.now_millis(),
        }
    }

    /// Whether `id` was part of the snapshot, with or without a value
    pub fn covers(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.entries.get(id).and_then(|e| e.value.as_ref())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn taken_at_ms(&self) -> i64 {
        self.taken_at_ms
    }
}

impl Environment for Snapshot {
    fn resolve(&self, id: &str) -> Option<Value> {
        self.get(id).cloned()
    }
}

/// Live cache as an evaluation environment
pub struct CacheView<'a>(pub &'a ValueCache);

impl Environment for CacheView<'_> {
    fn resolve(&self, id: &str) -> Option<Value> {
        self.0.get(id)
    }
}

/// Snapshot first, live cache for ids the snapshot does not cover
pub struct StateView<'a> {
    snapshot: Option<&'a Snapshot>,
    cache: CacheView<'a>,
}

impl<'a> StateView<'a> {
    pub fn new(snapshot: Option<&'a Snapshot>, cache: &'a ValueCache) -> Self {
        Self {
            snapshot,
            cache: CacheView(cache),
        }
    }
}

impl Environment for StateView<'_> {
    fn resolve(&self, id: &str) -> Option<Value> {
        match self.snapshot {
            Some(snapshot) if snapshot.covers(id) => snapshot.resolve(id),
            _ => self.cache.resolve(id),
        }
    }
}

/// Build the snapshot for `ids`
///
/// With `refresh_before_read` and a reader, waits the settle delay and then
/// re-reads every id (bounded fan-out), writing successes into the cache.
/// Read failures are logged once per cause and otherwise ignored.
pub async fn build_snapshot(
    ids: &[String],
    cache: &ValueCache,
    reader: Option<&dyn SourceReader>,
    config: &SnapshotConfig,
    log_once: &LogOnce,
) -> Snapshot {
    if let (true, Some(reader)) = (config.refresh_before_read, reader) {
        if config.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.settle_delay_ms)).await;
        }

        let reads: Vec<_> = ids
            .iter()
            .map(|id| async move { (id, reader.read(id).await) })
            .collect();
        let results: Vec<(&String, anyhow::Result<Option<Value>>)> = stream::iter(reads)
            .buffer_unordered(config.read_concurrency.max(1))
            .collect()
            .await;

        let mut refreshed = 0usize;
        for (id, result) in results {
            match result {
                Ok(Some(value)) => {
                    cache.set(id, value);
                    refreshed += 1;
                },
                Ok(None) => {},
                Err(e) => {
                    let cause = format!("read:{}:{}", id, e);
                    if log_once.first(&cause) {
                        warn!("Fresh read of {} failed: {}", id, e);
                    }
                },
            }
        }
        debug!("Refreshed {}/{} source(s) before snapshot", refreshed, ids.len());
    }

    Snapshot::capture(ids, cache)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_test::traced_test;
    use voltage_rtdb::{FixedTimeProvider, MemorySource};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let cache = ValueCache::new();
        cache.set("a", Value::Number(1.0));

        let snapshot = build_snapshot(
            &ids(&["a", "b"]),
            &cache,
            None,
            &SnapshotConfig::default(),
            &LogOnce::new(),
        )
        .await;

        cache.set("a", Value::Number(2.0));
        cache.set("b", Value::Number(3.0));

        assert_eq!(snapshot.resolve("a"), Some(Value::Number(1.0)));
        assert!(snapshot.covers("b"));
        assert_eq!(snapshot.resolve("b"), None);
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_state_view_falls_back_to_cache_for_uncovered_ids() {
        let cache = ValueCache::new();
        cache.set("a", Value::Number(1.0));
        let snapshot = Snapshot::capture(&ids(&["a", "gone"]), &cache);
        cache.set("a", Value::Number(9.0));
        cache.set("gone", Value::Number(9.0));
        cache.set("dynamic", Value::Number(5.0));

        let view = StateView::new(Some(&snapshot), &cache);
        assert_eq!(view.resolve("a"), Some(Value::Number(1.0)));
        assert_eq!(view.resolve("gone"), None);
        assert_eq!(view.resolve("dynamic"), Some(Value::Number(5.0)));

        let live = StateView::new(None, &cache);
        assert_eq!(live.resolve("a"), Some(Value::Number(9.0)));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_refresh_overwrites_cache_and_ignores_failures() {
        let clock = Arc::new(FixedTimeProvider::new(10_000));
        let cache = ValueCache::with_time_provider(clock);
        cache.set_with_timestamp("a", Value::Number(1.0), 1);
        cache.set_with_timestamp("bad", Value::Number(7.0), 1);

        let source = MemorySource::new();
        source.set("a", Value::Number(2.0));
        source.fail_reads_for("bad");

        let config = SnapshotConfig {
            refresh_before_read: true,
            settle_delay_ms: 0,
            read_concurrency: 2,
        };
        let once = LogOnce::new();
        let all = ids(&["a", "bad", "absent"]);

        let snapshot = build_snapshot(&all, &cache, Some(&source), &config, &once).await;
        build_snapshot(&all, &cache, Some(&source), &config, &once).await;

        assert_eq!(snapshot.resolve("a"), Some(Value::Number(2.0)));
        assert_eq!(cache.timestamp("a"), Some(10_000));
        assert_eq!(snapshot.resolve("bad"), Some(Value::Number(7.0)));
        assert_eq!(snapshot.resolve("absent"), None);
        assert_eq!(source.read_count(), 6);

        assert!(logs_contain("Fresh read of bad failed"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("Fresh read of bad")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_is_awaited() {
        let cache = ValueCache::new();
        let source = MemorySource::new();
        let config = SnapshotConfig {
            refresh_before_read: true,
            settle_delay_ms: 250,
            read_concurrency: 8,
        };

        let started = tokio::time::Instant::now();
        build_snapshot(&ids(&["a"]), &cache, Some(&source), &config, &LogOnce::new()).await;
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_no_reads_without_refresh() {
        let cache = ValueCache::new();
        let source = MemorySource::new();
        build_snapshot(
            &ids(&["a"]),
            &cache,
            Some(&source),
            &SnapshotConfig::default(),
            &LogOnce::new(),
        )
        .await;
        assert_eq!(source.read_count(), 0);
    }
}
