//! Per-item and scheduler-wide diagnostics
//!
//! The scheduler owns the only writer; readers clone a [`DiagnosticsHandle`]
//! and take consistent copies with [`DiagnosticsHandle::snapshot`].

use crate::snapshot::Snapshot;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A source is stale once it is older than this many poll intervals
pub const STALE_AFTER_INTERVALS: i64 = 3;

/// Diagnostic state of one configured item
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDiagnostics {
    pub compiled_ok: bool,
    pub compile_error: Option<String>,
    /// `config` or `compile` when the item failed to compile
    pub error_class: Option<&'static str>,
    pub last_error: Option<String>,
    pub last_ok_timestamp: Option<i64>,
    pub last_eval_duration_ms: Option<f64>,
    pub consecutive_errors: u32,
}

/// Cross-source timestamp health of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimestampHealth {
    pub oldest_ms: Option<i64>,
    pub newest_ms: Option<i64>,
    /// `newest - oldest` over sources with a timestamp
    pub max_gap_ms: i64,
    /// Sources without a cached value
    pub missing: usize,
    /// Sources older than the stale threshold
    pub stale: usize,
}

impl TimestampHealth {
    /// Summarize the entry timestamps of `snapshot`
    pub fn from_snapshot(snapshot: &Snapshot, poll_interval_ms: u64) -> Self {
        let stale_before =
            snapshot.taken_at_ms() - STALE_AFTER_INTERVALS * poll_interval_ms as i64;
        let mut health = Self::default();

        for (_, entry) in snapshot.entries() {
            if entry.value.is_none() {
                health.missing += 1;
            }
            let Some(ts) = entry.timestamp_ms else {
                continue;
            };
            health.oldest_ms = Some(health.oldest_ms.map_or(ts, |o| o.min(ts)));
            health.newest_ms = Some(health.newest_ms.map_or(ts, |n| n.max(ts)));
            if ts < stale_before {
                health.stale += 1;
            }
        }

        if let (Some(oldest), Some(newest)) = (health.oldest_ms, health.newest_ms) {
            health.max_gap_ms = newest - oldest;
        }
        health
    }
}

/// Scheduler status published after every tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerDiagnostics {
    pub running: bool,
    /// Enabled items that compiled
    pub active_items: usize,
    /// All configured items
    pub total_items: usize,
    pub time_budget_ms: u64,
    pub items_skipped_last_tick: usize,
    pub last_tick_duration_ms: f64,
    pub ticks: u64,
    pub generation: u64,
    pub subscribed: usize,
    pub timestamps: TimestampHealth,
    /// Keyed by output id
    pub items: BTreeMap<String, ItemDiagnostics>,
}

/// Shared read access to the latest diagnostics
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsHandle {
    inner: Arc<RwLock<SchedulerDiagnostics>>,
}

impl DiagnosticsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current diagnostics
    pub fn snapshot(&self) -> SchedulerDiagnostics {
        self.inner.read().clone()
    }

    pub fn item(&self, output_id: &str) -> Option<ItemDiagnostics> {
        self.inner.read().items.get(output_id).cloned()
    }

    pub fn is_running(&self) -> bool {
        self.inner.read().running
    }

    pub(crate) fn publish(&self, diagnostics: SchedulerDiagnostics) {
        *self.inner.write() = diagnostics;
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.inner.write().running = running;
    }
}
