//! Scheduler configuration
//!
//! All policy numbers default sensibly and are clamped into range by
//! [`CalcConfig::normalized`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;
use voltage_calc::{ExpressionLimits, MAX_TREE_DEPTH};
use voltage_model::ItemConfig;

/// Smallest accepted poll interval
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Hard ceiling for the global subscription set
pub const MAX_TOTAL_SOURCES_CEILING: usize = 50_000;

/// Longest accepted snapshot settle delay
pub const MAX_SETTLE_DELAY_MS: u64 = 5_000;

/// Snapshot behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Force fresh reads of every source before snapshotting
    pub refresh_before_read: bool,
    /// Wait this long before the fresh reads (0..=5000)
    pub settle_delay_ms: u64,
    /// Parallel fresh reads in flight
    pub read_concurrency: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            refresh_before_read: false,
            settle_delay_ms: 0,
            read_concurrency: 8,
        }
    }
}

/// Calculation runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    pub poll_interval_ms: u64,
    /// Share of the interval available for item evaluation
    pub time_budget_ratio: f64,
    /// Failures tolerated before publishing the zero value
    pub error_retry_threshold: u32,
    pub max_sources_per_item: usize,
    pub max_total_sources: usize,
    pub snapshot: SnapshotConfig,
    pub limits: ExpressionLimits,
    pub log_level: String,
    pub items: Vec<ItemConfig>,
    /// Initial cache contents (`id -> value`)
    pub seed: BTreeMap<String, serde_json::Value>,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            time_budget_ratio: 0.8,
            error_retry_threshold: 3,
            max_sources_per_item: 200,
            max_total_sources: 5000,
            snapshot: SnapshotConfig::default(),
            limits: ExpressionLimits::default(),
            log_level: "info".to_string(),
            items: Vec::new(),
            seed: BTreeMap::new(),
        }
    }
}

impl CalcConfig {
    /// Clamp every policy number into its valid range, warning on each fix
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            warn!(
                "poll_interval_ms {} below minimum, using {}",
                self.poll_interval_ms, MIN_POLL_INTERVAL_MS
            );
            self.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }

        if !self.time_budget_ratio.is_finite() {
            warn!(
                "time_budget_ratio {} invalid, using {}",
                self.time_budget_ratio, defaults.time_budget_ratio
            );
            self.time_budget_ratio = defaults.time_budget_ratio;
        } else if !(0.1..=1.0).contains(&self.time_budget_ratio) {
            let clamped = self.time_budget_ratio.clamp(0.1, 1.0);
            warn!(
                "time_budget_ratio {} out of range, using {}",
                self.time_budget_ratio, clamped
            );
            self.time_budget_ratio = clamped;
        }

        if self.max_sources_per_item == 0 {
            warn!(
                "max_sources_per_item must be positive, using {}",
                defaults.max_sources_per_item
            );
            self.max_sources_per_item = defaults.max_sources_per_item;
        }

        if self.max_total_sources == 0 {
            warn!(
                "max_total_sources must be positive, using {}",
                defaults.max_total_sources
            );
            self.max_total_sources = defaults.max_total_sources;
        } else if self.max_total_sources > MAX_TOTAL_SOURCES_CEILING {
            warn!(
                "max_total_sources {} above ceiling, using {}",
                self.max_total_sources, MAX_TOTAL_SOURCES_CEILING
            );
            self.max_total_sources = MAX_TOTAL_SOURCES_CEILING;
        }

        if self.snapshot.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            warn!(
                "snapshot.settle_delay_ms {} above maximum, using {}",
                self.snapshot.settle_delay_ms, MAX_SETTLE_DELAY_MS
            );
            self.snapshot.settle_delay_ms = MAX_SETTLE_DELAY_MS;
        }

        if self.snapshot.read_concurrency == 0 {
            warn!("snapshot.read_concurrency must be positive, using 1");
            self.snapshot.read_concurrency = 1;
        }

        if self.limits.max_nodes == 0 || self.limits.max_depth == 0 {
            warn!("expression limits must be positive, using defaults");
            self.limits.max_nodes = defaults.limits.max_nodes;
            self.limits.max_depth = defaults.limits.max_depth;
        }

        if self.limits.max_depth > MAX_TREE_DEPTH {
            warn!(
                "limits.max_depth {} above ceiling, using {}",
                self.limits.max_depth, MAX_TREE_DEPTH
            );
            self.limits.max_depth = MAX_TREE_DEPTH;
        }

        if self.limits.max_formula_length == 0 {
            warn!("limits.max_formula_length must be positive, using default");
            self.limits.max_formula_length = defaults.limits.max_formula_length;
        }

        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Evaluation time budget per tick
    pub fn time_budget(&self) -> Duration {
        self.poll_interval().mul_f64(self.time_budget_ratio)
    }
}
