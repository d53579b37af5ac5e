//! Calculation Scheduler - periodic evaluation of all configured items
//!
//! One tick runs, strictly in order:
//! - ensure-compiled (recompile only when the item list changed)
//! - subscription sync and output registration
//! - snapshot of every discovered source
//! - evaluate each compiled item within the time budget, applying the
//!   retry / zero-value error policy
//! - publish diagnostics
//!
//! Ticks never overlap: [`CalcScheduler::run`] aligns to the next multiple of
//! the poll interval only after the previous tick has finished.

use crate::compiler::{CompiledItem, ItemCompiler};
use crate::config::CalcConfig;
use crate::diagnostics::{DiagnosticsHandle, ItemDiagnostics, SchedulerDiagnostics, TimestampHealth};
use crate::evaluation::{evaluate_item, shape_output};
use crate::log_once::LogOnce;
use crate::snapshot::{build_snapshot, StateView};
use crate::subscription::SubscriptionSync;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voltage_model::{ItemConfig, Value};
use voltage_rtdb::{OutputSink, SourceReader, Subscriber, ValueCache};

/// Replaceable item list shared with configuration reloaders
#[derive(Debug, Clone, Default)]
pub struct ItemsHandle {
    inner: Arc<RwLock<Arc<Vec<ItemConfig>>>>,
}

impl ItemsHandle {
    pub fn new(items: Vec<ItemConfig>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(items))),
        }
    }

    /// Swap in a new item list; picked up by the next tick
    pub fn replace(&self, items: Vec<ItemConfig>) {
        *self.inner.write() = Arc::new(items);
    }

    pub fn current(&self) -> Arc<Vec<ItemConfig>> {
        self.inner.read().clone()
    }
}

/// Runtime state of one output across ticks
#[derive(Debug, Clone, Default)]
struct ItemState {
    last_good: Option<Value>,
    last_ok_timestamp: Option<i64>,
    consecutive_errors: u32,
    last_error: Option<String>,
    last_eval_duration_ms: Option<f64>,
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Items the tick got to, successful or not
    pub evaluated: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items left out because the time budget ran out, in list order
    pub skipped: Vec<String>,
    pub written: usize,
    pub write_failures: usize,
    pub recompiled: bool,
    pub duration: Duration,
}

/// Calculation Scheduler
pub struct CalcScheduler {
    config: CalcConfig,
    cache: ValueCache,
    subscriber: Arc<dyn Subscriber>,
    sink: Arc<dyn OutputSink>,
    reader: Option<Arc<dyn SourceReader>>,
    items: ItemsHandle,
    compiler: ItemCompiler,
    subscriptions: SubscriptionSync,
    /// Output ids already passed to `ensure_object`
    registered: FxHashSet<String>,
    states: FxHashMap<String, ItemState>,
    diagnostics: DiagnosticsHandle,
    log_once: LogOnce,
    ticks: u64,
}

impl CalcScheduler {
    /// Create a scheduler; the item list moves into an [`ItemsHandle`]
    pub fn new(
        config: CalcConfig,
        cache: ValueCache,
        subscriber: Arc<dyn Subscriber>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let mut config = config.normalized();
        let items = ItemsHandle::new(std::mem::take(&mut config.items));

        Self {
            compiler: ItemCompiler::new(&config),
            config,
            cache,
            subscriber,
            sink,
            reader: None,
            items,
            subscriptions: SubscriptionSync::new(),
            registered: FxHashSet::default(),
            states: FxHashMap::default(),
            diagnostics: DiagnosticsHandle::new(),
            log_once: LogOnce::new(),
            ticks: 0,
        }
    }

    /// Enable fresh reads for `snapshot.refresh_before_read`
    pub fn with_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn items_handle(&self) -> ItemsHandle {
        self.items.clone()
    }

    pub fn diagnostics_handle(&self) -> DiagnosticsHandle {
        self.diagnostics.clone()
    }

    pub fn config(&self) -> &CalcConfig {
        &self.config
    }

    pub fn compiler(&self) -> &ItemCompiler {
        &self.compiler
    }

    /// Run ticks aligned to the poll interval until `shutdown` fires
    ///
    /// Cancellation is observed while waiting; a tick in flight completes.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        let interval_ms = self.config.poll_interval_ms.max(1) as i64;

        self.diagnostics.set_running(true);
        info!(
            "Starting calculation scheduler: {} item(s), {}ms interval, {}ms budget",
            self.items.current().len(),
            interval_ms,
            self.config.time_budget().as_millis()
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let now = self.cache.now_millis();
            let wait = interval_ms - now.rem_euclid(interval_ms);

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Calculation scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_millis(wait as u64)) => {
                    self.tick().await;
                }
            }
        }

        self.diagnostics.set_running(false);
        info!("Calculation scheduler stopped after {} tick(s)", self.ticks);
    }

    /// Execute one tick
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let budget = self.config.time_budget();
        let mut report = TickReport::default();

        let items = self.items.current();
        report.recompiled = self
            .compiler
            .ensure_compiled(&items, self.cache.now_millis());
        if report.recompiled {
            let live: FxHashSet<&str> = self
                .compiler
                .items()
                .iter()
                .map(|c| c.output_id.as_str())
                .collect();
            self.states.retain(|id, _| live.contains(id.as_str()));
        }

        self.register_outputs().await;

        let desired = self.compiler.desired_sources();
        self.subscriptions
            .sync(desired, self.subscriber.as_ref(), &self.log_once)
            .await;

        let snapshot = build_snapshot(
            desired,
            &self.cache,
            self.reader.as_deref(),
            &self.config.snapshot,
            &self.log_once,
        )
        .await;

        let runnable: Vec<&CompiledItem> = self.compiler.items().iter().filter(|c| c.ok()).collect();
        let threshold = self.config.error_retry_threshold;

        for (position, item) in runnable.iter().enumerate() {
            if started.elapsed() > budget {
                report.skipped = runnable[position..]
                    .iter()
                    .map(|c| c.output_id.clone())
                    .collect();
                break;
            }

            let eval_started = Instant::now();
            let result = {
                let env = StateView::new(Some(&snapshot), &self.cache);
                evaluate_item(item, &env).and_then(|evaluation| {
                    for (index, err) in &evaluation.rule_failures {
                        let cause = format!("rule:{}:{}:{}", item.output_id, index, err);
                        if self.log_once.first(&cause) {
                            warn!("Item {} rule {} condition failed: {}", item.output_id, index, err);
                        }
                    }
                    shape_output(&item.config, evaluation.raw)
                })
            };
            let eval_ms = eval_started.elapsed().as_secs_f64() * 1000.0;

            let state = self.states.entry(item.output_id.clone()).or_default();
            state.last_eval_duration_ms = Some(eval_ms);
            report.evaluated += 1;

            let publish = match result {
                Ok(value) => {
                    if state.consecutive_errors > 0 {
                        info!(
                            "Item {} recovered after {} error(s)",
                            item.output_id, state.consecutive_errors
                        );
                    }
                    state.consecutive_errors = 0;
                    state.last_error = None;
                    state.last_good = Some(value.clone());
                    state.last_ok_timestamp = Some(self.cache.now_millis());
                    report.succeeded += 1;
                    Some(value)
                },
                Err(e) => {
                    state.consecutive_errors = state.consecutive_errors.saturating_add(1);
                    let cause = format!("eval:{}:{}", item.output_id, e);
                    if self.log_once.first(&cause) {
                        warn!(
                            "Item {} evaluation failed ({} consecutive): {}",
                            item.output_id, state.consecutive_errors, e
                        );
                    }
                    state.last_error = Some(e.to_string());
                    report.failed += 1;

                    if state.consecutive_errors <= threshold {
                        state.last_good.clone()
                    } else {
                        Some(item.item_type().zero_value())
                    }
                },
            };

            let Some(value) = publish else {
                continue;
            };
            match self.sink.write(&item.output_id, &value, true).await {
                Ok(()) => report.written += 1,
                Err(e) => {
                    let cause = format!("write:{}:{}", item.output_id, e);
                    if self.log_once.first(&cause) {
                        warn!("Writing {} failed: {}", item.output_id, e);
                    }
                    state.last_error = Some(format!("write failed: {}", e));
                    report.write_failures += 1;
                },
            }
        }

        if !report.skipped.is_empty() {
            warn!(
                "Time budget of {}ms exhausted, skipped {} item(s)",
                budget.as_millis(),
                report.skipped.len()
            );
        }

        self.ticks += 1;
        report.duration = started.elapsed();
        let timestamps = TimestampHealth::from_snapshot(&snapshot, self.config.poll_interval_ms);
        self.publish_diagnostics(&items, &report, timestamps);

        debug!(
            "Tick {}: {} evaluated, {} ok, {} failed, {} skipped, {} written in {:.1}ms",
            self.ticks,
            report.evaluated,
            report.succeeded,
            report.failed,
            report.skipped.len(),
            report.written,
            report.duration.as_secs_f64() * 1000.0
        );
        report
    }

    /// Register output metadata for compiled items not registered yet
    async fn register_outputs(&mut self) {
        for item in self.compiler.items().iter().filter(|c| c.ok()) {
            if self.registered.contains(&item.output_id) {
                continue;
            }
            match self.sink.ensure_object(&item.output_id, &item.config).await {
                Ok(()) => {
                    self.registered.insert(item.output_id.clone());
                },
                Err(e) => {
                    let cause = format!("object:{}:{}", item.output_id, e);
                    if self.log_once.first(&cause) {
                        warn!("Registering output {} failed: {}", item.output_id, e);
                    }
                },
            }
        }
    }

    fn publish_diagnostics(
        &self,
        items: &[ItemConfig],
        report: &TickReport,
        timestamps: TimestampHealth,
    ) {
        let compiled = self.compiler.items();
        let mut seen: FxHashMap<&str, usize> = FxHashMap::default();
        let per_item = compiled
            .iter()
            .map(|c| {
                // Repeated ids (duplicates, invalid labels) get `#n` keys so
                // they never shadow the first entry
                let count = seen.entry(c.output_id.as_str()).or_insert(0);
                *count += 1;
                let key = if *count == 1 {
                    c.output_id.clone()
                } else {
                    format!("{}#{}", c.output_id, count)
                };
                let state = if c.ok() {
                    self.states.get(&c.output_id).cloned().unwrap_or_default()
                } else {
                    ItemState::default()
                };
                (
                    key,
                    ItemDiagnostics {
                        compiled_ok: c.ok(),
                        compile_error: c.error().map(|e| e.to_string()),
                        error_class: c.error().map(|e| {
                            if e.is_config_error() {
                                "config"
                            } else {
                                "compile"
                            }
                        }),
                        last_error: state.last_error,
                        last_ok_timestamp: state.last_ok_timestamp,
                        last_eval_duration_ms: state.last_eval_duration_ms,
                        consecutive_errors: state.consecutive_errors,
                    },
                )
            })
            .collect();

        self.diagnostics.publish(SchedulerDiagnostics {
            running: self.diagnostics.is_running(),
            active_items: compiled.iter().filter(|c| c.ok()).count(),
            total_items: items.len(),
            time_budget_ms: self.config.time_budget().as_millis() as u64,
            items_skipped_last_tick: report.skipped.len(),
            last_tick_duration_ms: report.duration.as_secs_f64() * 1000.0,
            ticks: self.ticks,
            generation: self.compiler.generation(),
            subscribed: self.subscriptions.len(),
            timestamps,
            items: per_item,
        });
    }
}
