//! Integration tests for the calculation scheduler
//!
//! Covers error policy, snapshot consistency, compile caching, time budget,
//! subscription reconciliation and item-list reloads.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use voltage_model::{InputConfig, ItemConfig, ItemType, RuleConfig, Value};
use voltage_rtdb::{MemorySink, MemorySource, MemorySubscriber, ValueCache};
use voltage_rules::{CalcConfig, CalcScheduler, SnapshotConfig};

struct Harness {
    scheduler: CalcScheduler,
    cache: ValueCache,
    sink: Arc<MemorySink>,
    subscriber: Arc<MemorySubscriber>,
}

fn harness_with(config: CalcConfig, sink: MemorySink) -> Harness {
    let cache = ValueCache::new();
    let sink = Arc::new(sink);
    let subscriber = Arc::new(MemorySubscriber::new());
    let scheduler = CalcScheduler::new(config, cache.clone(), subscriber.clone(), sink.clone());
    Harness {
        scheduler,
        cache,
        sink,
        subscriber,
    }
}

fn harness(items: Vec<ItemConfig>) -> Harness {
    harness_with(
        CalcConfig {
            items,
            ..CalcConfig::default()
        },
        MemorySink::new(),
    )
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn shaping_clips_negative_and_clamps() {
    let mut item = ItemConfig::formula("calc", "soc", "raw", vec![InputConfig::new("raw", "bms.soc")]);
    item.no_negative = true;
    item.clamp = true;
    item.min = Some(0.0);
    item.max = Some(100.0);
    let mut h = harness(vec![item]);

    h.cache.set("bms.soc", Value::Number(-5.0));
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.soc"), Some(Value::Number(0.0)));

    h.cache.set("bms.soc", Value::Number(150.0));
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.soc"), Some(Value::Number(100.0)));
}

#[tokio::test]
async fn retry_policy_holds_last_good_then_zeroes() {
    let mut h = harness(vec![ItemConfig::formula(
        "calc",
        "ratio",
        "s('x') / s('y')",
        Vec::new(),
    )]);
    h.cache.set("x", Value::Number(1.0));
    h.cache.set("y", Value::Number(1.0));
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.ratio"), Some(Value::Number(1.0)));

    h.cache.set("y", Value::Number(0.0));
    for _ in 0..3 {
        let report = h.scheduler.tick().await;
        assert_eq!(report.failed, 1);
        assert_eq!(h.sink.last("calc.ratio"), Some(Value::Number(1.0)));
    }

    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.ratio"), Some(Value::Number(0.0)));

    let diag = h.scheduler.diagnostics_handle().item("calc.ratio").unwrap();
    assert_eq!(diag.consecutive_errors, 4);
    assert!(diag.last_error.is_some());

    h.cache.set("y", Value::Number(2.0));
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.ratio"), Some(Value::Number(0.5)));
    let diag = h.scheduler.diagnostics_handle().item("calc.ratio").unwrap();
    assert_eq!(diag.consecutive_errors, 0);
    assert!(diag.last_error.is_none());
    assert!(diag.last_ok_timestamp.is_some());
}

#[tokio::test]
async fn zero_value_follows_declared_type() {
    let item = ItemConfig::state_machine(
        "calc",
        "mode",
        ItemType::String,
        Vec::new(),
        vec![
            RuleConfig::new("s('x') / s('y') > 1", serde_json::json!("high")),
            RuleConfig::new("", serde_json::json!("low")),
        ],
    );
    let mut source = ItemConfig::source("calc", "raw", "missing.id");
    source.item_type = ItemType::Boolean;
    let config = CalcConfig {
        error_retry_threshold: 0,
        items: vec![item, source],
        ..CalcConfig::default()
    };
    let mut h = harness_with(config, MemorySink::new());

    // rule failures fall through to the default rule instead of failing the item
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.mode"), Some(Value::from("low")));
    assert_eq!(h.sink.last("calc.raw"), Some(Value::Bool(false)));
}

#[tokio::test]
async fn snapshot_is_consistent_across_items() {
    let mut h = harness(vec![
        ItemConfig::formula("calc", "first", "x", vec![InputConfig::new("x", "shared")]),
        ItemConfig::formula("calc", "second", "x", vec![InputConfig::new("x", "shared")]),
    ]);
    h.cache.set("shared", Value::Number(10.0));

    // An external push lands between the two item writes
    let pushed = h.cache.clone();
    h.sink.on_write(move |id, _| {
        if id == "calc.first" {
            pushed.set("shared", Value::Number(99.0));
        }
    });

    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.first"), Some(Value::Number(10.0)));
    assert_eq!(h.sink.last("calc.second"), Some(Value::Number(10.0)));

    // The push is visible from the next tick on
    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.first"), Some(Value::Number(99.0)));
}

#[tokio::test]
async fn unchanged_config_is_not_recompiled() {
    let mut h = harness(vec![
        ItemConfig::formula("calc", "a", "p * 2", vec![InputConfig::new("p", "inv.p")]),
        ItemConfig::formula("calc", "b", "s('meter.p') + 1", Vec::new()),
    ]);

    let first = h.scheduler.tick().await;
    assert!(first.recompiled);
    let count = h.scheduler.compiler().compile_count();
    let compiled_at = h.scheduler.compiler().items()[0].compiled_at_ms;

    for _ in 0..3 {
        assert!(!h.scheduler.tick().await.recompiled);
    }
    assert_eq!(h.scheduler.compiler().compile_count(), count);
    assert_eq!(h.scheduler.compiler().generation(), 1);
    assert_eq!(h.scheduler.compiler().items()[0].compiled_at_ms, compiled_at);
}

#[tokio::test(start_paused = true)]
async fn time_budget_skips_the_tail() {
    let items = (0..6)
        .map(|i| ItemConfig::formula("calc", &format!("item{}", i), &format!("{}", i), Vec::new()))
        .collect();
    let config = CalcConfig {
        poll_interval_ms: 100,
        items,
        ..CalcConfig::default()
    };
    let sink = MemorySink::new().with_write_delay(Duration::from_millis(30));
    let mut h = harness_with(config, sink);

    // 80ms budget, 30ms per write: items 0..=2 fit, 3..=5 are skipped
    let report = h.scheduler.tick().await;
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.skipped, ids(&["calc.item3", "calc.item4", "calc.item5"]));
    assert_eq!(
        h.scheduler.diagnostics_handle().snapshot().items_skipped_last_tick,
        3
    );

    // The next tick starts again from the top of the list
    let report = h.scheduler.tick().await;
    assert_eq!(report.evaluated, 3);
    assert_eq!(h.sink.writes_for("calc.item0").len(), 2);
    assert!(h.sink.writes_for("calc.item5").is_empty());
}

#[tokio::test]
async fn subscriptions_follow_item_changes() {
    let mut h = harness(vec![
        ItemConfig::source("calc", "a", "dev.a"),
        ItemConfig::formula("calc", "b", "s('dev.b') + v('dev.c')", Vec::new()),
    ]);

    h.scheduler.tick().await;
    assert_eq!(h.subscriber.subscribed(), ids(&["dev.a", "dev.b", "dev.c"]));

    h.scheduler
        .items_handle()
        .replace(vec![ItemConfig::source("calc", "a", "dev.d")]);
    let report = h.scheduler.tick().await;

    assert!(report.recompiled);
    assert_eq!(h.subscriber.subscribed(), ids(&["dev.d"]));
    assert_eq!(h.scheduler.diagnostics_handle().snapshot().subscribed, 1);
}

#[tokio::test]
async fn reloaded_items_take_effect_next_tick() {
    let mut h = harness(vec![ItemConfig::formula("calc", "x", "1", Vec::new())]);
    let handle = h.scheduler.items_handle();

    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.x"), Some(Value::Number(1.0)));

    handle.replace(vec![
        ItemConfig::formula("calc", "x", "2", Vec::new()),
        ItemConfig::formula("calc", "y", "3", Vec::new()),
    ]);
    h.scheduler.tick().await;

    assert_eq!(h.sink.last("calc.x"), Some(Value::Number(2.0)));
    assert_eq!(h.sink.last("calc.y"), Some(Value::Number(3.0)));
    assert_eq!(h.sink.registered(), ids(&["calc.x", "calc.y"]));
    assert_eq!(h.scheduler.compiler().generation(), 2);
}

#[tokio::test]
async fn write_failures_do_not_touch_retry_counter() {
    let sink = MemorySink::new();
    sink.fail_writes_for("calc.x");
    let mut h = harness_with(
        CalcConfig {
            items: vec![ItemConfig::formula("calc", "x", "1", Vec::new())],
            ..CalcConfig::default()
        },
        sink,
    );

    let report = h.scheduler.tick().await;
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.write_failures, 1);

    let diag = h.scheduler.diagnostics_handle().item("calc.x").unwrap();
    assert_eq!(diag.consecutive_errors, 0);
    assert!(diag.last_error.unwrap().contains("write failed"));
}

#[tokio::test]
async fn outputs_can_chain_through_the_cache() {
    let cache_for_sink = ValueCache::new();
    let sink = MemorySink::new().with_mirror(cache_for_sink.clone());
    let subscriber = Arc::new(MemorySubscriber::new());
    let config = CalcConfig {
        items: vec![
            ItemConfig::formula("calc", "base", "20", Vec::new()),
            ItemConfig::formula("calc", "derived", "s('calc.base') + 1", Vec::new()),
        ],
        ..CalcConfig::default()
    };
    let sink = Arc::new(sink);
    let mut scheduler = CalcScheduler::new(config, cache_for_sink, subscriber, sink.clone());

    // the snapshot is taken before `base` is written
    scheduler.tick().await;
    assert_eq!(sink.last("calc.derived"), Some(Value::Number(1.0)));

    scheduler.tick().await;
    assert_eq!(sink.last("calc.derived"), Some(Value::Number(21.0)));
}

#[tokio::test]
async fn fresh_reads_refresh_the_snapshot() {
    let source = Arc::new(MemorySource::new());
    source.set("meter.p", Value::Number(7.0));
    let config = CalcConfig {
        snapshot: SnapshotConfig {
            refresh_before_read: true,
            ..SnapshotConfig::default()
        },
        items: vec![ItemConfig::source("calc", "p", "meter.p")],
        ..CalcConfig::default()
    };
    let mut h = harness_with(config, MemorySink::new());
    h.scheduler = h.scheduler.with_reader(source.clone());

    h.scheduler.tick().await;
    assert_eq!(h.sink.last("calc.p"), Some(Value::Number(7.0)));
    assert_eq!(h.cache.get("meter.p"), Some(Value::Number(7.0)));
    assert_eq!(source.read_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_cancellation() {
    let mut h = harness(vec![ItemConfig::formula("calc", "x", "1", Vec::new())]);
    let diagnostics = h.scheduler.diagnostics_handle();
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        h.scheduler.run(token).await;
        h
    });

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(diagnostics.is_running());
    shutdown.cancel();

    let h = task.await.unwrap();
    let diag = diagnostics.snapshot();
    assert!(!diag.running);
    assert!(diag.ticks >= 2);
    assert!(!h.sink.writes_for("calc.x").is_empty());
}
