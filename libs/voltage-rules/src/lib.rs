//! Voltage Rules - Computed Item Runtime
//!
//! Turns configured items (source mirrors, formulas and rule-based state
//! machines) into values published on a fixed cadence:
//! - Item compilation with a config-signature cache
//! - Source discovery and subscription reconciliation
//! - Per-tick snapshots so every item sees the same inputs
//! - Time-budgeted evaluation with a retry / zero-value error policy
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Scheduler   │────▶│   Compiler   │────▶│  Discovery   │
//! │ (interval)   │     │ (signature)  │     │ (subscribe)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Snapshot   │────▶│  Evaluation  │────▶│ Output sink  │
//! │ (per tick)   │     │  (shaping)   │     │ (write)      │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod evaluation;
pub mod log_once;
pub mod scheduler;
pub mod snapshot;
pub mod state_machine;
pub mod subscription;

// Re-export public API
pub use compiler::{config_signature, compile_item, Artifact, CompiledInput, CompiledItem, ItemCompiler};
pub use config::{CalcConfig, SnapshotConfig, MAX_SETTLE_DELAY_MS, MAX_TOTAL_SOURCES_CEILING, MIN_POLL_INTERVAL_MS};
pub use diagnostics::{
    DiagnosticsHandle, ItemDiagnostics, SchedulerDiagnostics, TimestampHealth, STALE_AFTER_INTERVALS,
};
pub use discovery::ast_accessor_ids;
pub use error::{CompileError, ItemError, Result};
pub use evaluation::{bind_inputs, cast_bool, evaluate_item, shape_output, Evaluation};
pub use log_once::LogOnce;
pub use scheduler::{CalcScheduler, ItemsHandle, TickReport};
pub use snapshot::{build_snapshot, CacheView, Snapshot, SnapshotEntry, StateView};
pub use state_machine::{compile_rules, evaluate_rules, no_match_value, CompiledRule, RuleOutcome};
pub use subscription::{SubscriptionSync, SyncReport};
