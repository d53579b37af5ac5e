//! calcsrv - computed-item calculation service
//!
//! Loads item configuration, evaluates every item on a fixed cadence and
//! publishes the results. Values live in an in-memory cache seeded from the
//! configuration; published outputs are mirrored back into it so items can
//! build on each other.

mod config;
mod logging;
mod shutdown;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use voltage_rtdb::{CacheSink, MemorySubscriber, ValueCache};
use voltage_rules::CalcScheduler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive, overrides the configuration
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Run a single tick, print diagnostics as JSON and exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config.normalized())?);
        return Ok(());
    }

    let _log_guard = logging::init_logging(&config.log_level)?;
    info!(
        "Starting calcsrv: {} item(s) from {}",
        config.items.len(),
        args.config.display()
    );

    let cache = ValueCache::new();
    let seeded = config::seed_cache(&config, &cache);
    if seeded > 0 {
        info!("Seeded {} value(s) into the cache", seeded);
    }

    let sink = Arc::new(CacheSink::new(cache.clone()));
    let subscriber = Arc::new(MemorySubscriber::new());

    let mut scheduler = CalcScheduler::new(config, cache, subscriber, sink);

    if args.once {
        let report = scheduler.tick().await;
        info!(
            "Single tick: {} evaluated, {} failed, {} skipped",
            report.evaluated,
            report.failed,
            report.skipped.len()
        );
        let diagnostics = scheduler.diagnostics_handle().snapshot();
        println!(
            "{}",
            serde_json::to_string_pretty(&diagnostics).context("Failed to encode diagnostics")?
        );
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    shutdown::spawn_shutdown_listener(shutdown.clone());
    shutdown::spawn_reload_on_hangup(args.config, scheduler.items_handle(), shutdown.clone());

    scheduler.run(shutdown).await;

    info!("calcsrv stopped");
    Ok(())
}
