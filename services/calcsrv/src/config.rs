//! calcsrv configuration loading
//!
//! A YAML file merged with `CALCSRV_`-prefixed environment variables.
//! Nested keys use a double underscore, e.g.
//! `CALCSRV_SNAPSHOT__SETTLE_DELAY_MS=200`.

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use std::path::Path;
use voltage_model::Value;
use voltage_rtdb::ValueCache;
use voltage_rules::CalcConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CALCSRV_";

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/calcsrv.yaml";

fn figment(path: &Path, env_prefix: &str) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(env_prefix).split("__"))
}

/// Load the configuration file at `path`
pub fn load(path: &Path) -> Result<CalcConfig> {
    load_with_prefix(path, ENV_PREFIX)
}

fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<CalcConfig> {
    if !path.exists() {
        bail!("Configuration file {} not found", path.display());
    }

    figment(path, env_prefix)
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Write the configured seed values into `cache`, returning how many
pub fn seed_cache(config: &CalcConfig, cache: &ValueCache) -> usize {
    for (id, value) in &config.seed {
        cache.set(id, Value::from_json(value.clone()));
    }
    config.seed.len()
}
