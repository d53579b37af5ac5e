//! Collaborator interfaces consumed by the calculation runtime
//!
//! All operations are fallible and async; failures are reported as
//! `anyhow::Error` and treated as best-effort IO errors by callers.

use anyhow::Result;
use async_trait::async_trait;
use voltage_model::{ItemConfig, Value};

/// Fresh reads from the authoritative state store
#[async_trait]
pub trait SourceReader: Send + Sync + 'static {
    /// Read the current value of `id`, `None` when it does not exist
    async fn read(&self, id: &str) -> Result<Option<Value>>;
}

/// Push-subscription primitive of the state store
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn subscribe(&self, id: &str) -> Result<()>;

    async fn unsubscribe(&self, id: &str) -> Result<()>;
}

/// Persisted output-value sink
#[async_trait]
pub trait OutputSink: Send + Sync + 'static {
    /// Publish a value; `computed` marks values produced by the engine
    async fn write(&self, id: &str, value: &Value, computed: bool) -> Result<()>;

    /// Register object metadata for an output id
    ///
    /// Must be idempotent. The default does nothing.
    async fn ensure_object(&self, _id: &str, _item: &ItemConfig) -> Result<()> {
        Ok(())
    }
}
