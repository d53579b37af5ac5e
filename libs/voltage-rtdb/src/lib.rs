//! VoltageEMS Realtime Value Store
//!
//! Collaborator layer of the calculation runtime.
//!
//! # Key Components
//!
//! - **ValueCache**: live `id -> value` map with write timestamps
//! - **SourceReader / Subscriber / OutputSink**: async traits for fresh
//!   reads, push subscriptions and output publishing
//! - **CacheSink**: bounded sink publishing into the cache, used by the
//!   service binary
//! - **Memory implementations**: DashMap-backed recorders used by tests
//! - **TimeProvider**: clock abstraction stamping cache writes

pub mod cache;

pub mod error;

pub mod memory_impl;

pub mod time;

pub mod traits;

// Re-exports
pub use cache::ValueCache;
pub use error::RtdbError;
pub use memory_impl::{CacheSink, MemorySink, MemorySource, MemorySubscriber, SubscriptionCall, WriteRecord};
pub use time::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
pub use traits::{OutputSink, SourceReader, Subscriber};
