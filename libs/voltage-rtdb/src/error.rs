//! Error types for voltage-rtdb

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtdbError {
    #[error("Read failed for {id}: {reason}")]
    ReadFailed { id: String, reason: String },

    #[error("Write failed for {id}: {reason}")]
    WriteFailed { id: String, reason: String },

    #[error("Subscription failed for {id}: {reason}")]
    SubscribeFailed { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RtdbError>;
