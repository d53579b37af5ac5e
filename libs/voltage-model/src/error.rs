//! Model Layer Error Types

use thiserror::Error;

/// Result type for voltage-model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Model layer errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    /// Output id derived from group/targetId is empty or unsafe
    #[error("Invalid output id '{id}': {reason}")]
    InvalidOutputId { id: String, reason: String },

    /// Input key is empty or names a forbidden identifier
    #[error("Invalid input key '{key}': {reason}")]
    InvalidInputKey { key: String, reason: String },
}

impl ModelError {
    pub fn output_id(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOutputId {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn input_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInputKey {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
