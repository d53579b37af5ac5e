//! Calculation runtime error types

use thiserror::Error;
use voltage_calc::{CalcError, EvalError, GuardError, ParseError};
use voltage_model::{ItemType, ModelError};

/// Why an item could not be compiled
///
/// Permanent until the configuration changes. Stored on the item and
/// published as diagnostics, never raised into the tick loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    // ---- configuration class ----
    #[error("Invalid output id '{id}': {reason}")]
    InvalidOutputId { id: String, reason: String },

    #[error("Duplicate output id '{0}'")]
    DuplicateOutputId(String),

    #[error("Invalid input key '{key}': {reason}")]
    InvalidInputKey { key: String, reason: String },

    #[error("Source mode requires a sourceState")]
    MissingSourceState,

    #[error("State machine requires at least one rule")]
    NoRules,

    #[error("Rule {index} value must be {expected}, got {got}")]
    RuleValueType {
        index: usize,
        expected: ItemType,
        got: String,
    },

    // ---- compile class ----
    #[error("Formula too long: {len} characters (maximum {max})")]
    FormulaTooLong { len: usize, max: usize },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Complexity(#[from] GuardError),

    #[error("Rule {index}: {source}")]
    Rule {
        index: usize,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Configuration problems, as opposed to formula text problems
    pub fn is_config_error(&self) -> bool {
        match self {
            CompileError::InvalidOutputId { .. }
            | CompileError::DuplicateOutputId(_)
            | CompileError::InvalidInputKey { .. }
            | CompileError::MissingSourceState
            | CompileError::NoRules
            | CompileError::RuleValueType { .. } => true,
            CompileError::Rule { source, .. } => source.is_config_error(),
            _ => false,
        }
    }

    pub(crate) fn in_rule(self, index: usize) -> Self {
        CompileError::Rule {
            index,
            source: Box::new(self),
        }
    }
}

impl From<CalcError> for CompileError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::TooLong { len, max } => CompileError::FormulaTooLong { len, max },
            CalcError::Parse(e) => CompileError::Parse(e),
            CalcError::Complexity(e) => CompileError::Complexity(e),
            CalcError::Eval(e) => CompileError::Parse(ParseError::new(e.to_string(), 0)),
        }
    }
}

impl From<ModelError> for CompileError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::InvalidOutputId { id, reason } => CompileError::InvalidOutputId { id, reason },
            ModelError::InvalidInputKey { key, reason } => CompileError::InvalidInputKey { key, reason },
        }
    }
}

/// Transient failure while evaluating one item in one tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("No value for '{0}'")]
    MissingValue(String),

    #[error("Result is not a finite number: {0}")]
    NotFinite(String),
}

/// Result type for compilation
pub type Result<T> = std::result::Result<T, CompileError>;
