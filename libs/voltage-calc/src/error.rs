//! Error types for voltage-calc

use thiserror::Error;

/// Formula text could not be turned into an expression tree
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    /// Human readable description naming the offending construct
    pub message: String,
    /// Character offset into the normalized expression
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Expression tree exceeds the configured complexity ceilings
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardError {
    #[error("Expression too complex: more than {limit} nodes")]
    TooManyNodes { limit: usize },

    #[error("Expression nested too deeply: depth exceeds {limit}")]
    TooDeep { limit: usize },
}

/// Runtime failure inside the sandboxed evaluator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Non-finite result: {0}")]
    NonFinite(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl EvalError {
    pub fn arity(name: &str, expected: impl Into<String>, got: usize) -> Self {
        Self::Arity {
            name: name.to_string(),
            expected: expected.into(),
            got,
        }
    }

    pub fn non_finite(msg: impl Into<String>) -> Self {
        Self::NonFinite(msg.into())
    }
}

/// Calculation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("Formula too long: {len} characters (maximum {max})")]
    TooLong { len: usize, max: usize },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Complexity(#[from] GuardError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, CalcError>;
