//! One-shot formula compilation: normalize, length check, parse, guard
//!
//! Depth limits above [`MAX_TREE_DEPTH`] are capped at that ceiling.

use crate::ast::Expr;
use crate::error::{CalcError, Result};
use crate::guard::{check_complexity, ComplexityLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES};
use crate::normalize::normalize;
use crate::parser::{parse_bounded, MAX_TREE_DEPTH};
use serde::{Deserialize, Serialize};

/// Default formula length ceiling in characters
pub const DEFAULT_MAX_FORMULA_LENGTH: usize = 8000;

/// Ceilings applied to every compiled expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionLimits {
    pub max_nodes: usize,
    pub max_depth: usize,
    pub max_formula_length: usize,
}

impl Default for ExpressionLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_formula_length: DEFAULT_MAX_FORMULA_LENGTH,
        }
    }
}

impl ExpressionLimits {
    pub fn complexity(&self) -> ComplexityLimits {
        ComplexityLimits {
            max_nodes: self.max_nodes,
            max_depth: self.max_depth,
        }
    }
}

/// Compile formula text into a guarded expression tree
pub fn compile(source: &str, limits: &ExpressionLimits) -> Result<Expr> {
    let normalized = normalize(source);
    let len = normalized.chars().count();
    if len > limits.max_formula_length {
        return Err(CalcError::TooLong {
            len,
            max: limits.max_formula_length,
        });
    }

    let expr = parse_bounded(&normalized, limits.max_depth)?;
    check_complexity(&expr, &limits.complexity())?;
    Ok(expr)
}
