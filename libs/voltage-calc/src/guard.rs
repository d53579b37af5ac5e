//! Complexity guard
//!
//! Walks a parsed tree once at compile time and rejects trees with too many
//! nodes or too much nesting. The walk uses an explicit stack so the check
//! itself cannot exhaust the call stack.

use crate::ast::Expr;
use crate::error::GuardError;
use serde::{Deserialize, Serialize};

/// Default node ceiling
pub const DEFAULT_MAX_NODES: usize = 2000;

/// Default depth ceiling
pub const DEFAULT_MAX_DEPTH: usize = 60;

/// Complexity ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityLimits {
    pub max_nodes: usize,
    pub max_depth: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Size of a tree as measured by the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Complexity {
    pub nodes: usize,
    pub depth: usize,
}

/// Check `expr` against `limits`, returning its measured size
pub fn check_complexity(expr: &Expr, limits: &ComplexityLimits) -> Result<Complexity, GuardError> {
    let mut stack: Vec<(&Expr, usize)> = vec![(expr, 1)];
    let mut nodes = 0;
    let mut max_depth = 0;

    while let Some((node, depth)) = stack.pop() {
        nodes += 1;
        if nodes > limits.max_nodes {
            return Err(GuardError::TooManyNodes {
                limit: limits.max_nodes,
            });
        }
        if depth > limits.max_depth {
            return Err(GuardError::TooDeep {
                limit: limits.max_depth,
            });
        }
        max_depth = max_depth.max(depth);
        stack.extend(node.children().into_iter().map(|child| (child, depth + 1)));
    }

    Ok(Complexity {
        nodes,
        depth: max_depth,
    })
}
