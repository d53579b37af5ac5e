//! voltage-calc - Sandboxed expression language for VoltageEMS calculations
//!
//! Formulas are compiled once into a guarded [`Expr`] tree and evaluated
//! every tick against a variable map plus an [`Environment`] that serves the
//! state accessors.
//!
//! # Example
//!
//! ```rust
//! use voltage_calc::{compile, evaluate, ExpressionLimits, Variables};
//! use voltage_model::Value;
//! use std::collections::HashMap;
//!
//! let expr = compile("clamp(P * efficiency, 0, 500) + s('meter.aux')", &ExpressionLimits::default()).unwrap();
//!
//! let mut vars = Variables::new();
//! vars.insert("P".to_string(), Value::Number(1000.0));
//! vars.insert("efficiency".to_string(), Value::Number(0.95));
//!
//! let mut states = HashMap::new();
//! states.insert("meter.aux".to_string(), Value::from("12"));
//!
//! assert_eq!(evaluate(&expr, &vars, &states).unwrap(), Value::Number(512.0));
//! ```
//!
//! # Built-in Functions
//!
//! | Function | Signature | Description |
//! |----------|-----------|-------------|
//! | `min` / `max` | `min(a, b, ...)` | Variadic, NaN if any argument is NaN |
//! | `clamp` | `clamp(value, lo, hi)` | Limit to range |
//! | `IF` | `IF(cond, a, b)` | Only the selected branch is evaluated |
//! | `abs` | `abs(value)` | Absolute value |
//! | `round` | `round(value[, decimals])` | Round to decimals |
//! | `floor` / `ceil` | `floor(value)` | Integer rounding |
//! | `sign` | `sign(value)` | Sign: -1, 0, or 1 |
//! | `scale` | `scale(value, factor)` | Multiply by factor |
//! | `s` | `s('id')` | Numeric read, 0 when missing |
//! | `v` | `v('id')` | Primitive read, `undefined` for objects |
//! | `jp` | `jp('id', '$.path')` | JSON path projection of a read |

pub mod ast;
pub mod builtin_functions;
pub mod compile;
pub mod error;
pub mod evaluator;
pub mod guard;
pub mod jsonpath;
pub mod lexer;
pub mod normalize;
pub mod parser;

pub use ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
pub use builtin_functions::ACCESSOR_FUNCTIONS;
pub use compile::{compile, ExpressionLimits, DEFAULT_MAX_FORMULA_LENGTH};
pub use error::{CalcError, EvalError, GuardError, ParseError, Result};
pub use evaluator::{evaluate, EmptyEnvironment, Environment, Variables};
pub use guard::{check_complexity, Complexity, ComplexityLimits};
pub use jsonpath::{extract, JsonPath, PathSegment};
pub use normalize::normalize;
pub use parser::{parse, parse_bounded, MAX_TREE_DEPTH};

// Re-export stateless functions for direct use
pub use builtin_functions::{abs, clamp, max, min, round, scale, sign};
