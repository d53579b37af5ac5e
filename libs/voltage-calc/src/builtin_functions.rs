//! Built-in numeric functions for expression evaluation
//!
//! All functions take already-coerced numbers. NaN propagates through
//! `min`/`max`/`clamp` instead of being silently dropped.

use crate::error::EvalError;

/// State accessors whose first argument names an external id
pub const ACCESSOR_FUNCTIONS: [&str; 3] = ["s", "v", "jp"];

/// Dispatch a numeric built-in by name
pub fn call_numeric(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let exact = |n: usize| -> Result<(), EvalError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(EvalError::arity(name, n.to_string(), args.len()))
        }
    };

    match name {
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, max)),
        "clamp" => {
            exact(3)?;
            Ok(clamp(args[0], args[1], args[2]))
        },
        "abs" => {
            exact(1)?;
            Ok(abs(args[0]))
        },
        "round" => match args {
            [value] => Ok(round(*value, 0)),
            [value, decimals] => Ok(round(*value, *decimals as i32)),
            _ => Err(EvalError::arity(name, "1 or 2", args.len())),
        },
        "floor" => {
            exact(1)?;
            Ok(args[0].floor())
        },
        "ceil" => {
            exact(1)?;
            Ok(args[0].ceil())
        },
        "sign" => {
            exact(1)?;
            Ok(sign(args[0]))
        },
        "scale" => {
            exact(2)?;
            Ok(scale(args[0], args[1]))
        },
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

/// Scale a value by a factor
pub fn scale(value: f64, factor: f64) -> f64 {
    value * factor
}

/// Clamp a value to `[lo, hi]`; never panics on inverted or NaN bounds
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    min(max(value, lo), hi)
}

/// Absolute value
pub fn abs(value: f64) -> f64 {
    value.abs()
}

/// Minimum of two values, NaN if either is NaN
pub fn min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

/// Maximum of two values, NaN if either is NaN
pub fn max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Round to specified decimal places
pub fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Sign function: returns -1, 0, or 1
pub fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        value
    }
}
