//! Sandboxed expression evaluator
//!
//! Walks an [`Expr`] against a variable map and an [`Environment`]. The
//! function table is closed: numeric built-ins, the lazy `IF`, and the three
//! state accessors `s`, `v` and `jp`. Nothing else is callable.

use crate::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::builtin_functions::call_numeric;
use crate::error::EvalError;
use crate::jsonpath;
use std::collections::HashMap;
use voltage_model::Value;

/// Formula variables bound from item inputs
pub type Variables = HashMap<String, Value>;

/// Source of external values for the state accessors
pub trait Environment {
    /// Raw value of an external id
    fn resolve(&self, id: &str) -> Option<Value>;

    /// Value of an external id projected through a JSON path
    fn project(&self, id: &str, path: &str) -> Option<Value> {
        let raw = self.resolve(id)?;
        jsonpath::extract(path, &raw)
    }
}

/// Environment with no external values
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyEnvironment;

impl Environment for EmptyEnvironment {
    fn resolve(&self, _id: &str) -> Option<Value> {
        None
    }
}

impl Environment for HashMap<String, Value> {
    fn resolve(&self, id: &str) -> Option<Value> {
        self.get(id).cloned()
    }
}

/// Evaluate `expr`
///
/// Identifiers missing from `vars` read as `0`.
///
/// # Example
/// ```
/// use voltage_calc::{compile, evaluate, EmptyEnvironment, ExpressionLimits, Variables};
/// use voltage_model::Value;
///
/// let expr = compile("IF(p > 10, p * 2, 0)", &ExpressionLimits::default()).unwrap();
/// let mut vars = Variables::new();
/// vars.insert("p".to_string(), Value::Number(21.0));
/// assert_eq!(evaluate(&expr, &vars, &EmptyEnvironment).unwrap(), Value::Number(42.0));
/// ```
pub fn evaluate(expr: &Expr, vars: &Variables, env: &dyn Environment) -> Result<Value, EvalError> {
    Evaluator { vars, env }.eval(expr)
}

struct Evaluator<'a> {
    vars: &'a Variables,
    env: &'a dyn Environment,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Identifier(name) => Ok(self
                .vars
                .get(name)
                .cloned()
                .unwrap_or(Value::Number(0.0))),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Minus => Value::Number(-value.to_number()),
                    UnaryOp::Not => Value::Bool(!value.is_truthy()),
                })
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            },
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match (op, left.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            },
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            },
            Expr::Call { callee, args } => self.call(callee, args),
        }
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match name {
            "IF" | "if" => {
                let [test, then, otherwise] = args else {
                    return Err(EvalError::arity(name, "3", args.len()));
                };
                if self.eval(test)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            },
            "s" => {
                let id = self.id_argument(name, args, 1)?;
                let n = self
                    .env
                    .resolve(&id)
                    .map(|v| v.to_number())
                    .filter(|n| !n.is_nan())
                    .unwrap_or(0.0);
                Ok(Value::Number(n))
            },
            "v" => {
                let id = self.id_argument(name, args, 1)?;
                Ok(self
                    .env
                    .resolve(&id)
                    .filter(Value::is_primitive)
                    .unwrap_or(Value::Undefined))
            },
            "jp" => {
                let id = self.id_argument(name, args, 2)?;
                let path = match self.eval(&args[1])? {
                    Value::String(path) => path,
                    other => {
                        return Err(EvalError::InvalidArgument(format!(
                            "jp() path must be a string, got {}",
                            other.type_name()
                        )))
                    },
                };
                Ok(self.env.project(&id, &path).unwrap_or(Value::Undefined))
            },
            _ => {
                let numbers = args
                    .iter()
                    .map(|arg| self.eval(arg).map(|v| v.to_number()))
                    .collect::<Result<Vec<_>, _>>()?;
                call_numeric(name, &numbers).map(Value::Number)
            },
        }
    }

    /// Evaluate the leading id argument of an accessor
    fn id_argument(&self, name: &str, args: &[Expr], arity: usize) -> Result<String, EvalError> {
        if args.len() != arity {
            return Err(EvalError::arity(name, arity.to_string(), args.len()));
        }
        match self.eval(&args[0])? {
            Value::String(id) => Ok(id),
            other => Err(EvalError::InvalidArgument(format!(
                "{}() id must be a string, got {}",
                name,
                other.type_name()
            ))),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Eq => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_eq(right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Value::Bool(compare(op, left, right))
        },
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (a, b) = (left.to_number(), right.to_number());
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            };
            if matches!(op, BinaryOp::Div | BinaryOp::Rem)
                && a.is_finite()
                && b.is_finite()
                && !result.is_finite()
            {
                return Err(EvalError::non_finite(format!("{} {} {}", a, op, b)));
            }
            Value::Number(result)
        },
    };
    Ok(value)
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (left, right) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }

    let (a, b) = (left.to_number(), right.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}
