//! Rule-based state machine
//!
//! Rules are checked top to bottom; the first truthy condition (or the
//! default rule) decides the output. A condition that fails to evaluate is
//! recorded and skipped.

use crate::error::{CompileError, Result};
use tracing::debug;
use voltage_calc::{compile, evaluate, Environment, EvalError, Expr, ExpressionLimits, Variables};
use voltage_model::{ItemType, RuleConfig, Value};

/// One compiled `(condition, value)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    /// `None` for the default rule
    pub condition: Option<Expr>,
    pub value: Value,
}

impl CompiledRule {
    pub fn is_default(&self) -> bool {
        self.condition.is_none()
    }
}

/// Result of running the rules once
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub value: Value,
    /// Index of the deciding rule, `None` when nothing matched
    pub matched: Option<usize>,
    /// Conditions that failed to evaluate, by rule index
    pub failures: Vec<(usize, EvalError)>,
}

/// Compile rules for an item of type `item_type`
///
/// Rules after the first default rule can never be reached and are dropped.
pub fn compile_rules(
    rules: &[RuleConfig],
    item_type: ItemType,
    limits: &ExpressionLimits,
) -> Result<Vec<CompiledRule>> {
    if rules.is_empty() {
        return Err(CompileError::NoRules);
    }

    let mut compiled = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let value = check_rule_value(index, &rule.value, item_type)?;

        if rule.is_default() {
            if index + 1 < rules.len() {
                debug!(
                    "Dropping {} rule(s) after default rule {}",
                    rules.len() - index - 1,
                    index
                );
            }
            compiled.push(CompiledRule {
                condition: None,
                value,
            });
            break;
        }

        let condition = compile(&rule.condition, limits)
            .map_err(|e| CompileError::from(e).in_rule(index))?;
        compiled.push(CompiledRule {
            condition: Some(condition),
            value,
        });
    }

    Ok(compiled)
}

fn check_rule_value(index: usize, value: &serde_json::Value, item_type: ItemType) -> Result<Value> {
    use serde_json::Value as Json;

    let ok = match (item_type, value) {
        (ItemType::Boolean, Json::Bool(_)) => true,
        (ItemType::String, Json::String(_)) => true,
        (ItemType::Number, Json::Number(n)) => n.as_f64().is_some_and(f64::is_finite),
        (ItemType::Mixed, v) => !v.is_object() && !v.is_array(),
        _ => false,
    };

    if ok {
        Ok(Value::from_json(value.clone()))
    } else {
        Err(CompileError::RuleValueType {
            index,
            expected: item_type,
            got: Value::from_json(value.clone()).type_name().to_string(),
        })
    }
}

/// Run compiled rules against `vars` and `env`
pub fn evaluate_rules(
    rules: &[CompiledRule],
    item_type: ItemType,
    vars: &Variables,
    env: &dyn Environment,
) -> RuleOutcome {
    let mut failures = Vec::new();

    for (index, rule) in rules.iter().enumerate() {
        let matched = match &rule.condition {
            None => true,
            Some(condition) => match evaluate(condition, vars, env) {
                Ok(result) => result.is_truthy(),
                Err(e) => {
                    failures.push((index, e));
                    false
                },
            },
        };

        if matched {
            return RuleOutcome {
                value: rule.value.clone(),
                matched: Some(index),
                failures,
            };
        }
    }

    RuleOutcome {
        value: no_match_value(item_type),
        matched: None,
        failures,
    }
}

/// Output when no rule matches
pub fn no_match_value(item_type: ItemType) -> Value {
    match item_type {
        ItemType::String => Value::String(String::new()),
        _ => Value::Bool(false),
    }
}
