//! Per-item evaluation and output shaping

use crate::compiler::{Artifact, CompiledInput, CompiledItem};
use crate::error::ItemError;
use crate::state_machine::evaluate_rules;
use voltage_calc::{evaluate, Environment, EvalError, Variables};
use voltage_model::{ItemConfig, ItemType, Value};

/// Raw result of one item plus non-fatal rule failures
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub raw: Value,
    pub rule_failures: Vec<(usize, EvalError)>,
}

/// Bind inputs into formula variables
///
/// Inputs with a JSON path bind the projected value, or `undefined` when
/// nothing matches. Other inputs bind their numeric value; missing sources
/// stay unbound and therefore read as `0`.
pub fn bind_inputs(inputs: &[CompiledInput], env: &dyn Environment) -> Variables {
    let mut vars = Variables::with_capacity(inputs.len());

    for input in inputs {
        let raw = if input.source_state.is_empty() {
            None
        } else {
            env.resolve(&input.source_state)
        };

        let value = match (&input.path, raw) {
            (Some(path), Some(raw)) => path.extract(&raw).unwrap_or(Value::Undefined),
            (Some(_), None) => Value::Undefined,
            (None, Some(raw)) => Value::Number(raw.to_number()),
            (None, None) => continue,
        };

        let value = match value {
            Value::Number(n) if input.no_negative && n < 0.0 => Value::Number(0.0),
            other => other,
        };
        vars.insert(input.key.clone(), value);
    }

    vars
}

/// Compute the raw (unshaped) value of a compiled item
pub fn evaluate_item(item: &CompiledItem, env: &dyn Environment) -> Result<Evaluation, ItemError> {
    let artifact = match &item.artifact {
        Ok(artifact) => artifact,
        // callers skip uncompiled items; treat as a missing value if reached
        Err(_) => return Err(ItemError::MissingValue(item.output_id.clone())),
    };

    let raw = match artifact {
        Artifact::Source { source_state, path } => {
            let raw = env
                .resolve(source_state)
                .ok_or_else(|| ItemError::MissingValue(source_state.clone()))?;
            match path {
                Some(path) => path
                    .extract(&raw)
                    .ok_or_else(|| ItemError::MissingValue(source_state.clone()))?,
                None => raw,
            }
        },
        Artifact::Constant(value) => value.clone(),
        Artifact::Formula(expr) => {
            let vars = bind_inputs(&item.inputs, env);
            evaluate(expr, &vars, env)?
        },
        Artifact::StateMachine(rules) => {
            let vars = bind_inputs(&item.inputs, env);
            let outcome = evaluate_rules(rules, item.item_type(), &vars, env);
            return Ok(Evaluation {
                raw: outcome.value,
                rule_failures: outcome.failures,
            });
        },
    };

    Ok(Evaluation {
        raw,
        rule_failures: Vec::new(),
    })
}

/// Apply numeric shaping and cast to the declared type
///
/// Number items: `noNegative` first, then `clamp` to `[min, max]` with
/// non-finite bounds ignored. The result must be finite.
pub fn shape_output(config: &ItemConfig, raw: Value) -> Result<Value, ItemError> {
    match config.item_type {
        ItemType::Number => {
            let mut n = raw.to_number();
            if !n.is_finite() {
                return Err(ItemError::NotFinite(raw.to_display_string()));
            }
            if config.no_negative && n < 0.0 {
                n = 0.0;
            }
            if config.clamp {
                if let Some(min) = config.min.filter(|m| m.is_finite()) {
                    n = n.max(min);
                }
                if let Some(max) = config.max.filter(|m| m.is_finite()) {
                    n = n.min(max);
                }
            }
            Ok(Value::Number(n))
        },
        ItemType::Boolean => Ok(Value::Bool(cast_bool(&raw))),
        ItemType::String => Ok(Value::String(raw.to_display_string())),
        ItemType::Mixed => Ok(raw),
    }
}

/// Boolean coercion understanding common state keywords
pub fn cast_bool(value: &Value) -> bool {
    match value {
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => true,
            "false" | "off" | "no" | "0" | "" => false,
            _ => true,
        },
        other => other.is_truthy(),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::compiler::compile_item;
    use serde_json::json;
    use std::collections::HashMap;
    use voltage_calc::ExpressionLimits;
    use voltage_model::{InputConfig, RuleConfig};

    fn env(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn compiled(item: &ItemConfig) -> CompiledItem {
        compile_item(item, &ExpressionLimits::default(), 0)
    }

    fn number_item(no_negative: bool, clamp: bool, min: Option<f64>, max: Option<f64>) -> ItemConfig {
        ItemConfig {
            no_negative,
            clamp,
            min,
            max,
            ..ItemConfig::formula("calc", "x", "0", Vec::new())
        }
    }

    #[test]
    fn test_shaping_no_negative_then_clamp() {
        let item = number_item(true, true, Some(0.0), Some(100.0));
        assert_eq!(shape_output(&item, Value::Number(-5.0)).unwrap(), Value::Number(0.0));
        assert_eq!(shape_output(&item, Value::Number(150.0)).unwrap(), Value::Number(100.0));
        assert_eq!(shape_output(&item, Value::Number(42.0)).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_clamp_ignores_non_finite_bounds() {
        let item = number_item(false, true, Some(f64::NEG_INFINITY), Some(10.0));
        assert_eq!(shape_output(&item, Value::Number(-5.0)).unwrap(), Value::Number(-5.0));
        assert_eq!(shape_output(&item, Value::Number(50.0)).unwrap(), Value::Number(10.0));

        let unclamped = number_item(false, false, Some(0.0), Some(1.0));
        assert_eq!(shape_output(&unclamped, Value::Number(5.0)).unwrap(), Value::Number(5.0));
    }

    #[test]
    fn test_number_must_be_finite() {
        let item = number_item(false, false, None, None);
        assert!(matches!(
            shape_output(&item, Value::from("abc")),
            Err(ItemError::NotFinite(_))
        ));
        assert_eq!(shape_output(&item, Value::from(" 12 ")).unwrap(), Value::Number(12.0));
        assert_eq!(shape_output(&item, Value::Bool(true)).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_casts() {
        let mut item = number_item(false, false, None, None);
        item.item_type = ItemType::Boolean;
        for (raw, expected) in [
            (Value::from("ON"), true),
            (Value::from(" no "), false),
            (Value::from("0"), false),
            (Value::from("whatever"), true),
            (Value::Number(0.0), false),
            (Value::Null, false),
        ] {
            assert_eq!(shape_output(&item, raw).unwrap(), Value::Bool(expected));
        }

        item.item_type = ItemType::String;
        assert_eq!(shape_output(&item, Value::Number(3.0)).unwrap(), Value::from("3"));
        assert_eq!(
            shape_output(&item, Value::Json(json!({"a": 1}))).unwrap(),
            Value::from(r#"{"a":1}"#)
        );

        item.item_type = ItemType::Mixed;
        let payload = Value::Json(json!([1, 2]));
        assert_eq!(shape_output(&item, payload.clone()).unwrap(), payload);
    }

    #[test]
    fn test_bind_inputs() {
        let mut with_path = InputConfig::new("soc", "bms.raw");
        with_path.json_path = Some("$.soc".to_string());
        let mut clipped = InputConfig::new("load", "meter.p");
        clipped.no_negative = true;
        let item = compiled(&ItemConfig::formula("calc", "x", "soc", vec![
            with_path,
            clipped,
            InputConfig::new("missing", "nowhere"),
            InputConfig::new("text", "inv.state"),
        ]));

        let vars = bind_inputs(
            &item.inputs,
            &env(&[
                ("bms.raw", Value::from(r#"{"soc": 55}"#)),
                ("meter.p", Value::from("-3")),
                ("inv.state", Value::from("running")),
            ]),
        );

        assert_eq!(vars.get("soc"), Some(&Value::Number(55.0)));
        assert_eq!(vars.get("load"), Some(&Value::Number(0.0)));
        assert!(!vars.contains_key("missing"));
        assert!(matches!(vars.get("text"), Some(Value::Number(n)) if n.is_nan()));
    }

    #[test]
    fn test_unmatched_path_binds_undefined() {
        let mut input = InputConfig::new("soc", "bms.raw");
        input.json_path = Some("$.nope".to_string());
        let item = compiled(&ItemConfig::formula("calc", "x", "soc", vec![input]));

        let vars = bind_inputs(&item.inputs, &env(&[("bms.raw", Value::Json(json!({})))]));
        assert_eq!(vars.get("soc"), Some(&Value::Undefined));
    }

    #[test]
    fn test_evaluate_source_item() {
        let mut item = ItemConfig::source("calc", "soc", "bms.raw");
        item.json_path = Some("$.battery.soc".to_string());
        let item = compiled(&item);

        let present = env(&[("bms.raw", Value::Json(json!({"battery": {"soc": 71}})))]);
        assert_eq!(evaluate_item(&item, &present).unwrap().raw, Value::Number(71.0));

        assert_eq!(
            evaluate_item(&item, &env(&[])).unwrap_err(),
            ItemError::MissingValue("bms.raw".to_string())
        );
        let unmatched = env(&[("bms.raw", Value::Json(json!({})))]);
        assert!(evaluate_item(&item, &unmatched).is_err());
    }

    #[test]
    fn test_evaluate_formula_and_state_machine() {
        let formula = compiled(&ItemConfig::formula(
            "calc",
            "net",
            "(pv - load) / 1000",
            vec![InputConfig::new("pv", "inv.p"), InputConfig::new("load", "meter.p")],
        ));
        let states = env(&[("inv.p", Value::Number(5000.0)), ("meter.p", Value::Number(2000.0))]);
        assert_eq!(evaluate_item(&formula, &states).unwrap().raw, Value::Number(3.0));

        let machine = compiled(&ItemConfig::state_machine(
            "calc",
            "temp",
            ItemType::String,
            vec![InputConfig::new("x", "sensor.t")],
            vec![
                RuleConfig::new("x>10", json!("hot")),
                RuleConfig::new("", json!("normal")),
            ],
        ));
        let hot = env(&[("sensor.t", Value::Number(15.0))]);
        assert_eq!(evaluate_item(&machine, &hot).unwrap().raw, Value::from("hot"));
        let mild = env(&[("sensor.t", Value::Number(5.0))]);
        assert_eq!(evaluate_item(&machine, &mild).unwrap().raw, Value::from("normal"));
    }

    #[test]
    fn test_evaluation_error_surfaces() {
        let item = compiled(&ItemConfig::formula("calc", "ratio", "s('x') / s('y')", Vec::new()));
        let states = env(&[("x", Value::Number(1.0)), ("y", Value::Number(0.0))]);
        assert!(matches!(
            evaluate_item(&item, &states),
            Err(ItemError::Eval(EvalError::NonFinite(_)))
        ));
    }
}
