//! Item configuration types
//!
//! An item is one derived output value. Keys use camelCase so configuration
//! exported by the UI loads unchanged:
//!
//! ```yaml
//! - group: power
//!   targetId: net_kw
//!   mode: formula
//!   inputs:
//!     - { key: pv, sourceState: "inverter.0.power" }
//!     - { key: load, sourceState: "meter.0.power", noNegative: true }
//!   formula: "(pv - load) / 1000"
//!   clamp: true
//!   min: -50
//!   max: 50
//! ```

use crate::serde_helpers::{bool_true, deserialize_bool_flexible};
use crate::validation::build_output_id;
use crate::value::Value;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an item derives its value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemMode {
    /// Mirror of one external id, optionally projected through a JSON path
    Source,
    /// Expression over named inputs
    #[default]
    Formula,
    /// Ordered condition rules mapping to discrete outputs
    #[serde(alias = "rules", alias = "state-machine")]
    StateMachine,
}

impl fmt::Display for ItemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemMode::Source => "source",
            ItemMode::Formula => "formula",
            ItemMode::StateMachine => "stateMachine",
        })
    }
}

/// Declared output type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    #[default]
    Number,
    Boolean,
    String,
    Mixed,
}

impl ItemType {
    /// Neutral value published after sustained failure
    pub fn zero_value(self) -> Value {
        match self {
            ItemType::Number => Value::Number(0.0),
            ItemType::Boolean => Value::Bool(false),
            ItemType::String => Value::String(String::new()),
            ItemType::Mixed => Value::Null,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItemType::Number => "number",
            ItemType::Boolean => "boolean",
            ItemType::String => "string",
            ItemType::Mixed => "mixed",
        })
    }
}

/// Named binding from an external id into a formula variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    /// Variable name (sanitized to `[A-Za-z0-9_]` at compile time)
    pub key: String,

    /// External id to read
    #[serde(default)]
    pub source_state: String,

    /// Optional JSON path projection applied to the raw value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,

    /// Clamp negative readings to 0 before evaluation
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub no_negative: bool,
}

/// One `(condition, value)` pair of a state-machine item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Condition expression; empty, `true` or `1` marks the default rule
    #[serde(default)]
    pub condition: String,

    /// Output when the condition matches
    #[serde(default)]
    pub value: serde_json::Value,
}

impl RuleConfig {
    /// Whether this rule always matches
    pub fn is_default(&self) -> bool {
        let cond = self.condition.trim();
        cond.is_empty() || cond.eq_ignore_ascii_case("true") || cond == "1"
    }
}

/// A configured derived output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemConfig {
    #[serde(default = "bool_true", deserialize_with = "deserialize_bool_flexible")]
    pub enabled: bool,

    /// Output group (first part of the output id)
    #[serde(default)]
    pub group: String,

    /// Output name inside the group
    #[serde(default)]
    pub target_id: String,

    #[serde(default)]
    pub mode: ItemMode,

    #[serde(default, rename = "type")]
    pub item_type: ItemType,

    // ---- source mode ----
    #[serde(default)]
    pub source_state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,

    // ---- formula / state-machine mode ----
    #[serde(default)]
    pub inputs: Vec<InputConfig>,

    #[serde(default)]
    pub formula: String,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    // ---- numeric shaping ----
    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub no_negative: bool,

    #[serde(default, deserialize_with = "deserialize_bool_flexible")]
    pub clamp: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    // ---- display only, ignored by the calculation pipeline ----
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            group: String::new(),
            target_id: String::new(),
            mode: ItemMode::default(),
            item_type: ItemType::default(),
            source_state: String::new(),
            json_path: None,
            inputs: Vec::new(),
            formula: String::new(),
            rules: Vec::new(),
            no_negative: false,
            clamp: false,
            min: None,
            max: None,
            name: String::new(),
            unit: None,
            role: None,
            description: None,
        }
    }
}

impl ItemConfig {
    /// Source-mode item mirroring `source_state`
    pub fn source(group: &str, target_id: &str, source_state: &str) -> Self {
        Self {
            group: group.to_string(),
            target_id: target_id.to_string(),
            mode: ItemMode::Source,
            source_state: source_state.to_string(),
            ..Self::default()
        }
    }

    /// Formula-mode item
    pub fn formula(group: &str, target_id: &str, formula: &str, inputs: Vec<InputConfig>) -> Self {
        Self {
            group: group.to_string(),
            target_id: target_id.to_string(),
            mode: ItemMode::Formula,
            formula: formula.to_string(),
            inputs,
            ..Self::default()
        }
    }

    /// State-machine item
    pub fn state_machine(
        group: &str,
        target_id: &str,
        item_type: ItemType,
        inputs: Vec<InputConfig>,
        rules: Vec<RuleConfig>,
    ) -> Self {
        Self {
            group: group.to_string(),
            target_id: target_id.to_string(),
            mode: ItemMode::StateMachine,
            item_type,
            inputs,
            rules,
            ..Self::default()
        }
    }

    /// Derived output id (`group.targetId`)
    pub fn output_id(&self) -> Result<String> {
        build_output_id(&self.group, &self.target_id)
    }

    /// Best-effort label for logs, valid or not
    pub fn label(&self) -> String {
        match (self.group.trim(), self.target_id.trim()) {
            ("", target) => target.to_string(),
            (group, target) => format!("{}.{}", group, target),
        }
    }
}

impl InputConfig {
    pub fn new(key: &str, source_state: &str) -> Self {
        Self {
            key: key.to_string(),
            source_state: source_state.to_string(),
            ..Self::default()
        }
    }
}

impl RuleConfig {
    pub fn new(condition: &str, value: serde_json::Value) -> Self {
        Self {
            condition: condition.to_string(),
            value,
        }
    }
}
