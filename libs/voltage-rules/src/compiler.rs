//! Item compiler and config-change cache
//!
//! Turns the configured item list into [`CompiledItem`]s. The whole list is
//! recompiled only when its content signature changes, so identical
//! configuration is never re-parsed on later ticks.

use crate::config::CalcConfig;
use crate::discovery::{ast_accessor_ids, cap_item_sources, union_sources, SourceSet};
use crate::error::CompileError;
use crate::log_once::LogOnce;
use crate::state_machine::{compile_rules, CompiledRule};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info, warn};
use voltage_calc::{compile, evaluate, EmptyEnvironment, Expr, ExpressionLimits, JsonPath, ParseError, Variables};
use voltage_model::{
    sanitize_input_key, InputConfig, ItemConfig, ItemMode, ItemType, RuleConfig, Value,
};

/// Input binding with its key sanitized and path pre-parsed
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledInput {
    pub key: String,
    pub source_state: String,
    pub path: Option<JsonPath>,
    pub no_negative: bool,
}

/// Executable form of an item
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Source {
        source_state: String,
        path: Option<JsonPath>,
    },
    Formula(Expr),
    /// Formula folded at compile time
    Constant(Value),
    StateMachine(Vec<CompiledRule>),
}

/// Cached compilation result for one enabled item
#[derive(Debug, Clone)]
pub struct CompiledItem {
    /// Output id, or a best-effort label when the id is invalid
    pub output_id: String,
    pub config: ItemConfig,
    pub inputs: Vec<CompiledInput>,
    pub artifact: Result<Artifact, CompileError>,
    /// External ids this item reads, within the global subscription set
    pub source_ids: Vec<String>,
    pub compiled_at_ms: i64,
}

impl CompiledItem {
    pub fn ok(&self) -> bool {
        self.artifact.is_ok()
    }

    pub fn error(&self) -> Option<&CompileError> {
        self.artifact.as_ref().err()
    }

    pub fn item_type(&self) -> ItemType {
        self.config.item_type
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureView<'a> {
    enabled: bool,
    group: &'a str,
    target_id: &'a str,
    mode: ItemMode,
    item_type: ItemType,
    source_state: &'a str,
    json_path: Option<&'a str>,
    inputs: &'a [InputConfig],
    formula: &'a str,
    rules: &'a [RuleConfig],
    no_negative: bool,
    clamp: bool,
    min: Option<f64>,
    max: Option<f64>,
}

/// Stable content signature over the fields that affect compilation
///
/// Display fields (`name`, `unit`, `role`, `description`) are excluded.
pub fn config_signature(items: &[ItemConfig]) -> String {
    let views: Vec<SignatureView<'_>> = items
        .iter()
        .map(|item| SignatureView {
            enabled: item.enabled,
            group: &item.group,
            target_id: &item.target_id,
            mode: item.mode,
            item_type: item.item_type,
            source_state: &item.source_state,
            json_path: item.json_path.as_deref(),
            inputs: &item.inputs,
            formula: &item.formula,
            rules: &item.rules,
            no_negative: item.no_negative,
            clamp: item.clamp,
            min: item.min,
            max: item.max,
        })
        .collect();

    serde_json::to_string(&views).unwrap_or_else(|_| format!("{:?}", items))
}

fn parse_path(path: Option<&str>) -> Result<Option<JsonPath>, CompileError> {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) => JsonPath::parse(p)
            .map(Some)
            .ok_or_else(|| CompileError::Parse(ParseError::new(format!("Invalid JSON path '{}'", p), 0))),
    }
}

fn compile_inputs(inputs: &[InputConfig]) -> Result<Vec<CompiledInput>, CompileError> {
    inputs
        .iter()
        .map(|input| {
            Ok(CompiledInput {
                key: sanitize_input_key(&input.key)?,
                source_state: input.source_state.trim().to_string(),
                path: parse_path(input.json_path.as_deref())?,
                no_negative: input.no_negative,
            })
        })
        .collect()
}

fn compile_formula(formula: &str, limits: &ExpressionLimits) -> Result<Artifact, CompileError> {
    if formula.trim().is_empty() {
        return Ok(Artifact::Constant(Value::Number(0.0)));
    }

    let expr = compile(formula, limits)?;
    if expr.is_constant() {
        // Faults such as `1/0` stay in the tree and surface on every tick
        if let Ok(value) = evaluate(&expr, &Variables::new(), &EmptyEnvironment) {
            return Ok(Artifact::Constant(value));
        }
    }
    Ok(Artifact::Formula(expr))
}

/// Compile one item; `source_ids` is left empty for discovery to fill
pub fn compile_item(item: &ItemConfig, limits: &ExpressionLimits, now_ms: i64) -> CompiledItem {
    let failed = |output_id: String, err: CompileError| CompiledItem {
        output_id,
        config: item.clone(),
        inputs: Vec::new(),
        artifact: Err(err),
        source_ids: Vec::new(),
        compiled_at_ms: now_ms,
    };

    let output_id = match item.output_id() {
        Ok(id) => id,
        Err(e) => return failed(item.label(), e.into()),
    };

    let result = match item.mode {
        ItemMode::Source => {
            let source_state = item.source_state.trim();
            if source_state.is_empty() {
                Err(CompileError::MissingSourceState)
            } else {
                parse_path(item.json_path.as_deref()).map(|path| Artifact::Source {
                    source_state: source_state.to_string(),
                    path,
                })
            }
        },
        ItemMode::Formula => compile_formula(&item.formula, limits),
        ItemMode::StateMachine => {
            compile_rules(&item.rules, item.item_type, limits).map(Artifact::StateMachine)
        },
    };

    let inputs = match item.mode {
        ItemMode::Source => Ok(Vec::new()),
        _ => compile_inputs(&item.inputs),
    };

    match (inputs, result) {
        (Ok(inputs), Ok(artifact)) => CompiledItem {
            output_id,
            config: item.clone(),
            inputs,
            artifact: Ok(artifact),
            source_ids: Vec::new(),
            compiled_at_ms: now_ms,
        },
        (Err(e), _) | (_, Err(e)) => failed(output_id, e),
    }
}

/// Candidate source ids in discovery order: inputs first, then accessors
fn source_candidates(item: &ItemConfig, artifact: &Artifact) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    match artifact {
        Artifact::Source { source_state, .. } => ids.push(source_state.clone()),
        Artifact::Formula(expr) => {
            ids.extend(input_sources(item));
            ids.extend(ast_accessor_ids(expr));
        },
        Artifact::Constant(_) => ids.extend(input_sources(item)),
        Artifact::StateMachine(rules) => {
            ids.extend(input_sources(item));
            for condition in rules.iter().filter_map(|r| r.condition.as_ref()) {
                ids.extend(ast_accessor_ids(condition));
            }
        },
    }
    ids
}

fn input_sources(item: &ItemConfig) -> impl Iterator<Item = String> + '_ {
    item.inputs
        .iter()
        .map(|input| input.source_state.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Compiled-item cache keyed by the configuration signature
#[derive(Debug)]
pub struct ItemCompiler {
    limits: ExpressionLimits,
    max_sources_per_item: usize,
    max_total_sources: usize,
    signature: Option<String>,
    items: Vec<CompiledItem>,
    desired_sources: Vec<String>,
    generation: u64,
    compile_count: u64,
    log_once: LogOnce,
}

impl ItemCompiler {
    pub fn new(config: &CalcConfig) -> Self {
        Self {
            limits: config.limits,
            max_sources_per_item: config.max_sources_per_item,
            max_total_sources: config.max_total_sources,
            signature: None,
            items: Vec::new(),
            desired_sources: Vec::new(),
            generation: 0,
            compile_count: 0,
            log_once: LogOnce::new(),
        }
    }

    /// Recompile when the signature of `items` changed
    ///
    /// Returns `true` when a recompilation happened.
    pub fn ensure_compiled(&mut self, items: &[ItemConfig], now_ms: i64) -> bool {
        let signature = config_signature(items);
        if self.signature.as_deref() == Some(signature.as_str()) {
            return false;
        }

        let mut compiled = Vec::new();
        let mut seen_ids: FxHashSet<String> = FxHashSet::default();
        let mut per_item: Vec<Vec<String>> = Vec::new();

        for item in items.iter().filter(|item| item.enabled) {
            let mut entry = compile_item(item, &self.limits, now_ms);
            self.compile_count += 1;

            if entry.ok() && !seen_ids.insert(entry.output_id.clone()) {
                entry.artifact = Err(CompileError::DuplicateOutputId(entry.output_id.clone()));
                entry.inputs.clear();
            }

            let sources = match &entry.artifact {
                Ok(artifact) => cap_item_sources(
                    &entry.output_id,
                    source_candidates(item, artifact),
                    self.max_sources_per_item,
                    &self.log_once,
                ),
                Err(e) => {
                    warn!("Item {} failed to compile: {}", entry.output_id, e);
                    Vec::new()
                },
            };

            per_item.push(sources);
            compiled.push(entry);
        }

        let desired = union_sources(
            per_item.iter().map(Vec::as_slice),
            self.max_total_sources,
            &self.log_once,
        );
        let mut desired_set = SourceSet::new();
        for id in &desired {
            desired_set.push(id, usize::MAX);
        }
        for (entry, sources) in compiled.iter_mut().zip(per_item) {
            entry.source_ids = sources
                .into_iter()
                .filter(|id| desired_set.contains(id))
                .collect();
        }

        let failed = compiled.iter().filter(|c| !c.ok()).count();
        self.generation += 1;
        info!(
            "Compiled {} item(s), {} failed, {} source(s) (generation {})",
            compiled.len(),
            failed,
            desired.len(),
            self.generation
        );
        debug!("Config signature length {}", signature.len());

        self.items = compiled;
        self.desired_sources = desired;
        self.signature = Some(signature);
        true
    }

    /// Compiled enabled items in configuration order
    pub fn items(&self) -> &[CompiledItem] {
        &self.items
    }

    pub fn get(&self, output_id: &str) -> Option<&CompiledItem> {
        self.items.iter().find(|c| c.output_id == output_id)
    }

    /// De-duplicated, capped union of all item sources
    pub fn desired_sources(&self) -> &[String] {
        &self.desired_sources
    }

    /// Number of recompilations so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of individual item compilations so far
    pub fn compile_count(&self) -> u64 {
        self.compile_count
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compiler() -> ItemCompiler {
        ItemCompiler::new(&CalcConfig::default())
    }

    fn formula(target: &str, text: &str) -> ItemConfig {
        ItemConfig::formula("calc", target, text, vec![InputConfig::new("p", "inv.0.power")])
    }

    #[test]
    fn test_unchanged_signature_skips_recompile() {
        let mut compiler = compiler();
        let items = vec![formula("a", "p * 2"), formula("b", "s('meter.0') + 1")];

        assert!(compiler.ensure_compiled(&items, 1_000));
        assert_eq!(compiler.generation(), 1);
        assert_eq!(compiler.compile_count(), 2);

        assert!(!compiler.ensure_compiled(&items.clone(), 2_000));
        assert_eq!(compiler.generation(), 1);
        assert_eq!(compiler.compile_count(), 2);
        assert_eq!(compiler.items()[0].compiled_at_ms, 1_000);
    }

    #[test]
    fn test_display_fields_do_not_change_signature() {
        let plain = vec![formula("a", "p")];
        let mut labelled = plain.clone();
        labelled[0].name = "Net power".to_string();
        labelled[0].unit = Some("kW".to_string());
        assert_eq!(config_signature(&plain), config_signature(&labelled));

        let mut edited = plain.clone();
        edited[0].formula = "p + 1".to_string();
        assert_ne!(config_signature(&plain), config_signature(&edited));
    }

    #[test]
    fn test_formula_artifacts() {
        let limits = ExpressionLimits::default();
        let artifact = |text: &str| compile_item(&formula("a", text), &limits, 0).artifact;

        assert_eq!(artifact("  ").unwrap(), Artifact::Constant(Value::Number(0.0)));
        assert_eq!(
            artifact("2 * (3 + 4)").unwrap(),
            Artifact::Constant(Value::Number(14.0))
        );
        assert!(matches!(artifact("1 / 0").unwrap(), Artifact::Formula(_)));
        assert!(matches!(artifact("p * 2").unwrap(), Artifact::Formula(_)));
        assert!(matches!(artifact("p +").unwrap_err(), CompileError::Parse(_)));

        let compiled = compile_item(&formula("a", "p"), &limits, 7);
        assert_eq!(compiled.output_id, "calc.a");
        assert_eq!(compiled.inputs[0].key, "p");
        assert_eq!(compiled.compiled_at_ms, 7);
    }

    #[test]
    fn test_config_errors() {
        let limits = ExpressionLimits::default();

        let invalid = compile_item(&formula("", "1"), &limits, 0);
        assert_eq!(invalid.output_id, "calc.");
        assert!(matches!(
            invalid.error(),
            Some(CompileError::InvalidOutputId { .. })
        ));

        let missing = compile_item(&ItemConfig::source("calc", "m", " "), &limits, 0);
        assert_eq!(missing.error(), Some(&CompileError::MissingSourceState));

        let mut bad_key = formula("a", "x");
        bad_key.inputs = vec![InputConfig::new("__proto__", "a.b")];
        assert!(matches!(
            compile_item(&bad_key, &limits, 0).error(),
            Some(CompileError::InvalidInputKey { .. })
        ));

        let mut bad_path = ItemConfig::source("calc", "m", "a.b");
        bad_path.json_path = Some("$..x".to_string());
        assert!(matches!(
            compile_item(&bad_path, &limits, 0).error(),
            Some(CompileError::Parse(_))
        ));
    }

    #[test]
    fn test_disabled_items_are_not_compiled() {
        let mut compiler = compiler();
        let mut off = formula("off", "p");
        off.enabled = false;
        compiler.ensure_compiled(&[formula("on", "p"), off], 0);

        assert_eq!(compiler.items().len(), 1);
        assert_eq!(compiler.items()[0].output_id, "calc.on");
        assert!(compiler.get("calc.off").is_none());
    }

    #[test]
    fn test_duplicate_output_ids() {
        let mut compiler = compiler();
        compiler.ensure_compiled(&[formula("a", "1"), formula("a", "2")], 0);
        assert!(compiler.items()[0].ok());
        assert_eq!(
            compiler.items()[1].error(),
            Some(&CompileError::DuplicateOutputId("calc.a".to_string()))
        );
    }

    #[test]
    fn test_sources_discovered_per_mode() {
        let mut compiler = compiler();
        let machine = ItemConfig::state_machine(
            "calc",
            "mode",
            ItemType::String,
            vec![InputConfig::new("soc", "bms.soc")],
            vec![
                RuleConfig::new("v('grid.state') == 'off'", json!("island")),
                RuleConfig::new("", json!("grid")),
            ],
        );
        let items = vec![
            ItemConfig::source("calc", "mirror", "meter.0.power"),
            formula("net", "p - s('meter.0.power') + jp(\"bms.raw\", '$.soc')"),
            machine,
        ];
        compiler.ensure_compiled(&items, 0);

        assert_eq!(compiler.items()[0].source_ids, vec!["meter.0.power"]);
        assert_eq!(compiler.items()[1].source_ids, vec![
            "inv.0.power",
            "meter.0.power",
            "bms.raw"
        ]);
        assert_eq!(compiler.items()[2].source_ids, vec!["bms.soc", "grid.state"]);
        assert_eq!(compiler.desired_sources(), &[
            "meter.0.power",
            "inv.0.power",
            "bms.raw",
            "bms.soc",
            "grid.state"
        ]);
    }

    #[test]
    fn test_item_sources_subset_of_capped_union() {
        let config = CalcConfig {
            max_total_sources: 2,
            ..CalcConfig::default()
        };
        let mut compiler = ItemCompiler::new(&config);
        compiler.ensure_compiled(
            &[
                ItemConfig::source("calc", "a", "x"),
                formula("b", "s('y') + s('z')"),
            ],
            0,
        );

        assert_eq!(compiler.desired_sources(), &["x", "inv.0.power"]);
        let desired: FxHashSet<&String> = compiler.desired_sources().iter().collect();
        for item in compiler.items() {
            assert!(item.source_ids.iter().all(|id| desired.contains(id)));
        }
        assert_eq!(compiler.items()[1].source_ids, vec!["inv.0.power"]);
    }

    #[test]
    fn test_accessor_text_inside_strings_is_not_a_source() {
        let mut compiler = compiler();
        let mut item = formula("label", "v('meter.state') == 's(\"x\")' ? 1 : 0");
        item.inputs.clear();
        compiler.ensure_compiled(&[item], 0);

        assert!(compiler.items()[0].ok());
        assert_eq!(compiler.items()[0].source_ids, vec!["meter.state"]);
        assert_eq!(compiler.desired_sources(), &["meter.state"]);
    }

    #[test]
    fn test_failed_items_contribute_no_sources() {
        let mut compiler = compiler();
        compiler.ensure_compiled(&[formula("bad", "s('q') +")], 0);
        assert!(compiler.desired_sources().is_empty());
        assert!(!compiler.items()[0].ok());
    }
}
