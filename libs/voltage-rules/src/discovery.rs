//! Source discovery
//!
//! Works out which external ids an item depends on: configured inputs plus
//! every string-literal first argument of `s(...)`, `v(...)` and `jp(...)`.
//! Accessors are found by walking compiled trees, so accessor-like text
//! inside string literals never counts.

use crate::log_once::LogOnce;
use rustc_hash::FxHashSet;
use tracing::warn;
use voltage_calc::{Expr, ACCESSOR_FUNCTIONS};

/// Ids named by accessor calls in a parsed tree
pub fn ast_accessor_ids(expr: &Expr) -> Vec<String> {
    let mut ids = Vec::new();
    let mut stack = vec![expr];
    while let Some(node) = stack.pop() {
        if let Expr::Call { callee, args } = node {
            if ACCESSOR_FUNCTIONS.contains(&callee.as_str()) {
                if let Some(Expr::Literal(voltage_model::Value::String(id))) = args.first() {
                    if !id.trim().is_empty() {
                        ids.push(id.clone());
                    }
                }
            }
        }
        // reverse keeps left-to-right order on the stack
        stack.extend(node.children().into_iter().rev());
    }
    ids
}

/// Ordered, de-duplicated id list with a size cap
#[derive(Debug, Default)]
pub struct SourceSet {
    ids: Vec<String>,
    seen: FxHashSet<String>,
    truncated: bool,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` unless already present; `false` once `cap` is reached
    pub fn push(&mut self, id: &str, cap: usize) -> bool {
        if self.seen.contains(id) {
            return true;
        }
        if self.ids.len() >= cap {
            self.truncated = true;
            return false;
        }
        self.seen.insert(id.to_string());
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn into_ids(self) -> Vec<String> {
        self.ids
    }
}

/// Cap one item's candidate ids, warning once per item on truncation
pub fn cap_item_sources(
    label: &str,
    candidates: impl IntoIterator<Item = String>,
    cap: usize,
    log_once: &LogOnce,
) -> Vec<String> {
    let mut set = SourceSet::new();
    for id in candidates {
        if !set.push(&id, cap) {
            break;
        }
    }
    if set.is_truncated() && log_once.first(&format!("discovery:item:{}", label)) {
        warn!(
            "Item {} references more than {} sources, extra sources ignored",
            label, cap
        );
    }
    set.into_ids()
}

/// Union of per-item ids, capped globally
pub fn union_sources<'a>(
    per_item: impl IntoIterator<Item = &'a [String]>,
    cap: usize,
    log_once: &LogOnce,
) -> Vec<String> {
    let mut set = SourceSet::new();
    'items: for ids in per_item {
        for id in ids {
            if !set.push(id, cap) {
                break 'items;
            }
        }
    }
    if set.is_truncated() && log_once.first("discovery:total") {
        warn!(
            "More than {} distinct sources requested, subscription set truncated",
            cap
        );
    }
    set.into_ids()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tracing_test::traced_test;
    use voltage_calc::{compile, ExpressionLimits};

    #[test]
    fn test_ast_walk_ignores_non_literal_and_quoted_calls() {
        let expr = compile(
            "s(dyn) + abs(1) + v('meter.state') + jp('x', 's(\"y\")') + (\"v('z')\" == 'a')",
            &ExpressionLimits::default(),
        )
        .unwrap();
        assert_eq!(ast_accessor_ids(&expr), vec!["meter.state", "x"]);
    }

    #[test]
    fn test_ast_walk_in_source_order() {
        let expr = compile(
            "IF(s('a') > 1, jp('b', '$.x'), v('c')) || s(\"a\")",
            &ExpressionLimits::default(),
        )
        .unwrap();
        assert_eq!(ast_accessor_ids(&expr), vec!["a", "b", "c", "a"]);
    }

    #[test]
    #[traced_test]
    fn test_item_cap_truncates_and_warns_once() {
        let once = LogOnce::new();
        let ids: Vec<String> = (0..5).map(|i| format!("id{}", i)).collect();

        let capped = cap_item_sources("calc.x", ids.clone(), 3, &once);
        assert_eq!(capped, vec!["id0", "id1", "id2"]);
        cap_item_sources("calc.x", ids, 3, &once);

        assert!(logs_contain("Item calc.x references more than 3 sources"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("references more than")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, got {}", n)),
            }
        });
    }

    #[test]
    fn test_duplicates_do_not_count_against_cap() {
        let once = LogOnce::new();
        let ids = ["a", "a", "b", "a"].map(String::from);
        assert_eq!(cap_item_sources("x", ids, 2, &once), vec!["a", "b"]);
    }

    #[test]
    fn test_union_is_deduplicated_and_capped() {
        let once = LogOnce::new();
        let first = vec!["a".to_string(), "b".to_string()];
        let second = vec!["b".to_string(), "c".to_string(), "d".to_string()];

        let all = union_sources([first.as_slice(), second.as_slice()], 10, &once);
        assert_eq!(all, vec!["a", "b", "c", "d"]);

        let capped = union_sources([first.as_slice(), second.as_slice()], 3, &once);
        assert_eq!(capped, vec!["a", "b", "c"]);
    }
}
