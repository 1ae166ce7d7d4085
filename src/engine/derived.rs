//! Derived-value resolution.
//!
//! Derived definitions are evaluated in declaration order over a fixed
//! number of passes, each pass writing results into a shared accumulator.
//! A definition can therefore reference one declared earlier within the
//! same pass, and chains across declaration order stabilize across passes
//! up to a dependency depth of [`RESOLVE_PASSES`]. This is a bounded
//! relaxation, not dependency-ordered evaluation: cyclic definitions do not
//! error, they simply keep whatever the final pass produced.

use std::collections::{BTreeMap, HashMap};

use tracing::error;

use crate::config::DerivedDef;
use crate::eval::{Expr, Scope, Value};

/// Number of relaxation passes over the definition list.
pub const RESOLVE_PASSES: usize = 3;

/// A derived definition with its expression parsed once.
///
/// A definition whose expression fails to parse is kept with no expression:
/// it evaluates to unknown every cycle, and the problem was already
/// reported when the engine was built.
#[derive(Debug, Clone)]
pub struct CompiledDerived {
    pub id: String,
    pub per_row: bool,
    expr: Option<Expr>,
}

/// Parses all derived expressions, reporting invalid ones.
pub fn compile(defs: &[DerivedDef]) -> Vec<CompiledDerived> {
    defs.iter()
        .map(|def| {
            let expr = match Expr::parse(&def.expr) {
                Ok(expr) => Some(expr),
                Err(e) => {
                    error!("derived value '{}' is disabled: {}", def.id, e);
                    None
                }
            };
            CompiledDerived {
                id: def.id.clone(),
                per_row: def.per_row,
                expr,
            }
        })
        .collect()
}

/// Resolver output: global values and per-row values, unknowns included.
#[derive(Debug, Clone, Default)]
pub struct DerivedValues {
    pub global: HashMap<String, Value>,
    pub rows: BTreeMap<String, HashMap<String, Value>>,
}

/// Runs the bounded relaxation over all definitions.
///
/// Global definitions see the global context plus the accumulated global
/// derived values; per-row definitions additionally see the row's base
/// context and its own accumulated derived values. Every pass overwrites
/// the previous one's result, including overwriting a known value with
/// unknown if an input disappeared.
pub fn resolve(
    defs: &[CompiledDerived],
    global_ctx: &HashMap<String, Value>,
    row_ctxs: &BTreeMap<String, HashMap<String, Value>>,
) -> DerivedValues {
    let mut out = DerivedValues {
        global: HashMap::new(),
        rows: row_ctxs
            .keys()
            .map(|id| (id.clone(), HashMap::new()))
            .collect(),
    };

    for _ in 0..RESOLVE_PASSES {
        for def in defs {
            if def.per_row {
                for (row_id, base) in row_ctxs {
                    let value = {
                        let row_derived = &out.rows[row_id];
                        let scope = Scope::new()
                            .with(global_ctx)
                            .with(&out.global)
                            .with(base)
                            .with(row_derived);
                        def.expr.as_ref().and_then(|e| e.eval(&scope))
                    };
                    if let Some(row_derived) = out.rows.get_mut(row_id) {
                        row_derived.insert(def.id.clone(), Value::from(value));
                    }
                }
            } else {
                let value = {
                    let scope = Scope::new().with(global_ctx).with(&out.global);
                    def.expr.as_ref().and_then(|e| e.eval(&scope))
                };
                out.global.insert(def.id.clone(), Value::from(value));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(list: &[(&str, &str, bool)]) -> Vec<CompiledDerived> {
        compile(
            &list
                .iter()
                .map(|(id, expr, per_row)| DerivedDef {
                    id: id.to_string(),
                    expr: expr.to_string(),
                    per_row: *per_row,
                })
                .collect::<Vec<_>>(),
        )
    }

    fn num_ctx(pairs: &[(&str, f64)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::Num(*v)))
            .collect()
    }

    #[test]
    fn test_same_pass_forward_reference() {
        let defs = defs(&[("x", "a + 1", false), ("y", "x * 2", false)]);
        let global = num_ctx(&[("a", 3.0)]);
        let out = resolve(&defs, &global, &BTreeMap::new());
        assert_eq!(out.global["x"], Value::Num(4.0));
        assert_eq!(out.global["y"], Value::Num(8.0));
    }

    #[test]
    fn test_backward_reference_stabilizes_across_passes() {
        // "y" references "x" which is declared after it; pass 1 leaves y
        // unknown, pass 2 fills it in.
        let defs = defs(&[("y", "x * 2", false), ("x", "a + 1", false)]);
        let global = num_ctx(&[("a", 3.0)]);
        let out = resolve(&defs, &global, &BTreeMap::new());
        assert_eq!(out.global["x"], Value::Num(4.0));
        assert_eq!(out.global["y"], Value::Num(8.0));
    }

    #[test]
    fn test_cycle_stops_after_three_passes() {
        // a -> b -> a never converges; the resolver must not error and must
        // report both as unknown (each pass re-evaluates from unknowns).
        let defs = defs(&[("a", "b + 1", false), ("b", "a + 1", false)]);
        let out = resolve(&defs, &num_ctx(&[]), &BTreeMap::new());
        assert_eq!(out.global["a"], Value::Unknown);
        assert_eq!(out.global["b"], Value::Unknown);
    }

    #[test]
    fn test_chain_deeper_than_pass_count_truncates() {
        // Fully backward chain: each pass fills in one more link, so after
        // three passes the fourth link is still unknown. This truncation is
        // intentional and must not be "fixed" into dependency ordering.
        let defs = defs(&[
            ("d", "c + 1", false),
            ("c", "b + 1", false),
            ("b", "a + 1", false),
            ("a", "seed + 1", false),
        ]);
        let out = resolve(&defs, &num_ctx(&[("seed", 0.0)]), &BTreeMap::new());
        assert_eq!(out.global["a"], Value::Num(1.0));
        assert_eq!(out.global["b"], Value::Num(2.0));
        assert_eq!(out.global["c"], Value::Num(3.0));
        assert_eq!(out.global["d"], Value::Unknown);
    }

    #[test]
    fn test_per_row_sees_row_and_global_values() {
        let defs = defs(&[
            ("base_pct", "100", false),
            ("cpu_pct", "cpu * base_pct", true),
        ]);
        let global = num_ctx(&[]);
        let mut rows = BTreeMap::new();
        rows.insert("100".to_string(), num_ctx(&[("cpu", 0.42)]));
        rows.insert("101".to_string(), num_ctx(&[("cpu", 0.05)]));

        let out = resolve(&defs, &global, &rows);
        assert_eq!(out.rows["100"]["cpu_pct"], Value::Num(42.0));
        assert_eq!(out.rows["101"]["cpu_pct"], Value::Num(5.0));
    }

    #[test]
    fn test_per_row_derived_shadows_and_chains() {
        let defs = defs(&[
            ("mem_pct", "used / total * 100", true),
            ("mem_free_pct", "100 - mem_pct", true),
        ]);
        let mut rows = BTreeMap::new();
        rows.insert(
            "100".to_string(),
            num_ctx(&[("used", 25.0), ("total", 100.0)]),
        );
        let out = resolve(&defs, &num_ctx(&[]), &rows);
        assert_eq!(out.rows["100"]["mem_pct"], Value::Num(25.0));
        assert_eq!(out.rows["100"]["mem_free_pct"], Value::Num(75.0));
    }

    #[test]
    fn test_failed_definition_does_not_abort_others() {
        let defs = defs(&[
            ("bad", "nope(", false),
            ("zero_div", "1 / 0", false),
            ("good", "2 + 2", false),
        ]);
        let out = resolve(&defs, &num_ctx(&[]), &BTreeMap::new());
        assert_eq!(out.global["bad"], Value::Unknown);
        assert_eq!(out.global["zero_div"], Value::Unknown);
        assert_eq!(out.global["good"], Value::Num(4.0));
    }

    #[test]
    fn test_unknown_overwrites_previous_known_value() {
        // A value that becomes unknown mid-resolution must be stored as
        // unknown, not keep its earlier result.
        let defs = defs(&[("x", "a + 1", false)]);
        let out = resolve(&defs, &num_ctx(&[]), &BTreeMap::new());
        assert_eq!(out.global["x"], Value::Unknown);
        assert!(out.global.contains_key("x"));
    }
}
