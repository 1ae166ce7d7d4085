//! Evaluation engine: compiled definitions and per-cycle value computation.
//!
//! The engine owns the immutable configuration (metric, derived, and view
//! definitions, with derived expressions compiled once). Everything a cycle
//! computes — the series index, the contexts, the derived values — is a
//! freshly constructed value returned to the caller; no per-cycle state
//! lives in the engine itself.

pub mod derived;
pub mod index;

use std::collections::{BTreeMap, HashMap};

use crate::config::{Config, MetricDef, ViewDef};
use crate::eval::Value;

pub use derived::{CompiledDerived, DerivedValues, RESOLVE_PASSES};
pub use index::{MetricSamples, Row, SampleSet, SeriesIndex};

/// Contexts and derived values computed for one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleValues {
    /// First sample per metric id.
    pub global: HashMap<String, Value>,
    /// Per-row contexts: coerced labels overlaid with metric values.
    pub row_ctxs: BTreeMap<String, HashMap<String, Value>>,
    pub derived: DerivedValues,
}

/// The dashboard engine. Construction compiles all derived expressions and
/// reports the invalid ones; afterwards the engine is read-only.
pub struct Engine {
    config: Config,
    derived: Vec<CompiledDerived>,
}

impl Engine {
    pub fn new(config: Config) -> Engine {
        let derived = derived::compile(&config.derived);
        Engine { config, derived }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &[MetricDef] {
        &self.config.metrics
    }

    pub fn missing_value(&self) -> &str {
        &self.config.globals.defaults.missing_value
    }

    /// Views in layout order.
    pub fn layout_views(&self) -> impl Iterator<Item = &ViewDef> {
        self.config
            .layout
            .iter()
            .filter_map(|entry| self.config.view(&entry.view))
    }

    /// Indexes one bulk fetch.
    pub fn index(&self, samples: &SampleSet) -> SeriesIndex {
        index::index(samples, &self.config.metrics, &self.config.globals.row_label)
    }

    /// Rebuilds contexts and derived values from an existing index.
    ///
    /// This is the whole fast-tick computation: the index (and therefore the
    /// sample set) is unchanged, only the value maps are reconstructed.
    pub fn cycle(&self, idx: &SeriesIndex) -> CycleValues {
        let global = self.global_context(idx);
        let row_ctxs = row_contexts(idx);
        let derived = derived::resolve(&self.derived, &global, &row_ctxs);
        CycleValues {
            global,
            row_ctxs,
            derived,
        }
    }

    /// First value per configured metric id.
    fn global_context(&self, idx: &SeriesIndex) -> HashMap<String, Value> {
        let mut ctx = HashMap::new();
        for metric in &self.config.metrics {
            if let Some(values) = idx.by_metric.get(&metric.id)
                && let Some(first) = values.first()
            {
                ctx.insert(metric.id.clone(), Value::Num(*first));
            }
        }
        ctx
    }
}

/// Per-row contexts: labels (numeric ones coerced) overlaid with values.
fn row_contexts(idx: &SeriesIndex) -> BTreeMap<String, HashMap<String, Value>> {
    idx.rows
        .iter()
        .map(|(row_id, row)| {
            let mut ctx = HashMap::new();
            for (name, raw) in &row.labels {
                ctx.insert(name.clone(), Value::from_label(raw));
            }
            for (name, value) in &row.values {
                ctx.insert(name.clone(), Value::Num(*value));
            }
            (row_id.clone(), ctx)
        })
        .collect()
}
