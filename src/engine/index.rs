//! Series indexing: a flat bulk fetch becomes per-metric value buckets and
//! per-entity rows.
//!
//! Rows are emergent: any entity id seen in at least one keyed sample gets a
//! row, nothing is declared in configuration. Entities absent from the
//! current fetch vanish until they reappear.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::MetricDef;
use crate::source::Sample;

/// Samples fetched in one bulk cycle, in metric definition order.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    pub entries: Vec<MetricSamples>,
}

/// All series one query returned, tagged with the metric id.
#[derive(Debug, Clone)]
pub struct MetricSamples {
    pub metric_id: String,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn push(&mut self, metric_id: &str, samples: Vec<Sample>) {
        self.entries.push(MetricSamples {
            metric_id: metric_id.to_string(),
            samples,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.samples.is_empty())
    }
}

/// One table row: an entity id, its exposed labels, and one value per
/// metric (first sample wins on duplicates).
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub labels: HashMap<String, String>,
    pub values: HashMap<String, f64>,
}

/// Index over one bulk cycle's samples.
#[derive(Debug, Clone, Default)]
pub struct SeriesIndex {
    /// All values per metric id, in fetch order.
    pub by_metric: HashMap<String, Vec<f64>>,
    /// All values per (metric id, entity id), in fetch order.
    pub by_metric_entity: HashMap<(String, String), Vec<f64>>,
    /// Emergent row set, ordered by entity id.
    pub rows: BTreeMap<String, Row>,
}

/// Builds the index for one cycle.
///
/// A sample whose value does not parse as a number is dropped on its own;
/// the rest of the pass continues. Row labels are only collected from
/// metrics that declare `expose_labels`; a declared label missing from the
/// sample is recorded as empty.
pub fn index(set: &SampleSet, metrics: &[MetricDef], row_label: &str) -> SeriesIndex {
    let mut out = SeriesIndex::default();

    for entry in &set.entries {
        let expose = metrics
            .iter()
            .find(|m| m.id == entry.metric_id)
            .map(|m| m.expose_labels.as_slice())
            .unwrap_or(&[]);

        for sample in &entry.samples {
            let value: f64 = match sample.value.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    debug!(
                        "dropping non-numeric sample for '{}': '{}'",
                        entry.metric_id, sample.value
                    );
                    continue;
                }
            };

            if let Some(entity) = sample.labels.get(row_label) {
                out.by_metric_entity
                    .entry((entry.metric_id.clone(), entity.clone()))
                    .or_default()
                    .push(value);

                if !expose.is_empty() {
                    let row = out.rows.entry(entity.clone()).or_default();
                    for name in expose {
                        let label_value = sample.labels.get(name).cloned().unwrap_or_default();
                        row.labels.insert(name.clone(), label_value);
                    }
                }
            }

            out.by_metric
                .entry(entry.metric_id.clone())
                .or_default()
                .push(value);
        }
    }

    // Attach the first value per (metric, entity) to its row, creating rows
    // for entities that never carried exposed labels.
    for ((metric_id, entity), values) in &out.by_metric_entity {
        let row = out.rows.entry(entity.clone()).or_default();
        row.values.insert(metric_id.clone(), values[0]);
    }

    out
}
