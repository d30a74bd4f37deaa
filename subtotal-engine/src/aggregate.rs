//! FILENAME: subtotal-engine/src/aggregate.rs
//! Subtotal computation for summary rows.
//!
//! Each node's `row_data` is rebuilt bottom-up: leaf groups fold their visible
//! detail rows into one accumulator per aggregated column, internal nodes
//! merge their children's accumulators. Rows hidden by filter are left out.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::definition::{AggregationMethod, ColumnDef, ColumnTag};
use crate::sector::SectorPath;
use crate::tree::{DetailRow, NodeId, Tree};
use crate::value::Value;

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Running state for one aggregated column within one group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulator {
    pub sum: f64,
    /// Rows folded in, numeric or not.
    pub count: u64,
    pub count_numbers: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub weighted_sum: f64,
    pub weight_total: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Accumulator::default()
    }

    /// Folds in one row's value and, for weighted averages, its weight.
    pub fn add(&mut self, value: &Value, weight: Option<f64>) {
        self.count += 1;
        let Some(n) = value.as_f64().filter(|_| !matches!(value, Value::Date(_))) else {
            return;
        };
        self.count_numbers += 1;
        self.sum += n;
        self.min = Some(self.min.map_or(n, |m| m.min(n)));
        self.max = Some(self.max.map_or(n, |m| m.max(n)));
        if let Some(w) = weight {
            self.weighted_sum += n * w;
            self.weight_total += w;
        }
    }

    pub fn merge(&mut self, other: &Accumulator) {
        self.sum += other.sum;
        self.count += other.count;
        self.count_numbers += other.count_numbers;
        self.min = match (self.min, other.min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.max = match (self.max, other.max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.weighted_sum += other.weighted_sum;
        self.weight_total += other.weight_total;
    }

    /// Final value for the method. `weighted` selects the weighted average.
    pub fn compute(&self, method: AggregationMethod, weighted: bool) -> Value {
        match method {
            AggregationMethod::Sum => Value::Number(self.sum),
            AggregationMethod::Count => Value::Number(self.count as f64),
            AggregationMethod::Average if weighted => {
                if self.weight_total != 0.0 {
                    Value::Number(self.weighted_sum / self.weight_total)
                } else {
                    Value::Empty
                }
            }
            AggregationMethod::Average => {
                if self.count_numbers > 0 {
                    Value::Number(self.sum / self.count_numbers as f64)
                } else {
                    Value::Empty
                }
            }
            AggregationMethod::Min => self.min.map(Value::Number).unwrap_or(Value::Empty),
            AggregationMethod::Max => self.max.map(Value::Number).unwrap_or(Value::Empty),
        }
    }
}

// ============================================================================
// SUMMARY DATA
// ============================================================================

/// The projection shown on a summary row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryData {
    pub sector_path: SectorPath,
    pub label: String,
    /// Aggregates by column tag, plus the group label under the first
    /// column when the table is subtotaled.
    pub values: FxHashMap<ColumnTag, Value>,
    /// Detail rows contributing to the aggregates.
    pub visible_rows: usize,
}

impl SummaryData {
    pub fn get(&self, tag: &str) -> &Value {
        self.values.get(tag).unwrap_or(&Value::Empty)
    }
}

struct AggregatedColumn<'a> {
    column: &'a ColumnDef,
    method: AggregationMethod,
}

/// Recomputes `row_data` for every node in the tree.
pub fn refresh_row_data(tree: &mut Tree) {
    let columns: Vec<ColumnDef> = tree.columns.clone();
    let aggregated: Vec<AggregatedColumn<'_>> = columns
        .iter()
        .filter_map(|column| column.aggregation.map(|method| AggregatedColumn { column, method }))
        .collect();
    let label_column = if tree.has_subtotals() {
        columns.first().map(|c| c.tag.clone())
    } else {
        None
    };
    let root = tree.root();
    refresh_node(tree, root, &aggregated, label_column.as_deref());
}

fn refresh_node(
    tree: &mut Tree,
    id: NodeId,
    aggregated: &[AggregatedColumn<'_>],
    label_column: Option<&str>,
) -> (Vec<Accumulator>, usize) {
    let mut accumulators = vec![Accumulator::new(); aggregated.len()];
    let mut visible = 0;

    let children = tree.nodes[id.index()].children.clone();
    if children.is_empty() {
        for row_id in &tree.nodes[id.index()].ultimate_children {
            let row = &tree.rows[row_id.index()];
            if row.hidden_by_filter {
                continue;
            }
            visible += 1;
            fold_row(&mut accumulators, aggregated, row);
        }
    } else {
        for child in children {
            let (child_acc, child_visible) = refresh_node(tree, child, aggregated, label_column);
            for (acc, other) in accumulators.iter_mut().zip(child_acc.iter()) {
                acc.merge(other);
            }
            visible += child_visible;
        }
    }

    let node = &mut tree.nodes[id.index()];
    let mut values = FxHashMap::default();
    for (agg, acc) in aggregated.iter().zip(accumulators.iter()) {
        values.insert(agg.column.tag.clone(), acc.compute(agg.method, agg.column.weight_by.is_some()));
    }
    if let Some(tag) = label_column.filter(|_| node.sector_title.is_some()) {
        values.insert(tag.to_string(), Value::Text(node.label.clone()));
    }
    node.row_data = SummaryData {
        sector_path: node.sector_path.clone(),
        label: node.label.clone(),
        values,
        visible_rows: visible,
    };

    (accumulators, visible)
}

fn fold_row(accumulators: &mut [Accumulator], aggregated: &[AggregatedColumn<'_>], row: &DetailRow) {
    for (acc, agg) in accumulators.iter_mut().zip(aggregated) {
        let weight = agg
            .column
            .weight_by
            .as_deref()
            .and_then(|w| row.get(w).as_f64());
        // a missing weight only drops the row from the weighted average
        acc.add(row.get(&agg.column.tag), weight);
    }
}
