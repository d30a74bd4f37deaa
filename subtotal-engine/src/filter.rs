//! FILENAME: subtotal-engine/src/filter.rs
//! Filter Engine.
//!
//! Within one column the predicates are OR-ed; across columns the filters
//! AND together, so a row is hidden as soon as one active column filter
//! rejects it. Hidden state is then propagated bottom-up: a node is hidden
//! iff every child (or every owned row) is hidden.
//!
//! Evaluation always completes before any flag is written, so a failing
//! custom filterer leaves the tree exactly as it was.

use log::debug;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::definition::{
    find_column, ColumnDef, ColumnTag, CustomFilterer, FilterPredicate, FilteringOptions, Record, ValueFormat,
};
use crate::error::{Result, TableError};
use crate::tree::{NodeId, Tree, ROOT};
use crate::value::{parse_date, Value};

// ============================================================================
// MATCHING
// ============================================================================

/// Default matching of one record against a column's predicates.
pub fn row_matches(record: &Record, column: &ColumnDef, predicates: &[FilterPredicate], case_sensitive: bool) -> bool {
    let value = record.get(&column.tag).unwrap_or(&Value::Empty);
    predicates
        .iter()
        .any(|predicate| predicate_matches(value, column.format, predicate, case_sensitive))
}

fn predicate_matches(value: &Value, format: ValueFormat, predicate: &FilterPredicate, case_sensitive: bool) -> bool {
    match predicate {
        FilterPredicate::Number(n) => numeric(value).is_some_and(|v| v == *n),
        FilterPredicate::Comparison(cmp) => numeric(value).is_some_and(|v| cmp.holds(v)),
        FilterPredicate::Text(text) => match format {
            ValueFormat::Number | ValueFormat::Currency => match text.trim().parse::<f64>() {
                Ok(n) => numeric(value).is_some_and(|v| v == n),
                Err(_) => text_equals(&value.display(), text, case_sensitive),
            },
            ValueFormat::Date => match parse_date(text) {
                Some(date) => value.as_date() == Some(date),
                None => text_equals(&value.display(), text, case_sensitive),
            },
            ValueFormat::Plain => text_contains(&value.display(), text, case_sensitive),
        },
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Date(_) => None,
        other => other.as_f64(),
    }
}

fn text_equals(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack == needle
    } else {
        haystack.to_lowercase() == needle.to_lowercase()
    }
}

fn text_contains(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Marks `hidden[i]` for every not-yet-hidden row the column filter rejects.
fn evaluate_into(
    tree: &Tree,
    hidden: &mut [bool],
    column: &ColumnDef,
    predicates: &[FilterPredicate],
    case_sensitive: bool,
    custom: Option<&CustomFilterer>,
) -> Result<()> {
    for (row, is_hidden) in tree.rows.iter().zip(hidden.iter_mut()) {
        if *is_hidden {
            continue;
        }
        let keep = match custom {
            Some(filterer) => (filterer.0)(&row.record, column, predicates, case_sensitive).map_err(|source| {
                TableError::FilterEvaluation { column: column.tag.clone(), source }
            })?,
            None => row_matches(&row.record, column, predicates, case_sensitive),
        };
        if !keep {
            *is_hidden = true;
        }
    }
    Ok(())
}

fn lookup_column(tree: &Tree, tag: &str) -> Result<ColumnDef> {
    find_column(&tree.columns, tag)
        .cloned()
        .ok_or_else(|| TableError::configuration(tag, "filter"))
}

fn commit(tree: &mut Tree, hidden: Vec<bool>) {
    for (row, is_hidden) in tree.rows.iter_mut().zip(hidden) {
        row.hidden_by_filter = is_hidden;
    }
    propagate_hidden(tree);
    tree.touch();
}

// ============================================================================
// TREE OPERATIONS
// ============================================================================

/// Applies one column filter on top of whatever is already hidden.
///
/// An empty predicate list is a no-op.
pub fn filter_by_column(
    tree: &mut Tree,
    tag: &str,
    predicates: &[FilterPredicate],
    case_sensitive: bool,
    custom: Option<&CustomFilterer>,
) -> Result<()> {
    let column = lookup_column(tree, tag)?;
    if predicates.is_empty() {
        return Ok(());
    }
    let mut hidden: Vec<bool> = tree.rows.iter().map(|r| r.hidden_by_filter).collect();
    evaluate_into(tree, &mut hidden, &column, predicates, case_sensitive, custom)?;
    commit(tree, hidden);

    debug!(
        "filtered '{}' by {} predicates: {} rows hidden",
        tag,
        predicates.len(),
        tree.rows.iter().filter(|r| r.hidden_by_filter).count()
    );
    Ok(())
}

/// Recomputes `hidden_by_filter` on every node from the rows up.
pub fn propagate_hidden(tree: &mut Tree) {
    propagate_node(tree, ROOT);
}

fn propagate_node(tree: &mut Tree, id: NodeId) -> bool {
    let children = tree.nodes[id.index()].children.clone();
    let hidden = if children.is_empty() {
        let owned = &tree.nodes[id.index()].ultimate_children;
        !owned.is_empty() && owned.iter().all(|r| tree.rows[r.index()].hidden_by_filter)
    } else {
        // visit every child so their flags are refreshed too
        children
            .into_iter()
            .fold(true, |all_hidden, child| propagate_node(tree, child) && all_hidden)
    };
    tree.nodes[id.index()].hidden_by_filter = hidden;
    hidden
}

/// Unhides every node and row.
pub fn clear_filters(tree: &mut Tree) {
    for row in &mut tree.rows {
        row.hidden_by_filter = false;
    }
    for node in &mut tree.nodes {
        node.hidden_by_filter = false;
    }
    tree.touch();
    debug!("cleared all filters");
}

/// Distinct values of a column among the rows currently visible, in natural
/// order. Used to build filter pick-lists.
pub fn filter_values(tree: &Tree, tag: &str) -> Result<Vec<Value>> {
    let column = lookup_column(tree, tag)?;
    let mut seen = FxHashSet::default();
    let mut values: Vec<Value> = tree
        .rows
        .iter()
        .filter(|r| !r.hidden_by_filter)
        .map(|r| r.get(&column.tag).clone())
        .filter(|v| seen.insert(v.clone()))
        .collect();
    values.sort_by(|a, b| a.natural_cmp(b));
    Ok(values)
}

// ============================================================================
// ACTIVE FILTER LIST
// ============================================================================

/// A column filter as the user applied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFilter {
    #[serde(rename = "colTag")]
    pub column: ColumnTag,
    pub predicates: Vec<FilterPredicate>,
}

/// Ordered list of active column filters.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<ActiveFilter>,
}

impl FilterSet {
    pub fn new() -> Self {
        FilterSet::default()
    }

    pub fn filters(&self) -> &[ActiveFilter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn is_filtered(&self, column: &str) -> bool {
        self.filters.iter().any(|f| f.column == column)
    }

    /// Adds a column filter. A column that is already filtered has its old
    /// filter removed first; empty predicates just remove it.
    pub fn apply(
        &mut self,
        tree: &mut Tree,
        column: &str,
        predicates: Vec<FilterPredicate>,
        options: &FilteringOptions,
    ) -> Result<()> {
        lookup_column(tree, column)?;

        if self.is_filtered(column) {
            let mut next: Vec<ActiveFilter> = self.filters.iter().filter(|f| f.column != column).cloned().collect();
            if !predicates.is_empty() {
                next.push(ActiveFilter { column: column.to_string(), predicates });
            }
            replay(tree, &next, options)?;
            self.filters = next;
            return Ok(());
        }

        if predicates.is_empty() {
            return Ok(());
        }
        filter_by_column(tree, column, &predicates, options.case_sensitive, options.custom_filterer.as_ref())?;
        self.filters.push(ActiveFilter { column: column.to_string(), predicates });
        Ok(())
    }

    /// Removes one column's filter and replays the rest in order. Returns
    /// whether a filter was removed.
    pub fn remove(&mut self, tree: &mut Tree, column: &str, options: &FilteringOptions) -> Result<bool> {
        if !self.is_filtered(column) {
            return Ok(false);
        }
        let next: Vec<ActiveFilter> = self.filters.iter().filter(|f| f.column != column).cloned().collect();
        replay(tree, &next, options)?;
        self.filters = next;
        Ok(true)
    }

    pub fn clear(&mut self, tree: &mut Tree) {
        self.filters.clear();
        clear_filters(tree);
    }

    /// Re-applies the active filters from scratch, e.g. after the rows were
    /// replaced.
    pub fn reapply(&self, tree: &mut Tree, options: &FilteringOptions) -> Result<()> {
        replay(tree, &self.filters, options)
    }
}

/// Recomputes every row's hidden flag from `filters` in application order.
fn replay(tree: &mut Tree, filters: &[ActiveFilter], options: &FilteringOptions) -> Result<()> {
    let mut hidden = vec![false; tree.rows.len()];
    for filter in filters {
        let column = lookup_column(tree, &filter.column)?;
        evaluate_into(
            tree,
            &mut hidden,
            &column,
            &filter.predicates,
            options.case_sensitive,
            options.custom_filterer.as_ref(),
        )?;
    }
    commit(tree, hidden);
    debug!("replayed {} filters", filters.len());
    Ok(())
}
