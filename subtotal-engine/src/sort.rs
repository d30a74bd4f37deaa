//! FILENAME: subtotal-engine/src/sort.rs
//! Sort Engine: stable multi-key ordering of a node's children.
//!
//! Group nodes are ordered by their summary value for each key column (their
//! own sector title when the column is the level's grouping column, else the
//! subtotal). Detail rows are ordered by their cell values, or by a column's
//! custom comparator when it has one. Sorting only permutes child lists;
//! node and row handles are untouched.

use std::cmp::Ordering;

use log::debug;

use crate::aggregate::refresh_row_data;
use crate::definition::{find_column, ColumnDef, SortColumn, SortSpec, ValueFormat};
use crate::error::{Result, TableError};
use crate::tree::{DetailRow, NodeId, Tree, TreeNode};
use crate::value::{compare_f64, Value};

/// A sort spec with its column resolved. `column` is `None` for the group
/// label key.
struct SortKey {
    column: Option<ColumnDef>,
    ascending: bool,
}

impl SortKey {
    fn directed(&self, ordering: Ordering) -> Ordering {
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Type-aware comparison by column format. Values without a reading for the
/// format sort after those with one.
pub fn compare_by_format(format: ValueFormat, a: &Value, b: &Value) -> Ordering {
    let readable = |x: Option<f64>, y: Option<f64>| match (x, y) {
        (Some(x), Some(y)) => Some(compare_f64(x, y)),
        (Some(_), None) => Some(Ordering::Less),
        (None, Some(_)) => Some(Ordering::Greater),
        (None, None) => None,
    };
    let ordering = match format {
        ValueFormat::Number | ValueFormat::Currency => readable(number_of(a), number_of(b)),
        ValueFormat::Date => match (a.as_date(), b.as_date()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            (Some(_), None) => Some(Ordering::Less),
            (None, Some(_)) => Some(Ordering::Greater),
            (None, None) => None,
        },
        ValueFormat::Plain => None,
    };
    ordering.unwrap_or_else(|| a.natural_cmp(b))
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Date(_) => None,
        other => other.as_f64(),
    }
}

fn resolve_keys(tree: &Tree, specs: &[SortSpec]) -> Result<Vec<SortKey>> {
    specs
        .iter()
        .map(|spec| {
            let column = match &spec.column {
                SortColumn::GroupLabel => None,
                SortColumn::Column(tag) => Some(
                    find_column(&tree.columns, tag)
                        .cloned()
                        .ok_or_else(|| TableError::configuration(tag, "sort"))?,
                ),
            };
            Ok(SortKey { column, ascending: spec.ascending })
        })
        .collect()
}

/// Sorts the children of `node` (or its detail rows, for a leaf group) by
/// `specs`, earlier specs taking priority. With `recursive` every node in
/// the subtree is sorted the same way.
pub fn sort_children(tree: &mut Tree, node: NodeId, specs: &[SortSpec], recursive: bool) -> Result<()> {
    let keys = resolve_keys(tree, specs)?;
    tree.node(node)?;
    if keys.iter().any(|k| k.column.is_some()) {
        refresh_row_data(tree);
    }

    let targets = if recursive { tree.preorder(node) } else { vec![node] };
    for id in targets {
        sort_one(tree, id, &keys);
    }
    tree.touch();

    debug!("sorted {:?} by {} keys (recursive={})", node, keys.len(), recursive);
    Ok(())
}

/// Orders sibling groups at every level by their own labels.
pub fn sort_by_subtotals(tree: &mut Tree, ascending: bool) -> Result<()> {
    let root = tree.root();
    sort_children(tree, root, &[SortSpec::group_label(ascending)], true)
}

fn sort_one(tree: &mut Tree, id: NodeId, keys: &[SortKey]) {
    let node = &tree.nodes[id.index()];
    if node.has_child() {
        let mut children = node.children.clone();
        children.sort_by(|a, b| {
            let (a, b) = (&tree.nodes[a.index()], &tree.nodes[b.index()]);
            keys.iter()
                .fold(Ordering::Equal, |acc, key| acc.then_with(|| key.directed(compare_nodes(tree, a, b, key))))
        });
        tree.nodes[id.index()].children = children;
    } else {
        let mut rows = node.ultimate_children.clone();
        rows.sort_by(|a, b| {
            let (a, b) = (&tree.rows[a.index()], &tree.rows[b.index()]);
            keys.iter()
                .fold(Ordering::Equal, |acc, key| acc.then_with(|| key.directed(compare_rows(a, b, key))))
        });
        tree.nodes[id.index()].ultimate_children = rows;
        tree.reindex_rows(id);
    }
}

fn compare_nodes(tree: &Tree, a: &TreeNode, b: &TreeNode, key: &SortKey) -> Ordering {
    let title = |n: &TreeNode| n.sector_title.clone().unwrap_or_default();
    match &key.column {
        None => {
            let (ta, tb) = (title(a), title(b));
            if let (Value::Number(x), Value::Number(y)) = (&ta, &tb) {
                return compare_f64(*x, *y);
            }
            let format = a
                .group_column
                .as_deref()
                .and_then(|tag| find_column(&tree.columns, tag))
                .map_or(ValueFormat::Plain, |c| c.format);
            compare_by_format(format, &ta, &tb)
        }
        Some(column) => {
            let value = |n: &TreeNode| {
                if n.group_column.as_deref() == Some(column.tag.as_str()) {
                    title(n)
                } else {
                    n.row_data.get(&column.tag).clone()
                }
            };
            compare_by_format(column.format, &value(a), &value(b))
        }
    }
}

fn compare_rows(a: &DetailRow, b: &DetailRow, key: &SortKey) -> Ordering {
    let Some(column) = &key.column else {
        return Ordering::Equal;
    };
    match &column.comparator {
        Some(comparator) => comparator.compare(&a.record, &b.record),
        None => compare_by_format(column.format, a.get(&column.tag), b.get(&column.tag)),
    }
}

/// Puts every child list back into input order: rows by input position,
/// groups by their earliest row, which is the order the builder creates
/// them in.
pub fn restore_input_order(tree: &mut Tree) {
    let order = tree.preorder(tree.root());
    for id in order.into_iter().rev() {
        let node = &tree.nodes[id.index()];
        if node.has_child() {
            let mut children = node.children.clone();
            children.sort_by_key(|c| first_row(tree, *c));
            tree.nodes[id.index()].children = children;
        } else {
            let mut rows = node.ultimate_children.clone();
            rows.sort_by_key(|r| tree.rows[r.index()].row_count);
            tree.nodes[id.index()].ultimate_children = rows;
            tree.reindex_rows(id);
        }
    }
    tree.touch();
    debug!("restored input order");
}

fn first_row(tree: &Tree, id: NodeId) -> usize {
    tree.rows_under(id)
        .iter()
        .map(|r| tree.rows[r.index()].row_count)
        .min()
        .unwrap_or(usize::MAX)
}

/// Adds `added` to a sort list. A column already present keeps its priority
/// and takes the new direction; the group label key replaces the whole list.
pub fn merge_sort_specs(current: &[SortSpec], added: SortSpec) -> Vec<SortSpec> {
    if added.column == SortColumn::GroupLabel {
        return vec![added];
    }
    let mut merged = current.to_vec();
    match merged.iter_mut().find(|s| s.column == added.column) {
        Some(existing) => existing.ascending = added.ascending,
        None => merged.push(added),
    }
    merged
}
