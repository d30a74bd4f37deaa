//! FILENAME: subtotal-engine/src/builder.rs
//! Tree Builder: turns flat records plus a grouping configuration into a
//! `Tree`.
//!
//! Rows are partitioned level by level. At each level one child node is
//! created per distinct group key, in the order the keys are first seen, and
//! the rows are recursively partitioned by the remaining levels. Rows at the
//! last level become the leaf's `ultimate_children`.

use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::definition::{find_column, ColumnDef, ColumnTag, GroupBySpec, Record};
use crate::error::{Result, TableError};
use crate::filter::propagate_hidden;
use crate::partition::Partition;
use crate::tree::{DetailRow, NodeId, RowId, Tree, TreeNode, ROOT};
use crate::value::Value;

/// One resolved grouping level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLevel {
    /// Column whose value (or bucket) is the group key at this level.
    pub column: ColumnTag,
    /// Bucketing applied to the raw value, if any.
    pub partition: Option<Partition>,
}

impl GroupLevel {
    /// Group key for a raw cell value.
    pub fn key_for(&self, raw: &Value) -> Value {
        match &self.partition {
            Some(partition) => partition.key_for(raw),
            None => raw.clone(),
        }
    }

    /// Summary label for a group key produced by `key_for`.
    pub fn label_for(&self, key: &Value) -> String {
        match (&self.partition, key) {
            (Some(partition), Value::Number(bucket)) => partition.bucket_label(*bucket as usize),
            _ => key.label(),
        }
    }
}

/// Validates a grouping configuration and resolves its bucket specs.
///
/// Fails with a configuration error before anything is mutated if a grouping
/// column is unknown. Date frequencies scan `records` for their range.
pub fn resolve_group_levels<'a>(
    columns: &[ColumnDef],
    records: impl Iterator<Item = &'a Record> + Clone,
    group_by: &[GroupBySpec],
) -> Result<Vec<GroupLevel>> {
    group_by
        .iter()
        .map(|spec| {
            let column = find_column(columns, &spec.column)
                .ok_or_else(|| TableError::configuration(&spec.column, "group by"))?;
            let partition = spec
                .buckets
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .map(|b| Partition::resolve(column, b, records.clone()));
            Ok(GroupLevel { column: column.tag.clone(), partition })
        })
        .collect()
}

fn validate_columns(columns: &[ColumnDef]) -> Result<()> {
    for column in columns {
        if let Some(weight) = &column.weight_by {
            if find_column(columns, weight).is_none() {
                return Err(TableError::configuration(weight, format!("weight of '{}'", column.tag)));
            }
        }
    }
    Ok(())
}

/// Builds a tree from input records.
///
/// With an empty `group_by` the root owns every row directly, in input
/// order.
pub fn build(columns: Vec<ColumnDef>, records: Vec<Record>, group_by: &[GroupBySpec]) -> Result<Tree> {
    validate_columns(&columns)?;
    let levels = resolve_group_levels(&columns, records.iter(), group_by)?;

    let rows = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| DetailRow::new(record, i))
        .collect();
    let mut tree = Tree::from_parts(columns, rows);
    install_levels(&mut tree, levels);

    debug!(
        "built tree: {} rows, {} levels, {} nodes",
        tree.row_count(),
        tree.group_levels().len(),
        tree.node_count()
    );
    Ok(tree)
}

impl Tree {
    /// Rebuilds the node hierarchy over the tree's own rows with a new
    /// grouping configuration.
    ///
    /// Rows keep their identity and filter state; node handles from before
    /// the call are invalidated. Child order follows input order, so callers
    /// re-apply any sort afterwards.
    pub fn regroup(&mut self, group_by: &[GroupBySpec]) -> Result<()> {
        let levels = resolve_group_levels(&self.columns, self.rows.iter().map(DetailRow::record), group_by)?;
        for row in &mut self.rows {
            row.hidden_by_single_subtotal_row = false;
        }
        install_levels(self, levels);
        propagate_hidden(self);
        self.touch();

        debug!("regrouped by {} levels: {} nodes", self.levels.len(), self.nodes.len());
        Ok(())
    }
}

fn install_levels(tree: &mut Tree, levels: Vec<GroupLevel>) {
    tree.nodes = vec![TreeNode::root()];
    tree.levels = levels;
    let all: Vec<RowId> = (0..tree.rows.len() as u32).map(RowId).collect();
    populate(tree, ROOT, all, 0);
}

fn populate(tree: &mut Tree, parent: NodeId, rows: Vec<RowId>, depth: usize) {
    if depth == tree.levels.len() {
        tree.nodes[parent.index()].ultimate_children = rows;
        tree.reindex_rows(parent);
        return;
    }

    let level = tree.levels[depth].clone();
    let mut slot_of: FxHashMap<Value, usize> = FxHashMap::default();
    let mut groups: Vec<(Value, Vec<RowId>)> = Vec::new();
    for row_id in rows {
        let key = level.key_for(tree.rows[row_id.index()].get(&level.column));
        match slot_of.get(&key) {
            Some(&slot) => groups[slot].1.push(row_id),
            None => {
                slot_of.insert(key.clone(), groups.len());
                groups.push((key, vec![row_id]));
            }
        }
    }

    let parent_path = tree.nodes[parent.index()].sector_path.clone();
    for (key, members) in groups {
        let label = level.label_for(&key);
        let id = NodeId(tree.nodes.len() as u32);
        tree.nodes.push(TreeNode::group(parent, &parent_path, key, label, &level.column));
        tree.nodes[parent.index()].children.push(id);
        populate(tree, id, members, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector::SectorPath;

    fn create_test_columns() -> Vec<ColumnDef> {
        vec![ColumnDef::new("country", "Country"), ColumnDef::new("x", "X")]
    }

    fn create_test_records() -> Vec<Record> {
        [("US", 1.0), ("UK", 3.0), ("US", 2.0)]
            .into_iter()
            .map(|(country, x)| {
                let mut r = Record::default();
                r.insert("country".to_string(), Value::from(country));
                r.insert("x".to_string(), Value::Number(x));
                r
            })
            .collect()
    }

    #[test]
    fn test_no_grouping_root_owns_rows() {
        let tree = build(create_test_columns(), create_test_records(), &[]).unwrap();
        let root = tree.node(tree.root()).unwrap();
        assert!(root.children().is_empty());
        assert_eq!(root.ultimate_children().len(), 3);
        for (i, id) in root.ultimate_children().iter().enumerate() {
            let row = tree.row(*id).unwrap();
            assert_eq!(row.index_in_parent(), i);
            assert_eq!(row.row_count(), i);
            assert!(row.sector_path().is_root());
        }
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let tree = build(create_test_columns(), create_test_records(), &[GroupBySpec::new("country")]).unwrap();
        let root = tree.node(tree.root()).unwrap();
        let labels: Vec<&str> = root.children().iter().map(|c| tree.node(*c).unwrap().label()).collect();
        assert_eq!(labels, vec!["US", "UK"]);

        let us = tree.node(root.children()[0]).unwrap();
        let xs: Vec<f64> = us
            .ultimate_children()
            .iter()
            .map(|r| tree.row(*r).unwrap().get("x").as_f64().unwrap())
            .collect();
        assert_eq!(xs, vec![1.0, 2.0]);
        assert_eq!(us.sector_path(), &SectorPath::from(["US"]));
    }

    #[test]
    fn test_unknown_group_column_fails() {
        let err = build(create_test_columns(), create_test_records(), &[GroupBySpec::new("nope")]).unwrap_err();
        assert!(matches!(err, TableError::Configuration { ref column, .. } if column == "nope"));
    }

    #[test]
    fn test_unknown_weight_column_fails() {
        let columns = vec![ColumnDef::new("x", "X").with_weight_by("w")];
        assert!(build(columns, Vec::new(), &[]).is_err());
    }

    #[test]
    fn test_no_coercion_between_key_types() {
        let mut a = Record::default();
        a.insert("k".to_string(), Value::Number(1.0));
        let mut b = Record::default();
        b.insert("k".to_string(), Value::text("1"));
        let tree = build(vec![ColumnDef::new("k", "K")], vec![a, b], &[GroupBySpec::new("k")]).unwrap();
        assert_eq!(tree.node(tree.root()).unwrap().children().len(), 2);
    }

    #[test]
    fn test_bucketed_grouping_uses_bucket_labels() {
        let columns = vec![ColumnDef::new("x", "X")];
        let records: Vec<Record> = [25.0, 5.0, 15.0, 7.0]
            .into_iter()
            .map(|x| {
                let mut r = Record::default();
                r.insert("x".to_string(), Value::Number(x));
                r
            })
            .collect();
        let tree = build(columns, records, &[GroupBySpec::bucketed("x", "10,20")]).unwrap();
        let root = tree.node(tree.root()).unwrap();
        let groups: Vec<(String, usize)> = root
            .children()
            .iter()
            .map(|c| {
                let n = tree.node(*c).unwrap();
                (n.label().to_string(), n.ultimate_children().len())
            })
            .collect();
        assert_eq!(
            groups,
            vec![(">= 20".to_string(), 1), ("< 10".to_string(), 2), ("10 - 20".to_string(), 1)]
        );
    }

    #[test]
    fn test_regroup_keeps_rows_and_bumps_version() {
        let mut tree = build(create_test_columns(), create_test_records(), &[]).unwrap();
        let before = tree.version();
        tree.regroup(&[GroupBySpec::new("country")]).unwrap();
        assert!(tree.version() > before);
        assert_eq!(tree.node(tree.root()).unwrap().children().len(), 2);
        assert_eq!(tree.rows_under(tree.root()).len(), 3);

        assert!(tree.regroup(&[GroupBySpec::new("missing")]).is_err());
        assert_eq!(tree.group_levels().len(), 1);
    }
}
