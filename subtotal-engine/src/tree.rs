//! FILENAME: subtotal-engine/src/tree.rs
//! The grouping tree: summary nodes over detail rows.
//!
//! Nodes and detail rows live in two arenas owned by `Tree`. Ownership runs
//! top-down only: a node lists its children (or its detail rows) by handle,
//! and the `parent` handle on nodes and rows is a lookup relation, never an
//! owner. Handles stay valid across sort, filter and collapse; a regroup or a
//! rebuild invalidates node handles.
//!
//! Every structural mutation bumps `version` so cached rasterizations can be
//! invalidated by comparing counters.

use serde::{Deserialize, Serialize};

use crate::aggregate::SummaryData;
use crate::builder::GroupLevel;
use crate::definition::{find_column, ColumnDef, Record};
use crate::error::{Result, TableError};
use crate::sector::SectorPath;
use crate::value::Value;

// ============================================================================
// HANDLES
// ============================================================================

/// Handle to a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a detail row in a [`Tree`]. Equal to the row's input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub(crate) u32);

impl RowId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ============================================================================
// NODES AND ROWS
// ============================================================================

/// One group level in the hierarchy (or the synthetic root).
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub(crate) sector_path: SectorPath,
    /// The group key this node represents. `None` only for the root.
    pub(crate) sector_title: Option<Value>,
    /// Display text for the key (bucket label for partitioned levels).
    pub(crate) label: String,
    /// Tag of the column this level groups by.
    pub(crate) group_column: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) ultimate_children: Vec<RowId>,
    pub(crate) collapsed: bool,
    pub(crate) hidden_by_filter: bool,
    pub(crate) display: bool,
    pub(crate) no_collapse_icon: bool,
    pub(crate) row_data: SummaryData,
}

impl TreeNode {
    pub(crate) fn root() -> Self {
        TreeNode {
            sector_path: SectorPath::root(),
            sector_title: None,
            label: String::new(),
            group_column: None,
            parent: None,
            children: Vec::new(),
            ultimate_children: Vec::new(),
            collapsed: false,
            hidden_by_filter: false,
            display: true,
            no_collapse_icon: false,
            row_data: SummaryData::default(),
        }
    }

    pub(crate) fn group(parent: NodeId, parent_path: &SectorPath, key: Value, label: String, column: &str) -> Self {
        TreeNode {
            sector_path: parent_path.child(key.clone()),
            sector_title: Some(key),
            label,
            group_column: Some(column.to_string()),
            parent: Some(parent),
            ..TreeNode::root()
        }
    }

    pub fn sector_path(&self) -> &SectorPath {
        &self.sector_path
    }

    pub fn sector_title(&self) -> Option<&Value> {
        self.sector_title.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn group_column(&self) -> Option<&str> {
        self.group_column.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn ultimate_children(&self) -> &[RowId] {
        &self.ultimate_children
    }

    pub fn has_child(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.sector_title.is_none()
    }

    pub fn depth(&self) -> usize {
        self.sector_path.depth()
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn is_hidden_by_filter(&self) -> bool {
        self.hidden_by_filter
    }

    pub fn display(&self) -> bool {
        self.display
    }

    pub fn no_collapse_icon(&self) -> bool {
        self.no_collapse_icon
    }

    pub fn row_data(&self) -> &SummaryData {
        &self.row_data
    }
}

/// An input record plus the engine's per-row state.
#[derive(Debug, Clone)]
pub struct DetailRow {
    pub(crate) record: Record,
    /// Position in the input data.
    pub(crate) row_count: usize,
    pub(crate) hidden_by_filter: bool,
    pub(crate) hidden_by_single_subtotal_row: bool,
    pub(crate) sector_path: SectorPath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) index_in_parent: usize,
}

impl DetailRow {
    pub(crate) fn new(record: Record, row_count: usize) -> Self {
        DetailRow {
            record,
            row_count,
            hidden_by_filter: false,
            hidden_by_single_subtotal_row: false,
            sector_path: SectorPath::root(),
            parent: None,
            index_in_parent: row_count,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn get(&self, tag: &str) -> &Value {
        self.record.get(tag).unwrap_or(&Value::Empty)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_hidden_by_filter(&self) -> bool {
        self.hidden_by_filter
    }

    pub fn is_hidden_by_single_subtotal_row(&self) -> bool {
        self.hidden_by_single_subtotal_row
    }

    pub fn sector_path(&self) -> &SectorPath {
        &self.sector_path
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn index_in_parent(&self) -> usize {
        self.index_in_parent
    }
}

// ============================================================================
// TREE
// ============================================================================

/// Arena-backed grouping tree.
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<TreeNode>,
    pub(crate) rows: Vec<DetailRow>,
    pub(crate) columns: Vec<ColumnDef>,
    pub(crate) levels: Vec<GroupLevel>,
    version: u64,
}

pub(crate) const ROOT: NodeId = NodeId(0);

impl Tree {
    pub(crate) fn from_parts(columns: Vec<ColumnDef>, rows: Vec<DetailRow>) -> Self {
        Tree {
            nodes: vec![TreeNode::root()],
            rows,
            columns,
            levels: Vec::new(),
            version: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Marks the tree as structurally changed.
    pub(crate) fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn node(&self, id: NodeId) -> Result<&TreeNode> {
        self.nodes.get(id.index()).ok_or(TableError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode> {
        self.nodes.get_mut(id.index()).ok_or(TableError::UnknownNode(id))
    }

    pub fn row(&self, id: RowId) -> Result<&DetailRow> {
        self.rows.get(id.index()).ok_or(TableError::UnknownRow(id))
    }

    pub fn record(&self, id: RowId) -> Result<&Record> {
        self.row(id).map(DetailRow::record)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, tag: &str) -> Result<&ColumnDef> {
        find_column(&self.columns, tag).ok_or_else(|| TableError::configuration(tag, "column lookup"))
    }

    /// The grouping levels this tree was built with, outermost first.
    pub fn group_levels(&self) -> &[GroupLevel] {
        &self.levels
    }

    pub fn has_subtotals(&self) -> bool {
        !self.levels.is_empty()
    }

    /// All nodes below `id` (and `id` itself) in depth-first pre-order.
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.nodes.get(current.index()) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every detail row under `id`, in display order.
    pub fn rows_under(&self, id: NodeId) -> Vec<RowId> {
        self.preorder(id)
            .into_iter()
            .flat_map(|n| self.nodes[n.index()].ultimate_children.iter().copied())
            .collect()
    }

    /// Finds the node with exactly this sector path.
    pub fn find_node(&self, path: &SectorPath) -> Option<NodeId> {
        let mut current = ROOT;
        for depth in 1..=path.depth() {
            let node = &self.nodes[current.index()];
            current = *node
                .children
                .iter()
                .find(|c| self.nodes[c.index()].sector_title.as_ref() == Some(&path[depth - 1]))?;
        }
        Some(current)
    }

    /// Rewrites parent, sector path and index of every row directly owned by
    /// `id`. Needed whenever its `ultimate_children` is reordered.
    pub(crate) fn reindex_rows(&mut self, id: NodeId) {
        let node = &self.nodes[id.index()];
        let path = node.sector_path.clone();
        let owned = node.ultimate_children.clone();
        for (i, row_id) in owned.into_iter().enumerate() {
            let row = &mut self.rows[row_id.index()];
            row.parent = Some(id);
            row.sector_path = path.clone();
            row.index_in_parent = i;
        }
    }

    // ========================================================================
    // COLLAPSE
    // ========================================================================

    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) -> Result<()> {
        self.node_mut(id)?.collapsed = collapsed;
        log::debug!("node {:?} collapsed={}", id, collapsed);
        self.touch();
        Ok(())
    }

    /// Flips the collapsed flag and returns the new state.
    pub fn toggle_collapse(&mut self, id: NodeId) -> Result<bool> {
        let node = self.node_mut(id)?;
        node.collapsed = !node.collapsed;
        let collapsed = node.collapsed;
        log::debug!("node {:?} collapsed={}", id, collapsed);
        self.touch();
        Ok(collapsed)
    }

    /// Collapses every group below the root.
    pub fn collapse_all(&mut self) {
        for node in self.nodes.iter_mut().skip(1) {
            node.collapsed = true;
        }
        self.touch();
    }

    pub fn expand_all(&mut self) {
        for node in self.nodes.iter_mut() {
            node.collapsed = false;
        }
        self.touch();
    }

    /// Expands nodes at depth `<= level` and collapses everything deeper.
    /// The root has depth 0.
    pub fn expand_to_level(&mut self, level: usize) {
        for node in self.nodes.iter_mut() {
            node.collapsed = node.depth() > level;
        }
        self.touch();
    }

    /// Overrides whether a node's summary row is emitted.
    pub fn set_display(&mut self, id: NodeId, display: bool) -> Result<()> {
        self.node_mut(id)?.display = display;
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::definition::GroupBySpec;

    fn record(country: &str, name: &str, x: f64) -> Record {
        let mut r = Record::default();
        r.insert("country".to_string(), Value::from(country));
        r.insert("name".to_string(), Value::from(name));
        r.insert("x".to_string(), Value::Number(x));
        r
    }

    fn sample_tree() -> Tree {
        let columns = vec![
            ColumnDef::new("country", "Country"),
            ColumnDef::new("name", "Name"),
            ColumnDef::new("x", "X"),
        ];
        let rows = vec![
            record("US", "Smith", 1.0),
            record("US", "Jones", 2.0),
            record("UK", "Smith", 3.0),
        ];
        build(columns, rows, &[GroupBySpec::new("country"), GroupBySpec::new("name")]).unwrap()
    }

    #[test]
    fn test_preorder_and_rows_under() {
        let tree = sample_tree();
        let order: Vec<String> = tree
            .preorder(tree.root())
            .into_iter()
            .map(|id| tree.node(id).unwrap().sector_path().key())
            .collect();
        assert_eq!(order, vec!["", "US", "US#Smith", "US#Jones", "UK", "UK#Smith"]);
        assert_eq!(tree.rows_under(tree.root()).len(), 3);
    }

    #[test]
    fn test_find_node_by_path() {
        let tree = sample_tree();
        let id = tree.find_node(&SectorPath::from(["UK", "Smith"])).unwrap();
        let node = tree.node(id).unwrap();
        assert_eq!(node.ultimate_children().len(), 1);
        assert_eq!(tree.find_node(&SectorPath::from(["FR"])), None);
        assert_eq!(tree.find_node(&SectorPath::root()), Some(tree.root()));
    }

    #[test]
    fn test_collapse_operations_bump_version() {
        let mut tree = sample_tree();
        let us = tree.find_node(&SectorPath::from(["US"])).unwrap();
        let before = tree.version();
        assert!(tree.toggle_collapse(us).unwrap());
        assert!(tree.version() > before);
        assert!(!tree.toggle_collapse(us).unwrap());

        tree.collapse_all();
        assert!(!tree.node(tree.root()).unwrap().is_collapsed());
        assert!(tree.node(us).unwrap().is_collapsed());

        tree.expand_to_level(1);
        assert!(!tree.node(us).unwrap().is_collapsed());
        let smith = tree.find_node(&SectorPath::from(["US", "Smith"])).unwrap();
        assert!(tree.node(smith).unwrap().is_collapsed());

        tree.expand_all();
        assert!(!tree.node(smith).unwrap().is_collapsed());
    }

    #[test]
    fn test_stale_handle_is_an_error() {
        let mut tree = sample_tree();
        let bogus = NodeId(999);
        assert!(matches!(tree.node(bogus), Err(TableError::UnknownNode(_))));
        assert!(tree.set_collapsed(bogus, true).is_err());
        assert!(matches!(tree.row(RowId(42)), Err(TableError::UnknownRow(_))));
    }
}
