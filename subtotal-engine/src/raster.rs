//! FILENAME: subtotal-engine/src/raster.rs
//! Rasterizer: flattens the tree into the ordered rows a renderer shows.
//!
//! The walk is depth-first pre-order. Each node first contributes its
//! summary row, then (unless collapsed in display mode) either its child
//! subtrees or its own detail rows. The root's summary row is the grand
//! total and always comes first.

use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::aggregate::refresh_row_data;
use crate::definition::{ColumnTag, SingletonPolicy, TableOptions};
use crate::sector::SectorPath;
use crate::tree::{NodeId, RowId, Tree, TreeNode, ROOT};
use crate::value::Value;

// ============================================================================
// OPTIONS
// ============================================================================

/// On-screen display honors collapse state; export always descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RasterMode {
    #[default]
    Display,
    Export,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RasterOptions {
    #[serde(default)]
    pub mode: RasterMode,

    /// Emit no summary rows at all, grand total included.
    #[serde(default)]
    pub skip_subtotal_rows: bool,

    /// Export only: emit summary rows without their detail rows.
    #[serde(default)]
    pub skip_detail_rows: bool,

    /// Emit detail rows even when the singleton rule would hide them.
    #[serde(default)]
    pub show_hidden_single_detail_row: bool,

    #[serde(default)]
    pub hide_single_subtotal_child: bool,

    #[serde(default)]
    pub singleton_policy: SingletonPolicy,

    /// Groups whose key is empty get no summary row.
    #[serde(default)]
    pub jagged_tree: bool,
}

impl RasterOptions {
    pub fn display(options: &TableOptions) -> Self {
        RasterOptions {
            mode: RasterMode::Display,
            hide_single_subtotal_child: options.hide_single_subtotal_child,
            singleton_policy: options.singleton_policy,
            jagged_tree: options.jagged_tree,
            ..RasterOptions::default()
        }
    }

    pub fn export(options: &TableOptions) -> Self {
        RasterOptions { mode: RasterMode::Export, ..RasterOptions::display(options) }
    }
}

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// A rasterized group (or grand total) row.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub node: NodeId,
    pub sector_path: SectorPath,
    pub label: String,
    /// 0 for the grand total, 1 for the outermost groups.
    pub depth: usize,
    pub collapsed: bool,
    pub no_collapse_icon: bool,
    pub is_grand_total: bool,
    /// Subtotals by column tag.
    pub values: FxHashMap<ColumnTag, Value>,
    /// Visible detail rows aggregated into this row.
    pub row_count: usize,
}

impl SummaryRow {
    pub fn get(&self, tag: &str) -> &Value {
        self.values.get(tag).unwrap_or(&Value::Empty)
    }
}

/// A rasterized input record. The record itself is read from the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailRowRef {
    pub row: RowId,
    pub parent: NodeId,
    pub index_in_parent: usize,
    pub sector_path: SectorPath,
    /// Position of the record in the input data.
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RasterRow {
    Summary(SummaryRow),
    Detail(DetailRowRef),
}

impl RasterRow {
    pub fn is_detail(&self) -> bool {
        matches!(self, RasterRow::Detail(_))
    }

    pub fn sector_path(&self) -> &SectorPath {
        match self {
            RasterRow::Summary(s) => &s.sector_path,
            RasterRow::Detail(d) => &d.sector_path,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryRow> {
        match self {
            RasterRow::Summary(s) => Some(s),
            RasterRow::Detail(_) => None,
        }
    }

    pub fn as_detail(&self) -> Option<&DetailRowRef> {
        match self {
            RasterRow::Detail(d) => Some(d),
            RasterRow::Summary(_) => None,
        }
    }
}

/// The ordered output of one rasterization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Raster {
    rows: Vec<RasterRow>,
}

impl Raster {
    pub fn rows(&self) -> &[RasterRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<RasterRow> {
        self.rows
    }

    /// Splits off the leading grand total row unless `disable_grand_total`.
    pub fn split_grand_total(self, disable_grand_total: bool) -> (Option<SummaryRow>, Vec<RasterRow>) {
        let mut rows = self.rows;
        if !disable_grand_total {
            if let Some(RasterRow::Summary(total)) = rows.first() {
                if total.is_grand_total {
                    let total = total.clone();
                    rows.remove(0);
                    return (Some(total), rows);
                }
            }
        }
        (None, rows)
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// Rasterizes the whole tree.
///
/// Refreshes the derived `row_data` and singleton flags on the way; the
/// structural version is left alone.
pub fn rasterize(tree: &mut Tree, options: &RasterOptions) -> Raster {
    refresh_row_data(tree);
    mark_singletons(tree, options);

    let mut rows = Vec::new();
    walk(tree, ROOT, options, &mut rows);
    debug!("rasterized {} rows ({:?})", rows.len(), options.mode);
    Raster { rows }
}

/// Whether the walk emits a summary row for `node`.
fn emits_summary(node: &TreeNode, options: &RasterOptions) -> bool {
    let jagged_gap = options.jagged_tree && node.sector_title.as_ref().is_some_and(Value::is_empty);
    !options.skip_subtotal_rows && node.display && !jagged_gap
}

/// Applies the "hide singleton subtotal child" rule to every leaf group.
/// A group without a summary row keeps its detail row, or the record would
/// vanish from the output.
fn mark_singletons(tree: &mut Tree, options: &RasterOptions) {
    let enabled = options.hide_single_subtotal_child && tree.has_subtotals();
    for index in 1..tree.nodes.len() {
        if tree.nodes[index].has_child() {
            continue;
        }
        let enabled = enabled && emits_summary(&tree.nodes[index], options);
        let owned = tree.nodes[index].ultimate_children.clone();
        let counted: Vec<RowId> = match options.singleton_policy {
            SingletonPolicy::AfterFilter => owned
                .iter()
                .copied()
                .filter(|r| !tree.rows[r.index()].hidden_by_filter)
                .collect(),
            SingletonPolicy::BeforeFilter => owned.clone(),
        };
        let singleton = enabled && counted.len() == 1;
        tree.nodes[index].no_collapse_icon = singleton;
        for row in owned {
            tree.rows[row.index()].hidden_by_single_subtotal_row = singleton && counted.contains(&row);
        }
    }
}

fn walk(tree: &Tree, id: NodeId, options: &RasterOptions, out: &mut Vec<RasterRow>) {
    let node = &tree.nodes[id.index()];
    let export = options.mode == RasterMode::Export;

    if emits_summary(node, options) {
        let data = &node.row_data;
        out.push(RasterRow::Summary(SummaryRow {
            node: id,
            sector_path: node.sector_path.clone(),
            label: data.label.clone(),
            depth: node.depth(),
            collapsed: node.collapsed,
            no_collapse_icon: node.no_collapse_icon,
            is_grand_total: id == ROOT,
            values: data.values.clone(),
            row_count: data.visible_rows,
        }));
    }

    if !export && node.collapsed {
        return;
    }

    if node.has_child() {
        for child in &node.children {
            if !tree.nodes[child.index()].hidden_by_filter {
                walk(tree, *child, options, out);
            }
        }
        return;
    }

    if export && options.skip_detail_rows {
        return;
    }
    let singleton_applies = tree.has_subtotals() && !options.show_hidden_single_detail_row;
    for (i, row_id) in node.ultimate_children.iter().enumerate() {
        let row = &tree.rows[row_id.index()];
        if row.hidden_by_filter || (singleton_applies && row.hidden_by_single_subtotal_row) {
            continue;
        }
        out.push(RasterRow::Detail(DetailRowRef {
            row: *row_id,
            parent: id,
            index_in_parent: i,
            sector_path: node.sector_path.clone(),
            row_count: row.row_count,
        }));
    }
}
