//! FILENAME: subtotal-engine/src/table.rs
//! Table session controller.
//!
//! `TableState` owns the tree together with the grouping, sort and filter
//! configuration currently in force, and keeps them consistent: a regroup is
//! followed by a re-sort, replaced data is re-sorted and re-filtered, and the
//! rasterized rows are cached against the tree's structural version.

use log::debug;

use crate::builder::build;
use crate::definition::{ColumnDef, FilterPredicate, GroupBySpec, Record, SortColumn, SortSpec, TableOptions};
use crate::error::Result;
use crate::filter::{filter_values, FilterSet};
use crate::paging::PageWindow;
use crate::raster::{rasterize, Raster, RasterOptions, RasterRow, SummaryRow};
use crate::selection::{ClickModifiers, ClickOutcome, Selection};
use crate::sort::{merge_sort_specs, restore_input_order, sort_children};
use crate::tree::{NodeId, Tree};
use crate::value::Value;

/// Display rasterization valid for one tree version.
#[derive(Debug, Clone)]
struct CachedRaster {
    version: u64,
    grand_total: Option<SummaryRow>,
    rows: Vec<RasterRow>,
}

#[derive(Debug)]
pub struct TableState {
    tree: Tree,
    options: TableOptions,
    filters: FilterSet,
    selection: Selection,
    current_page: usize,
    cache: Option<CachedRaster>,
}

impl TableState {
    /// Opens a session: builds the tree with the configured grouping and
    /// applies the configured sort.
    pub fn new(columns: Vec<ColumnDef>, data: Vec<Record>, options: TableOptions) -> Result<Self> {
        let mut tree = build(columns, data, &options.group_by)?;
        apply_sort(&mut tree, &options.sort_by)?;
        let selection = Selection::from_options(&options);
        debug!("opened table with {} rows", tree.row_count());
        Ok(TableState {
            tree,
            options,
            filters: FilterSet::new(),
            selection,
            current_page: 1,
            cache: None,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn group_by(&self) -> &[GroupBySpec] {
        &self.options.group_by
    }

    pub fn sort_by(&self) -> &[SortSpec] {
        &self.options.sort_by
    }

    // ========================================================================
    // DATA AND GROUPING
    // ========================================================================

    /// Swaps in new rows, keeping columns, grouping, sort and filters.
    pub fn replace_data(&mut self, data: Vec<Record>) -> Result<()> {
        let mut tree = build(self.tree.columns().to_vec(), data, &self.options.group_by)?;
        apply_sort(&mut tree, &self.options.sort_by)?;
        self.filters.reapply(&mut tree, &self.options.filtering)?;

        self.tree = tree;
        self.cache = None;
        self.selection.clear();
        self.current_page = 1;
        Ok(())
    }

    /// Adds a grouping level, or changes the buckets of an existing one.
    pub fn subtotal_by(&mut self, column: &str, buckets: Option<&str>) -> Result<()> {
        let mut group_by = self.options.group_by.clone();
        let spec = GroupBySpec { column: column.to_string(), buckets: buckets.map(str::to_string) };
        match group_by.iter_mut().find(|g| g.column == column) {
            Some(existing) => *existing = spec,
            None => group_by.push(spec),
        }
        self.regroup(group_by)
    }

    /// Drops one grouping level.
    pub fn remove_subtotal(&mut self, column: &str) -> Result<()> {
        let group_by = self.options.group_by.iter().filter(|g| g.column != column).cloned().collect();
        self.regroup(group_by)
    }

    /// Drops every grouping level and any group label sort.
    pub fn clear_subtotal(&mut self) -> Result<()> {
        self.options.sort_by.retain(|s| s.column != SortColumn::GroupLabel);
        self.regroup(Vec::new())
    }

    fn regroup(&mut self, group_by: Vec<GroupBySpec>) -> Result<()> {
        self.tree.regroup(&group_by)?;
        self.options.group_by = group_by;
        if !self.tree.has_subtotals() {
            self.options.sort_by.retain(|s| s.column != SortColumn::GroupLabel);
        }
        apply_sort(&mut self.tree, &self.options.sort_by)?;
        self.selection.reset_anchor();
        self.current_page = 1;
        Ok(())
    }

    // ========================================================================
    // SORTING
    // ========================================================================

    /// Adds a sort key with lowest priority (or re-directs an existing one).
    pub fn add_sort(&mut self, spec: SortSpec) -> Result<()> {
        let merged = merge_sort_specs(&self.options.sort_by, spec);
        self.set_sort(merged)
    }

    pub fn set_sort(&mut self, specs: Vec<SortSpec>) -> Result<()> {
        let root = self.tree.root();
        sort_children(&mut self.tree, root, &specs, true)?;
        self.options.sort_by = specs;
        Ok(())
    }

    /// Drops all sort keys and restores input order.
    pub fn clear_sort(&mut self) {
        self.options.sort_by.clear();
        restore_input_order(&mut self.tree);
    }

    // ========================================================================
    // FILTERING
    // ========================================================================

    pub fn apply_filter(&mut self, column: &str, predicates: Vec<FilterPredicate>) -> Result<()> {
        self.filters.apply(&mut self.tree, column, predicates, &self.options.filtering)?;
        self.current_page = 1;
        Ok(())
    }

    pub fn remove_filter(&mut self, column: &str) -> Result<bool> {
        self.filters.remove(&mut self.tree, column, &self.options.filtering)
    }

    pub fn remove_all_filters(&mut self) {
        self.filters.clear(&mut self.tree);
    }

    pub fn set_case_sensitive(&mut self, case_sensitive: bool) -> Result<()> {
        self.options.filtering.case_sensitive = case_sensitive;
        self.filters.reapply(&mut self.tree, &self.options.filtering)
    }

    /// Pick-list values for a column's filter.
    pub fn filter_values(&self, column: &str) -> Result<Vec<Value>> {
        filter_values(&self.tree, column)
    }

    // ========================================================================
    // COLLAPSE
    // ========================================================================

    pub fn toggle_collapse(&mut self, node: NodeId) -> Result<bool> {
        self.tree.toggle_collapse(node)
    }

    pub fn set_collapsed(&mut self, node: NodeId, collapsed: bool) -> Result<()> {
        self.tree.set_collapsed(node, collapsed)
    }

    pub fn collapse_all(&mut self) {
        self.tree.collapse_all();
        self.current_page = 1;
    }

    pub fn expand_all(&mut self) {
        self.tree.expand_all();
    }

    pub fn expand_to_level(&mut self, level: usize) {
        self.tree.expand_to_level(level);
    }

    // ========================================================================
    // RASTER OPTIONS
    // ========================================================================

    pub fn set_hide_single_subtotal_child(&mut self, hide: bool) {
        self.options.hide_single_subtotal_child = hide;
        self.cache = None;
    }

    pub fn set_jagged_tree(&mut self, jagged: bool) {
        self.options.jagged_tree = jagged;
        self.cache = None;
    }

    // ========================================================================
    // OUTPUT
    // ========================================================================

    fn refresh(&mut self) -> &CachedRaster {
        let version = self.tree.version();
        let cached = match self.cache.take() {
            Some(cached) if cached.version == version => cached,
            _ => {
                let raster = rasterize(&mut self.tree, &RasterOptions::display(&self.options));
                let (grand_total, rows) = raster.split_grand_total(self.options.disable_grand_total);
                CachedRaster { version, grand_total, rows }
            }
        };
        self.cache.insert(cached)
    }

    /// Display rows below the grand total.
    pub fn rows(&mut self) -> &[RasterRow] {
        &self.refresh().rows
    }

    pub fn grand_total(&mut self) -> Option<&SummaryRow> {
        self.refresh().grand_total.as_ref()
    }

    pub fn set_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_window(&mut self) -> PageWindow {
        let total = self.refresh().rows.len();
        PageWindow::compute(total, self.options.page_size, self.current_page, self.options.max_displayed_pages)
    }

    /// Rows on the current page.
    pub fn page_rows(&mut self) -> &[RasterRow] {
        let window = self.page_window();
        &self.refresh().rows[window.row_range]
    }

    /// Fully expanded rows for copy/export, ignoring collapse state.
    pub fn export_rows(&mut self) -> Raster {
        rasterize(&mut self.tree, &RasterOptions::export(&self.options))
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    pub fn handle_click(&mut self, row: &RasterRow, modifiers: ClickModifiers) -> Result<ClickOutcome> {
        self.selection
            .handle_click(&self.tree, row, modifiers, self.options.row_key.as_deref())
    }

    pub fn is_selected(&self, row: &RasterRow) -> Result<bool> {
        self.selection.is_selected(&self.tree, row, self.options.row_key.as_deref())
    }
}

fn apply_sort(tree: &mut Tree, specs: &[SortSpec]) -> Result<()> {
    if specs.is_empty() {
        return Ok(());
    }
    let root = tree.root();
    sort_children(tree, root, specs, true)
}
