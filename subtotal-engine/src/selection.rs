//! FILENAME: subtotal-engine/src/selection.rs
//! Row selection driven by clicks on rasterized rows.
//!
//! Detail rows are remembered by row key (the configured key column, or the
//! row's input position), summary rows by sector key, so a selection
//! survives re-sorting and re-rasterizing.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::definition::TableOptions;
use crate::error::Result;
use crate::raster::{DetailRowRef, RasterRow};
use crate::tree::{RowId, Tree};
use crate::value::Value;

/// Invoked with the clicked row and its new selection state.
pub type SelectionCallback = Box<dyn FnMut(&RasterRow, bool) + Send>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickModifiers {
    pub ctrl: bool,
    pub shift: bool,
}

impl ClickModifiers {
    pub fn plain() -> Self {
        ClickModifiers::default()
    }

    pub fn ctrl() -> Self {
        ClickModifiers { ctrl: true, shift: false }
    }

    pub fn shift() -> Self {
        ClickModifiers { ctrl: false, shift: true }
    }
}

/// What a click did to the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Plain click: everything was deselected.
    Cleared { had_selection: bool },
    /// Ctrl-click flipped the row to this state.
    Toggled(bool),
    /// Shift-click remembered the row as the range anchor.
    AnchorSet,
    /// Shift-click selected this many rows between anchor and row.
    RangeSelected(usize),
    /// Shift-click on a summary row.
    Ignored,
}

/// Row key of a detail row: the key column's value, else its input position.
pub fn row_key(tree: &Tree, row: RowId, key_column: Option<&str>) -> Result<Value> {
    let detail = tree.row(row)?;
    let keyed = key_column.map(|tag| detail.get(tag)).filter(|v| !v.is_empty());
    Ok(keyed.cloned().unwrap_or(Value::Number(detail.row_count() as f64)))
}

#[derive(Default)]
pub struct Selection {
    detail: FxHashSet<Value>,
    summary: FxHashSet<String>,
    /// The row a first shift-click landed on. Its position is read from
    /// the tree when the range is taken, so a re-sort in between is honored.
    anchor: Option<RowId>,
    on_select: Option<SelectionCallback>,
    on_click: Option<SelectionCallback>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("detail", &self.detail)
            .field("summary", &self.summary)
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

impl Selection {
    pub fn new() -> Self {
        Selection::default()
    }

    /// Selection preloaded from the session options.
    pub fn from_options(options: &TableOptions) -> Self {
        Selection {
            detail: options.selected_rows.iter().cloned().collect(),
            summary: options.selected_summary_rows.iter().cloned().collect(),
            ..Selection::default()
        }
    }

    /// Called on ctrl-click toggles.
    pub fn on_select(&mut self, callback: SelectionCallback) {
        self.on_select = Some(callback);
    }

    /// Called on plain clicks, always with `false`.
    pub fn on_click(&mut self, callback: SelectionCallback) {
        self.on_click = Some(callback);
    }

    pub fn selected_detail_keys(&self) -> &FxHashSet<Value> {
        &self.detail
    }

    pub fn selected_summary_keys(&self) -> &FxHashSet<String> {
        &self.summary
    }

    pub fn anchor(&self) -> Option<RowId> {
        self.anchor
    }

    /// Forgets the shift-click anchor, e.g. after the tree was regrouped.
    pub fn reset_anchor(&mut self) {
        self.anchor = None;
    }

    pub fn clear(&mut self) {
        self.detail.clear();
        self.summary.clear();
        self.anchor = None;
    }

    /// Flips a detail key and returns its new state.
    pub fn toggle_detail(&mut self, key: Value) -> bool {
        if self.detail.remove(&key) {
            false
        } else {
            self.detail.insert(key);
            true
        }
    }

    pub fn toggle_summary(&mut self, sector_key: String) -> bool {
        if self.summary.remove(&sector_key) {
            false
        } else {
            self.summary.insert(sector_key);
            true
        }
    }

    pub fn is_selected(&self, tree: &Tree, row: &RasterRow, key_column: Option<&str>) -> Result<bool> {
        Ok(match row {
            RasterRow::Detail(d) => self.detail.contains(&row_key(tree, d.row, key_column)?),
            RasterRow::Summary(s) => self.summary.contains(&s.sector_path.key()),
        })
    }

    pub fn handle_click(
        &mut self,
        tree: &Tree,
        row: &RasterRow,
        modifiers: ClickModifiers,
        key_column: Option<&str>,
    ) -> Result<ClickOutcome> {
        if modifiers.shift {
            let RasterRow::Detail(detail) = row else {
                return Ok(ClickOutcome::Ignored);
            };
            return self.shift_click(tree, detail, key_column);
        }

        if !modifiers.ctrl {
            let had_selection = !self.detail.is_empty() || !self.summary.is_empty();
            self.clear();
            if let Some(callback) = self.on_click.as_mut() {
                callback(row, false);
            }
            return Ok(ClickOutcome::Cleared { had_selection });
        }

        let state = match row {
            RasterRow::Detail(d) => {
                let key = row_key(tree, d.row, key_column)?;
                self.toggle_detail(key)
            }
            RasterRow::Summary(s) => self.toggle_summary(s.sector_path.key()),
        };
        if let Some(callback) = self.on_select.as_mut() {
            callback(row, state);
        }
        Ok(ClickOutcome::Toggled(state))
    }

    /// Selects the contiguous run of visible rows between the anchor and
    /// `detail`, replacing the detail selection. Rows under a different
    /// parent just move the anchor.
    fn shift_click(&mut self, tree: &Tree, detail: &DetailRowRef, key_column: Option<&str>) -> Result<ClickOutcome> {
        let clicked = tree.row(detail.row)?;
        let shared = self.anchor.and_then(|id| tree.row(id).ok()).and_then(|a| {
            a.parent()
                .filter(|p| clicked.parent() == Some(*p))
                .map(|p| (a.index_in_parent(), p))
        });
        let Some((anchor, parent)) = shared else {
            self.anchor = Some(detail.row);
            return Ok(ClickOutcome::AnchorSet);
        };

        let start = anchor.min(clicked.index_in_parent());
        let end = anchor.max(clicked.index_in_parent());
        let owned = tree.node(parent)?.ultimate_children();
        let mut keys = Vec::new();
        for row_id in owned.iter().take(end + 1).skip(start) {
            if tree.row(*row_id)?.is_hidden_by_filter() {
                continue;
            }
            keys.push(row_key(tree, *row_id, key_column)?);
        }

        self.detail.clear();
        let count = keys.len();
        self.detail.extend(keys);
        Ok(ClickOutcome::RangeSelected(count))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::builder::build;
    use crate::definition::{ColumnDef, GroupBySpec, Record, SortSpec, ValueFormat};
    use crate::raster::{rasterize, RasterOptions};
    use crate::sort::sort_children;

    fn create_test_tree() -> Tree {
        let columns = vec![ColumnDef::new("id", "Id"), ColumnDef::new("group", "Group")];
        let rows = [("a", "g1"), ("b", "g1"), ("c", "g1"), ("d", "g2")]
            .into_iter()
            .map(|(id, group)| {
                let mut r = Record::default();
                r.insert("id".to_string(), Value::from(id));
                r.insert("group".to_string(), Value::from(group));
                r
            })
            .collect();
        build(columns, rows, &[GroupBySpec::new("group")]).unwrap()
    }

    fn detail_rows(tree: &mut Tree) -> Vec<RasterRow> {
        rasterize(tree, &RasterOptions::default())
            .into_rows()
            .into_iter()
            .filter(RasterRow::is_detail)
            .collect()
    }

    #[test]
    fn test_ctrl_click_toggles_and_notifies() {
        let mut tree = create_test_tree();
        let rows = detail_rows(&mut tree);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut selection = Selection::new();
        selection.on_select(Box::new(move |_, state| sink.lock().unwrap().push(state)));

        let first = selection.handle_click(&tree, &rows[0], ClickModifiers::ctrl(), Some("id")).unwrap();
        assert_eq!(first, ClickOutcome::Toggled(true));
        assert!(selection.is_selected(&tree, &rows[0], Some("id")).unwrap());
        let second = selection.handle_click(&tree, &rows[0], ClickModifiers::ctrl(), Some("id")).unwrap();
        assert_eq!(second, ClickOutcome::Toggled(false));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_plain_click_clears() {
        let mut tree = create_test_tree();
        let rows = detail_rows(&mut tree);
        let mut selection = Selection::new();
        selection.handle_click(&tree, &rows[1], ClickModifiers::ctrl(), None).unwrap();
        let outcome = selection.handle_click(&tree, &rows[2], ClickModifiers::plain(), None).unwrap();
        assert_eq!(outcome, ClickOutcome::Cleared { had_selection: true });
        assert!(selection.selected_detail_keys().is_empty());
    }

    #[test]
    fn test_shift_range_within_parent() {
        let mut tree = create_test_tree();
        let rows = detail_rows(&mut tree);
        let mut selection = Selection::new();
        assert_eq!(
            selection.handle_click(&tree, &rows[2], ClickModifiers::shift(), Some("id")).unwrap(),
            ClickOutcome::AnchorSet
        );
        assert_eq!(
            selection.handle_click(&tree, &rows[0], ClickModifiers::shift(), Some("id")).unwrap(),
            ClickOutcome::RangeSelected(3)
        );
        assert!(selection.selected_detail_keys().contains(&Value::from("b")));

        // row "d" sits under another group
        assert_eq!(
            selection.handle_click(&tree, &rows[3], ClickModifiers::shift(), Some("id")).unwrap(),
            ClickOutcome::AnchorSet
        );
    }

    #[test]
    fn test_shift_range_follows_resort() {
        let columns = vec![
            ColumnDef::new("id", "Id"),
            ColumnDef::new("score", "Score").with_format(ValueFormat::Number),
        ];
        let rows = [("a", 1.0), ("b", 2.0), ("c", 3.0)]
            .into_iter()
            .map(|(id, score)| {
                let mut r = Record::default();
                r.insert("id".to_string(), Value::from(id));
                r.insert("score".to_string(), Value::Number(score));
                r
            })
            .collect();
        let mut tree = build(columns, rows, &[]).unwrap();
        let mut selection = Selection::new();

        let before = detail_rows(&mut tree);
        selection.handle_click(&tree, &before[0], ClickModifiers::shift(), Some("id")).unwrap();

        let root = tree.root();
        sort_children(&mut tree, root, &[SortSpec::descending("score")], true).unwrap();
        let after = detail_rows(&mut tree);
        // c, b, a: the anchor "a" now sits at index 2
        assert_eq!(
            selection.handle_click(&tree, &after[1], ClickModifiers::shift(), Some("id")).unwrap(),
            ClickOutcome::RangeSelected(2)
        );
        let keys = selection.selected_detail_keys();
        assert!(keys.contains(&Value::from("a")));
        assert!(keys.contains(&Value::from("b")));
        assert!(!keys.contains(&Value::from("c")));
    }

    #[test]
    fn test_summary_rows_keyed_by_sector() {
        let mut tree = create_test_tree();
        let raster = rasterize(&mut tree, &RasterOptions::default());
        let group = raster.rows()[1].clone();
        let mut selection = Selection::new();
        selection.handle_click(&tree, &group, ClickModifiers::ctrl(), None).unwrap();
        assert!(selection.selected_summary_keys().contains("g1"));
        assert_eq!(
            selection.handle_click(&tree, &group, ClickModifiers::shift(), None).unwrap(),
            ClickOutcome::Ignored
        );
    }

    #[test]
    fn test_fallback_key_is_input_position() {
        let tree = create_test_tree();
        assert_eq!(row_key(&tree, RowId(3), None).unwrap(), Value::Number(3.0));
        assert_eq!(row_key(&tree, RowId(3), Some("id")).unwrap(), Value::from("d"));
    }

    #[test]
    fn test_initial_selection_from_options() {
        let options = TableOptions {
            selected_rows: vec![Value::from("a")],
            selected_summary_rows: vec!["g2".to_string()],
            ..TableOptions::default()
        };
        let selection = Selection::from_options(&options);
        assert!(selection.selected_detail_keys().contains(&Value::from("a")));
        assert!(selection.selected_summary_keys().contains("g2"));
    }
}
