//! FILENAME: subtotal-engine/src/lib.rs
//! Grouping tree engine and rasterizer for subtotaled tables.
//!
//! Flat records are grouped into a tree of summary nodes over detail rows,
//! which can be sorted, filtered and collapsed in place and then flattened
//! into the exact row sequence a table widget renders.
//!
//! Layers:
//! - `definition`: Serializable configuration (columns, grouping, sort, filters)
//! - `tree` / `builder`: The grouping tree and how it is built
//! - `sort` / `filter` / `aggregate`: In-place mutations and subtotals
//! - `raster`: Flattened output for display or export
//! - `table`: Session controller tying it all together

pub mod aggregate;
pub mod builder;
pub mod definition;
pub mod error;
pub mod filter;
pub mod paging;
pub mod partition;
pub mod raster;
pub mod sector;
pub mod selection;
pub mod sort;
pub mod table;
pub mod tree;
pub mod value;

pub use aggregate::{refresh_row_data, Accumulator, SummaryData};
pub use builder::{build, resolve_group_levels, GroupLevel};
pub use definition::*;
pub use error::{Result, TableError};
pub use filter::{clear_filters, filter_by_column, filter_values, propagate_hidden, row_matches, ActiveFilter, FilterSet};
pub use paging::PageWindow;
pub use partition::{DateFrequency, Partition, PartitionKind};
pub use raster::{rasterize, DetailRowRef, Raster, RasterMode, RasterOptions, RasterRow, SummaryRow};
pub use sector::{SectorPath, SECTOR_SEPARATOR};
pub use selection::{row_key, ClickModifiers, ClickOutcome, Selection, SelectionCallback};
pub use sort::{compare_by_format, merge_sort_specs, restore_input_order, sort_by_subtotals, sort_children};
pub use table::TableState;
pub use tree::{DetailRow, NodeId, RowId, Tree, TreeNode};
pub use value::{Value, BLANK_LABEL};
