//! FILENAME: subtotal-engine/src/definition.rs
//! Column, grouping, sort and filter configuration for a table session.
//!
//! Hosts hand these over as JSON with camelCase keys; every optional knob
//! has a default so a partial object still parses. Custom comparators and
//! filterers are plain closures attached after parsing and never
//! serialized.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Tag identifying a column in records and definitions.
pub type ColumnTag = String;

/// A flat input record: column tag to value.
pub type Record = FxHashMap<ColumnTag, Value>;

/// Pseudo-column tag for "sort by group label".
pub const SUBTOTAL_BY_TAG: &str = "subtotalBy";

// ============================================================================
// COLUMNS
// ============================================================================

/// How the values of a column are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueFormat {
    Number,
    Currency,
    Date,
    #[default]
    Plain,
}

impl ValueFormat {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueFormat::Number | ValueFormat::Currency)
    }
}

/// Aggregation shown on summary rows for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregationMethod {
    Sum,
    Average,
    Count,
    Min,
    Max,
}

/// Compares two records for a column, replacing the format-based default.
#[derive(Clone)]
pub struct RowComparator(pub Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>);

impl RowComparator {
    pub fn new(f: impl Fn(&Record, &Record) -> Ordering + Send + Sync + 'static) -> Self {
        RowComparator(Arc::new(f))
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        (self.0)(a, b)
    }
}

impl fmt::Debug for RowComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowComparator(..)")
    }
}

/// Definition of a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Key of the column in every record.
    #[serde(rename = "colTag")]
    pub tag: ColumnTag,

    /// Header text.
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub format: ValueFormat,

    /// Aggregation for summary rows. Columns without one stay blank.
    #[serde(default, rename = "aggregationMethod")]
    pub aggregation: Option<AggregationMethod>,

    /// Weighting column for `AVERAGE`. Accepts a bare tag or `{"colTag": ..}`.
    #[serde(default, deserialize_with = "deserialize_column_ref")]
    pub weight_by: Option<ColumnTag>,

    #[serde(skip)]
    pub comparator: Option<RowComparator>,
}

/// A reference to another column as hosts write it.
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnRefRepr {
    Tag(ColumnTag),
    Object {
        #[serde(rename = "colTag")]
        col_tag: ColumnTag,
    },
}

fn deserialize_column_ref<'de, D>(deserializer: D) -> Result<Option<ColumnTag>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let repr = Option::<ColumnRefRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| match r {
        ColumnRefRepr::Tag(tag) => tag,
        ColumnRefRepr::Object { col_tag } => col_tag,
    }))
}

impl ColumnDef {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        ColumnDef {
            tag: tag.into(),
            text: text.into(),
            format: ValueFormat::Plain,
            aggregation: None,
            weight_by: None,
            comparator: None,
        }
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMethod) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_weight_by(mut self, tag: impl Into<String>) -> Self {
        self.weight_by = Some(tag.into());
        self
    }

    pub fn with_comparator(mut self, comparator: RowComparator) -> Self {
        self.comparator = Some(comparator);
        self
    }
}

// ============================================================================
// GROUPING
// ============================================================================

/// One level of the grouping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBySpec {
    #[serde(rename = "colTag")]
    pub column: ColumnTag,

    /// Raw bucket spec: comma-separated thresholds, a date list, or a date
    /// frequency name (`DAILY`, `WEEKLY`, ...).
    #[serde(default)]
    pub buckets: Option<String>,
}

impl GroupBySpec {
    pub fn new(column: impl Into<String>) -> Self {
        GroupBySpec { column: column.into(), buckets: None }
    }

    pub fn bucketed(column: impl Into<String>, buckets: impl Into<String>) -> Self {
        GroupBySpec { column: column.into(), buckets: Some(buckets.into()) }
    }
}

// ============================================================================
// SORTING
// ============================================================================

/// What a sort key orders by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortColumn {
    Column(ColumnTag),
    /// Orders sibling groups by their own sector title.
    GroupLabel,
}

impl SortColumn {
    pub fn tag(&self) -> &str {
        match self {
            SortColumn::Column(tag) => tag,
            SortColumn::GroupLabel => SUBTOTAL_BY_TAG,
        }
    }
}

impl From<&str> for SortColumn {
    fn from(tag: &str) -> Self {
        if tag == SUBTOTAL_BY_TAG {
            SortColumn::GroupLabel
        } else {
            SortColumn::Column(tag.to_string())
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SortSpecRepr", into = "SortSpecRepr")]
pub struct SortSpec {
    pub column: SortColumn,
    pub ascending: bool,
}

impl SortSpec {
    pub fn ascending(column: impl Into<String>) -> Self {
        SortSpec { column: SortColumn::from(column.into().as_str()), ascending: true }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        SortSpec { column: SortColumn::from(column.into().as_str()), ascending: false }
    }

    pub fn group_label(ascending: bool) -> Self {
        SortSpec { column: SortColumn::GroupLabel, ascending }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SortSpecRepr {
    col_tag: String,
    #[serde(default = "default_true")]
    ascending: bool,
}

impl From<SortSpecRepr> for SortSpec {
    fn from(repr: SortSpecRepr) -> Self {
        SortSpec { column: SortColumn::from(repr.col_tag.as_str()), ascending: repr.ascending }
    }
}

impl From<SortSpec> for SortSpecRepr {
    fn from(spec: SortSpec) -> Self {
        SortSpecRepr { col_tag: spec.column.tag().to_string(), ascending: spec.ascending }
    }
}

// ============================================================================
// FILTERING
// ============================================================================

/// Structured numeric comparison. Every bound present must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comparison {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ge: Option<f64>,
}

impl Comparison {
    pub fn holds(&self, n: f64) -> bool {
        self.eq.map_or(true, |v| n == v)
            && self.ne.map_or(true, |v| n != v)
            && self.lt.map_or(true, |v| n < v)
            && self.le.map_or(true, |v| n <= v)
            && self.gt.map_or(true, |v| n > v)
            && self.ge.map_or(true, |v| n >= v)
    }
}

/// One descriptor in a column filter. Descriptors within a column are OR-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterPredicate {
    Number(f64),
    Text(String),
    Comparison(Comparison),
}

impl FilterPredicate {
    pub fn text(s: impl Into<String>) -> Self {
        FilterPredicate::Text(s.into())
    }
}

/// Error type custom filterers may return.
pub type FiltererError = Box<dyn Error + Send + Sync>;

/// Replaces the default per-descriptor matching for a column.
///
/// Receives the record, the column, the column's descriptors and the case
/// sensitivity flag; returns whether the record matches.
#[derive(Clone)]
pub struct CustomFilterer(
    pub Arc<dyn Fn(&Record, &ColumnDef, &[FilterPredicate], bool) -> Result<bool, FiltererError> + Send + Sync>,
);

impl CustomFilterer {
    pub fn new(
        f: impl Fn(&Record, &ColumnDef, &[FilterPredicate], bool) -> Result<bool, FiltererError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        CustomFilterer(Arc::new(f))
    }
}

impl fmt::Debug for CustomFilterer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomFilterer(..)")
    }
}

/// Table-wide filtering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteringOptions {
    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    #[serde(skip)]
    pub custom_filterer: Option<CustomFilterer>,
}

impl Default for FilteringOptions {
    fn default() -> Self {
        FilteringOptions { case_sensitive: true, custom_filterer: None }
    }
}

// ============================================================================
// TABLE OPTIONS
// ============================================================================

/// When the "hide singleton subtotal child" rule counts a group's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SingletonPolicy {
    /// Count only rows still visible after filtering.
    #[default]
    AfterFilter,
    /// Count every row the group owns, filtered or not.
    BeforeFilter,
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    50
}

fn default_max_displayed_pages() -> usize {
    10
}

/// Everything a host configures when opening a table session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    /// Initial grouping levels, outermost first.
    #[serde(default, rename = "subtotalBy")]
    pub group_by: Vec<GroupBySpec>,

    #[serde(default)]
    pub sort_by: Vec<SortSpec>,

    /// Column whose value identifies a detail row for selection.
    #[serde(default)]
    pub row_key: Option<ColumnTag>,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_max_displayed_pages")]
    pub max_displayed_pages: usize,

    #[serde(default)]
    pub hide_single_subtotal_child: bool,

    #[serde(default)]
    pub singleton_policy: SingletonPolicy,

    #[serde(default)]
    pub disable_grand_total: bool,

    /// Groups with an empty key get no summary row.
    #[serde(default, rename = "isJaggedTree")]
    pub jagged_tree: bool,

    #[serde(default)]
    pub filtering: FilteringOptions,

    /// Row keys selected when the session opens.
    #[serde(default)]
    pub selected_rows: Vec<Value>,

    /// Sector keys of summary rows selected when the session opens.
    #[serde(default)]
    pub selected_summary_rows: Vec<String>,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            group_by: Vec::new(),
            sort_by: Vec::new(),
            row_key: None,
            page_size: default_page_size(),
            max_displayed_pages: default_max_displayed_pages(),
            hide_single_subtotal_child: false,
            singleton_policy: SingletonPolicy::AfterFilter,
            disable_grand_total: false,
            jagged_tree: false,
            filtering: FilteringOptions::default(),
            selected_rows: Vec::new(),
            selected_summary_rows: Vec::new(),
        }
    }
}

/// Finds a column by tag.
pub fn find_column<'a>(columns: &'a [ColumnDef], tag: &str) -> Option<&'a ColumnDef> {
    columns.iter().find(|c| c.tag == tag)
}
