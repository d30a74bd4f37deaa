//! FILENAME: subtotal-engine/tests/common/mod.rs
//! Fixtures and invariant checks shared by the integration tests.

#![allow(dead_code)]

use subtotal_engine::{
    build, AggregationMethod, ColumnDef, GroupBySpec, NodeId, RasterRow, Record, Tree, Value, ValueFormat,
};

/// Builds a record from `(tag, value)` pairs.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().map(|(tag, value)| (tag.to_string(), value.clone())).collect()
}

/// Columns for the sales fixture: region, rep, units (SUM), price
/// (AVERAGE weighted by units), date.
pub fn sales_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("region", "Region"),
        ColumnDef::new("rep", "Rep"),
        ColumnDef::new("units", "Units")
            .with_format(ValueFormat::Number)
            .with_aggregation(AggregationMethod::Sum),
        ColumnDef::new("price", "Price")
            .with_format(ValueFormat::Currency)
            .with_aggregation(AggregationMethod::Average)
            .with_weight_by("units"),
        ColumnDef::new("sold", "Sold").with_format(ValueFormat::Date),
    ]
}

/// Eight sales rows over two regions and four reps.
pub fn sales_records() -> Vec<Record> {
    let data = [
        ("East", "Ada", 10.0, 2.0, "2024-01-05"),
        ("West", "Ben", 4.0, 5.0, "2024-01-20"),
        ("East", "Cy", 6.0, 3.0, "2024-02-11"),
        ("East", "Ada", 2.0, 4.0, "2024-02-28"),
        ("West", "Dee", 8.0, 1.0, "2024-03-02"),
        ("West", "Ben", 1.0, 9.0, "2024-03-15"),
        ("East", "Cy", 5.0, 2.0, "2024-04-01"),
        ("West", "Dee", 3.0, 6.0, "2024-04-30"),
    ];
    data.iter()
        .map(|(region, rep, units, price, sold)| {
            record(&[
                ("region", Value::from(*region)),
                ("rep", Value::from(*rep)),
                ("units", Value::Number(*units)),
                ("price", Value::Number(*price)),
                ("sold", Value::text(*sold)),
            ])
        })
        .collect()
}

pub fn sales_tree(group_by: &[GroupBySpec]) -> Tree {
    build(sales_columns(), sales_records(), group_by).unwrap()
}

/// Asserts the structural invariants that must hold after any completed
/// mutation: child paths extend the parent's by one key, children and
/// owned rows are exclusive, owned rows carry the owner's path and index,
/// and hidden state is the AND over what a node holds.
pub fn assert_tree_invariants(tree: &Tree) {
    let mut seen_rows = vec![0usize; tree.row_count()];
    check_node(tree, tree.root(), &mut seen_rows);
    assert!(seen_rows.iter().all(|n| *n == 1), "every row owned exactly once: {:?}", seen_rows);
}

fn check_node(tree: &Tree, id: NodeId, seen_rows: &mut [usize]) {
    let node = tree.node(id).unwrap();
    assert!(
        node.children().is_empty() || node.ultimate_children().is_empty(),
        "children and rows are exclusive"
    );

    if node.has_child() {
        for child_id in node.children() {
            let child = tree.node(*child_id).unwrap();
            assert_eq!(child.parent(), Some(id));
            assert_eq!(child.depth(), node.depth() + 1);
            let title = child.sector_title().unwrap().clone();
            assert_eq!(child.sector_path(), &node.sector_path().child(title));
            assert!(child.sector_path().is_descendant_of(node.sector_path()));
            check_node(tree, *child_id, seen_rows);
        }
        let all_hidden = node.children().iter().all(|c| tree.node(*c).unwrap().is_hidden_by_filter());
        assert_eq!(node.is_hidden_by_filter(), all_hidden, "hidden propagation at {}", node.sector_path());
    } else {
        for (i, row_id) in node.ultimate_children().iter().enumerate() {
            let row = tree.row(*row_id).unwrap();
            assert_eq!(row.parent(), Some(id));
            assert_eq!(row.index_in_parent(), i);
            assert_eq!(row.sector_path(), node.sector_path());
            seen_rows[row_id.index()] += 1;
        }
        let owned = node.ultimate_children();
        let all_hidden = !owned.is_empty() && owned.iter().all(|r| tree.row(*r).unwrap().is_hidden_by_filter());
        assert_eq!(node.is_hidden_by_filter(), all_hidden, "hidden propagation at {}", node.sector_path());
    }
}

/// Compact rendering of raster rows: `S:<sector key>` or `D:<input index>`.
pub fn shape(rows: &[RasterRow]) -> Vec<String> {
    rows.iter()
        .map(|row| match row {
            RasterRow::Summary(s) => format!("S:{}", s.sector_path.key()),
            RasterRow::Detail(d) => format!("D:{}", d.row_count),
        })
        .collect()
}

/// Values of one column for the detail rows in `rows`.
pub fn detail_values(tree: &Tree, rows: &[RasterRow], tag: &str) -> Vec<Value> {
    rows.iter()
        .filter_map(RasterRow::as_detail)
        .map(|d| tree.row(d.row).unwrap().get(tag).clone())
        .collect()
}
