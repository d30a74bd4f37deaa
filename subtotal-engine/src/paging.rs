//! FILENAME: subtotal-engine/src/paging.rs
//! Page arithmetic over rasterized rows. Pages are numbered from 1.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// The slice of rows shown for one page, plus the pages a navigator offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow {
    pub page_size: usize,
    pub page_count: usize,
    /// The requested page after clamping into `1..=page_count`.
    pub current_page: usize,
    /// Row indices on the current page.
    pub row_range: Range<usize>,
    pub first_displayed_page: usize,
    pub last_displayed_page: usize,
}

impl PageWindow {
    /// Half of `max_displayed_pages` goes left of the current page (fewer
    /// near the start), the rest to its right.
    pub fn compute(total_rows: usize, page_size: usize, current_page: usize, max_displayed_pages: usize) -> Self {
        let page_size = page_size.max(1);
        let page_count = total_rows.div_ceil(page_size);
        let current_page = current_page.clamp(1, page_count.max(1));

        let start = ((current_page - 1) * page_size).min(total_rows);
        let end = (current_page * page_size).min(total_rows);

        let left = (max_displayed_pages / 2).min(current_page - 1);
        let right = max_displayed_pages.saturating_sub(left);
        let first_displayed_page = current_page - left;
        let last_displayed_page = (current_page + right).saturating_sub(1).min(page_count).max(first_displayed_page);

        PageWindow {
            page_size,
            page_count,
            current_page,
            row_range: start..end,
            first_displayed_page,
            last_displayed_page,
        }
    }

    pub fn displayed_pages(&self) -> impl Iterator<Item = usize> {
        self.first_displayed_page..=self.last_displayed_page
    }
}
