use serde::{Deserialize, Serialize};

use crate::feed::NormalizedItem;

/// One fixed-size slice of the aggregate plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// 1-based page number.
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub items_per_page: usize,
    pub items: Vec<NormalizedItem>,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Number of pages needed for `total_items`; zero items means zero pages.
pub fn page_count(total_items: usize, items_per_page: usize) -> usize {
    total_items.div_ceil(items_per_page.max(1))
}

/// Splits the sorted aggregate into contiguous pages of `items_per_page`.
///
/// Concatenating the pages' items in order reproduces `items` exactly.
pub fn paginate(items: &[NormalizedItem], items_per_page: usize) -> Vec<PageRecord> {
    let per_page = items_per_page.max(1);
    let total_items = items.len();
    let total_pages = page_count(total_items, per_page);

    items
        .chunks(per_page)
        .enumerate()
        .map(|(index, chunk)| {
            let page = index + 1;
            PageRecord {
                page,
                total_pages,
                total_items,
                items_per_page: per_page,
                items: chunk.to_vec(),
                has_next: page < total_pages,
                has_prev: page > 1,
            }
        })
        .collect()
}
