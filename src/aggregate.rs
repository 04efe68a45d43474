use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::feed::{FeedFetchResult, FeedInfo, NormalizedItem};
use crate::paginate::page_count;
use crate::util::SlugRegistry;

/// Per-feed entry of [`BuildMetadata`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSummary {
    pub name: String,
    /// Unique within the build; names the feed's per-feed artifact.
    pub slug: String,
    pub category: String,
    /// Items from this feed that made it into the aggregate.
    pub item_count: usize,
    pub error: Option<String>,
    pub feed_info: FeedInfo,
}

/// Aggregate summary written to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub total_feeds: usize,
    pub successful_feeds: usize,
    pub failed_feeds: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub items_per_page: usize,
    pub last_updated: DateTime<Utc>,
    /// Distinct descriptor categories, sorted.
    pub categories: Vec<String>,
    /// One entry per descriptor, in descriptor order.
    pub feeds: Vec<FeedSummary>,
}

/// The unified item stream of a build and its summary.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// Items with positive timestamps, newest first, ties in encounter order.
    pub items: Vec<NormalizedItem>,
    pub metadata: BuildMetadata,
}

/// Items of one feed that are eligible for output.
pub fn retained_items(items: &[NormalizedItem]) -> impl Iterator<Item = &NormalizedItem> {
    items.iter().filter(|item| item.timestamp > 0)
}

/// Merges every feed's items into one sorted sequence and summarizes the build.
///
/// Failed feeds contribute an entry with their error and no items; they never
/// affect the other feeds. Results are expected in descriptor order.
pub fn aggregate(
    results: &[FeedFetchResult],
    items_per_page: usize,
    now: DateTime<Utc>,
) -> Aggregate {
    let mut slugs = SlugRegistry::new();
    let mut items = Vec::new();
    let mut feeds = Vec::with_capacity(results.len());

    for result in results {
        let before = items.len();
        items.extend(retained_items(&result.items).cloned());
        let item_count = items.len() - before;

        let excluded = result.items.len() - item_count;
        if excluded > 0 {
            tracing::debug!(
                feed = %result.descriptor.name,
                excluded = excluded,
                "Items without a usable timestamp excluded"
            );
        }

        feeds.push(FeedSummary {
            name: result.descriptor.name.clone(),
            slug: slugs.claim(&result.descriptor.name),
            category: result.descriptor.category.clone(),
            item_count,
            error: result.error.clone(),
            feed_info: result.feed_info.clone(),
        });
    }

    // Stable: equal timestamps keep feed order, then document order
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let categories: BTreeSet<&str> = results
        .iter()
        .map(|r| r.descriptor.category.as_str())
        .collect();
    let successful_feeds = results.iter().filter(|r| r.success).count();
    let per_page = items_per_page.max(1);

    let metadata = BuildMetadata {
        total_feeds: results.len(),
        successful_feeds,
        failed_feeds: results.len() - successful_feeds,
        total_items: items.len(),
        total_pages: page_count(items.len(), per_page),
        items_per_page: per_page,
        last_updated: now,
        categories: categories.into_iter().map(str::to_string).collect(),
        feeds,
    };

    tracing::info!(
        feeds = metadata.total_feeds,
        failed = metadata.failed_feeds,
        items = metadata.total_items,
        pages = metadata.total_pages,
        "Aggregated feeds"
    );

    Aggregate { items, metadata }
}
