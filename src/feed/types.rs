use serde::{Deserialize, Serialize};

use crate::config::FeedDescriptor;

/// Channel-level fields of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
    pub title: String,
    pub description: String,
    pub link: String,
}

impl FeedInfo {
    /// Info recorded for a feed that could not be fetched or parsed.
    pub fn placeholder(descriptor: &FeedDescriptor) -> Self {
        Self {
            title: descriptor.name.clone(),
            description: String::new(),
            link: String::new(),
        }
    }
}

/// One `<item>`/`<entry>` as it appeared in the feed, with documented
/// defaults already applied for absent fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    /// `"No Title"` when absent.
    pub title: String,
    /// `"#"` when absent.
    pub link: String,
    /// Empty when absent. May still carry CDATA markers and raw HTML.
    pub description: String,
    /// Empty when absent. Kept verbatim for display.
    pub pub_date: String,
    /// Falls back to `link` when absent.
    pub guid: String,
}

/// Output of the feed parser for one document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub info: FeedInfo,
    pub items: Vec<RawItem>,
    /// Items beyond the per-feed cap that were not extracted.
    pub skipped: usize,
}

/// The canonical, display-ready article record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedItem {
    /// 16-character identifier, stable for the same guid and feed name.
    pub id: String,
    /// Plain text with all markup removed (HTML-escaped).
    pub title: String,
    /// Absolute http(s) URL or `#`.
    pub link: String,
    /// Sanitized, possibly truncated HTML.
    pub description: String,
    /// Date text exactly as the feed provided it.
    pub pub_date: String,
    /// Epoch milliseconds; non-positive values never reach the aggregate.
    pub timestamp: i64,
    pub feed_name: String,
    pub category: String,
    /// Channel-level link of the owning feed.
    pub feed_source: String,
}

/// Outcome of processing one feed during a build.
///
/// Failed feeds carry an error string, placeholder info and no items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedFetchResult {
    pub descriptor: FeedDescriptor,
    pub feed_info: FeedInfo,
    pub items: Vec<NormalizedItem>,
    pub error: Option<String>,
    pub success: bool,
}

impl FeedFetchResult {
    pub fn succeeded(
        descriptor: FeedDescriptor,
        feed_info: FeedInfo,
        items: Vec<NormalizedItem>,
    ) -> Self {
        Self {
            descriptor,
            feed_info,
            items,
            error: None,
            success: true,
        }
    }

    pub fn failed(descriptor: FeedDescriptor, error: impl ToString) -> Self {
        Self {
            feed_info: FeedInfo::placeholder(&descriptor),
            descriptor,
            items: Vec::new(),
            error: Some(error.to_string()),
            success: false,
        }
    }
}
