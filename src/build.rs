//! Pipeline entry point: registry → fetch → aggregate → paginate.
use chrono::{DateTime, Utc};

use crate::aggregate::{aggregate, BuildMetadata};
use crate::config::Config;
use crate::feed::{fetch_all, FeedFetchResult, NormalizedItem, Normalizer};
use crate::paginate::{paginate, PageRecord};

/// Everything one build produces, ready for the artifact writer.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// One result per descriptor, in descriptor order.
    pub feeds: Vec<FeedFetchResult>,
    /// The sorted aggregate.
    pub items: Vec<NormalizedItem>,
    pub pages: Vec<PageRecord>,
    pub metadata: BuildMetadata,
}

/// Runs a full build at the current time.
///
/// Per-feed failures are isolated and recorded in the output; this function
/// itself cannot fail.
pub async fn run(config: &Config, client: &reqwest::Client) -> BuildOutput {
    run_at(config, client, Utc::now()).await
}

/// Runs a full build with an explicit build time.
pub async fn run_at(
    config: &Config,
    client: &reqwest::Client,
    now: DateTime<Utc>,
) -> BuildOutput {
    let normalizer = Normalizer::new(
        config.description_max_chars,
        config.timestamp_policy,
        now.timestamp_millis(),
    );

    let feeds = fetch_all(client, config, &normalizer).await;
    let aggregate = aggregate(&feeds, config.items_per_page, now);
    let pages = paginate(&aggregate.items, config.items_per_page);

    BuildOutput {
        feeds,
        items: aggregate.items,
        pages,
        metadata: aggregate.metadata,
    }
}
