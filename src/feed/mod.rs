//! Feed ingestion: fetching, parsing and normalizing RSS/Atom feeds.
//!
//! - **Fetching**: HTTP retrieval with a bounded timeout, no retries, and
//!   charset-aware decoding of the body
//! - **Parsing**: tolerant RSS 2.0 / RSS 1.0 / Atom reading via `quick-xml`
//! - **Normalizing**: sanitized text, stable IDs and timestamps per item
//!
//! # Architecture
//!
//! - [`fetcher`] - per-feed pipeline and the parallel/serialized fan-out
//! - [`parser`] - XML → [`RawItem`]s with documented defaults
//! - [`normalize`] - [`RawItem`] → [`NormalizedItem`]
//!
//! Each stage returns a `Result`; errors stop at the feed boundary and are
//! recorded on the feed's [`FeedFetchResult`].

mod charset;
pub mod fetcher;
pub mod normalize;
pub mod parser;
mod types;

pub use charset::decode_feed_body;
pub use fetcher::{build_client, fetch_all, fetch_feed_text, fetch_one, FeedError, FetchError};
pub use normalize::{
    derive_id, neutralize_script_tokens, parse_timestamp, sanitize_description, sanitize_title,
    ItemError, Normalizer,
};
pub use parser::{parse_feed, ParseError};
pub use types::{FeedFetchResult, FeedInfo, NormalizedItem, ParsedFeed, RawItem};
