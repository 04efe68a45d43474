//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL handling**: feed URL validation and item link resolution
//! - **Text processing**: character-budget truncation and control-char stripping
//! - **Slugs**: URL-safe identifiers for per-feed artifacts
//!
//! # Examples
//!
//! ```
//! use feedwall::util::{slugify, truncate_chars, validate_feed_url};
//!
//! assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
//! assert_eq!(slugify("Example Feed"), "example-feed");
//! assert_eq!(truncate_chars("Long article summary", 4), "Long...");
//! ```

mod slug;
mod text;
mod url_validator;

pub use slug::{slugify, SlugRegistry};
pub use text::{collapse_whitespace, strip_control_chars, truncate_chars, truncate_html, ELLIPSIS};
pub use url_validator::{
    resolve_item_link, validate_feed_url, UrlValidationError, PLACEHOLDER_LINK,
};
