//! feedwall: aggregates RSS/Atom feeds into paginated JSON artifacts.
//!
//! The pipeline runs once per build:
//!
//! 1. [`config`] supplies the feed registry and build settings
//! 2. [`feed`] fetches, parses and normalizes each feed independently
//! 3. [`aggregate`] merges, filters and sorts every feed's items
//! 4. [`paginate`] slices the aggregate into fixed-size pages
//! 5. [`output`] writes page, metadata and per-feed JSON files
//!
//! [`build::run`] drives steps 2–4.

pub mod aggregate;
pub mod build;
pub mod config;
pub mod feed;
pub mod output;
pub mod paginate;
pub mod util;
