//! Artifact writer: persists a [`BuildOutput`] as JSON files.
//!
//! Layout under the output directory:
//!
//! - `page-<n>.json` - one [`PageRecord`](crate::paginate::PageRecord) per page
//! - `metadata.json` - [`BuildMetadata`](crate::aggregate::BuildMetadata)
//! - `feeds.json` - manifest of all feeds (when per-feed pages are enabled)
//! - `feeds/<slug>.json` - one [`FeedArtifact`] per feed
//!
//! Each build fully replaces the previous one: stale page and feed files are
//! removed before the new ones are written.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregate::retained_items;
use crate::build::BuildOutput;
use crate::feed::{FeedInfo, NormalizedItem};

const METADATA_FILE: &str = "metadata.json";
const MANIFEST_FILE: &str = "feeds.json";
const FEEDS_DIR: &str = "feeds";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl WriteError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Contents of `feeds/<slug>.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedArtifact<'a> {
    pub feed_info: &'a FeedInfo,
    pub items: Vec<&'a NormalizedItem>,
    pub last_updated: DateTime<Utc>,
    pub success: bool,
    pub error: Option<&'a str>,
}

/// One entry of `feeds.json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub category: &'a str,
    pub url: &'a str,
    pub item_count: usize,
    pub success: bool,
}

/// What a call to [`write_artifacts`] put on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub pages_written: usize,
    pub feed_files_written: usize,
    pub stale_files_removed: usize,
}

/// Writes every artifact of `output` into `dir`, creating it if needed.
///
/// # Errors
///
/// Any filesystem or serialization failure is returned as [`WriteError`];
/// callers treat it as fatal for the build.
pub fn write_artifacts(
    output: &BuildOutput,
    dir: &Path,
    per_feed_pages: bool,
) -> Result<WriteSummary, WriteError> {
    std::fs::create_dir_all(dir).map_err(|e| WriteError::io(dir, e))?;

    let mut summary = WriteSummary {
        stale_files_removed: remove_stale(dir)?,
        ..WriteSummary::default()
    };

    for page in &output.pages {
        let path = dir.join(format!("page-{}.json", page.page));
        write_json(&path, page)?;
        summary.pages_written += 1;
    }

    write_json(&dir.join(METADATA_FILE), &output.metadata)?;

    if per_feed_pages {
        let feeds_dir = dir.join(FEEDS_DIR);
        std::fs::create_dir_all(&feeds_dir).map_err(|e| WriteError::io(&feeds_dir, e))?;

        let mut manifest = Vec::with_capacity(output.feeds.len());
        for (result, summary_entry) in output.feeds.iter().zip(&output.metadata.feeds) {
            let artifact = FeedArtifact {
                feed_info: &result.feed_info,
                items: retained_items(&result.items).collect(),
                last_updated: output.metadata.last_updated,
                success: result.success,
                error: result.error.as_deref(),
            };
            write_json(&feeds_dir.join(format!("{}.json", summary_entry.slug)), &artifact)?;
            summary.feed_files_written += 1;

            manifest.push(ManifestEntry {
                name: &result.descriptor.name,
                slug: &summary_entry.slug,
                category: &result.descriptor.category,
                url: &result.descriptor.url,
                item_count: summary_entry.item_count,
                success: result.success,
            });
        }
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;
    }

    tracing::info!(
        dir = %dir.display(),
        pages = summary.pages_written,
        feeds = summary.feed_files_written,
        stale = summary.stale_files_removed,
        "Wrote artifacts"
    );

    Ok(summary)
}

/// Removes page, feed and manifest files left by a previous build.
fn remove_stale(dir: &Path) -> Result<usize, WriteError> {
    let mut removed = 0;

    for entry in std::fs::read_dir(dir).map_err(|e| WriteError::io(dir, e))? {
        let path = entry.map_err(|e| WriteError::io(dir, e))?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_page = name.starts_with("page-") && name.ends_with(".json");
        if is_page || name == MANIFEST_FILE {
            std::fs::remove_file(&path).map_err(|e| WriteError::io(&path, e))?;
            removed += 1;
        }
    }

    let feeds_dir = dir.join(FEEDS_DIR);
    if feeds_dir.is_dir() {
        for entry in std::fs::read_dir(&feeds_dir).map_err(|e| WriteError::io(&feeds_dir, e))? {
            let path = entry.map_err(|e| WriteError::io(&feeds_dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path).map_err(|e| WriteError::io(&path, e))?;
                removed += 1;
            }
        }
    }

    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed = removed, "Removed stale artifacts");
    }
    Ok(removed)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), WriteError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| WriteError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &bytes).map_err(|e| WriteError::io(path, e))
}

/// Atomically write a file using the write-to-temp-then-rename pattern.
/// Readers never observe a partially written artifact.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    // SEC-009: Randomized temp filename; create_new refuses to follow a planted symlink
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        // On Windows, rename fails if destination exists, so remove it first
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }

        std::fs::rename(&temp_path, dst)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::config::FeedDescriptor;
    use crate::feed::FeedFetchResult;
    use crate::paginate::paginate;

    fn item(id: &str, timestamp: i64) -> NormalizedItem {
        NormalizedItem {
            id: id.into(),
            title: id.into(),
            link: "#".into(),
            description: String::new(),
            pub_date: String::new(),
            timestamp,
            feed_name: "Feed One".into(),
            category: "general".into(),
            feed_source: String::new(),
        }
    }

    fn output(item_count: usize, per_page: usize) -> BuildOutput {
        let ok = FeedDescriptor::new("Feed One", "https://one.example.com/rss", "general");
        let bad = FeedDescriptor::new("Feed Two", "https://two.example.com/rss", "news");
        let items: Vec<_> = (0..item_count)
            .map(|i| item(&format!("i{i}"), 1_000 + i as i64))
            .chain(std::iter::once(item("undated", 0)))
            .collect();
        let feeds = vec![
            FeedFetchResult::succeeded(ok.clone(), FeedInfo::placeholder(&ok), items),
            FeedFetchResult::failed(bad, "Request timed out after 15s"),
        ];
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let aggregate = aggregate(&feeds, per_page, now);
        let pages = paginate(&aggregate.items, per_page);
        BuildOutput {
            feeds,
            items: aggregate.items,
            pages,
            metadata: aggregate.metadata,
        }
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
    }

    #[test]
    fn test_writes_pages_metadata_and_feeds() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write_artifacts(&output(25, 20), dir.path(), true).unwrap();

        assert_eq!(summary.pages_written, 2);
        assert_eq!(summary.feed_files_written, 2);

        let page2 = read_json(&dir.path().join("page-2.json"));
        assert_eq!(page2["page"], 2);
        assert_eq!(page2["items"].as_array().unwrap().len(), 5);
        assert_eq!(page2["hasPrev"], true);

        let metadata = read_json(&dir.path().join("metadata.json"));
        assert_eq!(metadata["totalItems"], 25);
        assert_eq!(metadata["feeds"][1]["error"], "Request timed out after 15s");

        let feed_one = read_json(&dir.path().join("feeds/feed-one.json"));
        assert_eq!(feed_one["success"], true);
        assert!(feed_one["error"].is_null());
        assert_eq!(feed_one["items"].as_array().unwrap().len(), 25);

        let feed_two = read_json(&dir.path().join("feeds/feed-two.json"));
        assert_eq!(feed_two["success"], false);
        assert_eq!(feed_two["feedInfo"]["title"], "Feed Two");

        let manifest = read_json(&dir.path().join("feeds.json"));
        assert_eq!(manifest[0]["slug"], "feed-one");
        assert_eq!(manifest[0]["itemCount"], 25);
        assert_eq!(manifest[1]["url"], "https://two.example.com/rss");
    }

    #[test]
    fn test_empty_build_writes_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let summary = write_artifacts(&output(0, 20), dir.path(), false).unwrap();

        assert_eq!(summary.pages_written, 0);
        assert!(!dir.path().join("page-1.json").exists());
        let metadata = read_json(&dir.path().join("metadata.json"));
        assert_eq!(metadata["totalPages"], 0);
        assert_eq!(metadata["totalItems"], 0);
        assert!(!dir.path().join("feeds.json").exists());
    }

    #[test]
    fn test_rebuild_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&output(45, 10), dir.path(), true).unwrap();
        assert!(dir.path().join("page-5.json").exists());

        let summary = write_artifacts(&output(5, 10), dir.path(), false).unwrap();
        assert_eq!(summary.pages_written, 1);
        assert!(dir.path().join("page-1.json").exists());
        assert!(!dir.path().join("page-2.json").exists());
        assert!(!dir.path().join("page-5.json").exists());
        assert!(!dir.path().join("feeds.json").exists());
        assert!(!dir.path().join("feeds/feed-one.json").exists());
        // 5 pages + manifest + 2 feed files
        assert_eq!(summary.stale_files_removed, 8);
    }

    #[test]
    fn test_unrelated_files_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("custom.json"), "{}").unwrap();
        write_artifacts(&output(1, 10), dir.path(), true).unwrap();
        assert!(dir.path().join("custom.json").exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(&output(3, 10), dir.path(), true).unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unwritable_destination_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = write_artifacts(&output(1, 10), &blocker, false);
        assert!(matches!(result, Err(WriteError::Io { .. })));
    }
}
