//! Build configuration loaded from `feedwall.toml`.
//!
//! Every key is optional except the feed list, which a build cannot do
//! without. Unknown keys are accepted by serde but logged as warnings so
//! typos surface in the build output.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::util::validate_feed_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Feed Registry
// ============================================================================

/// One configured RSS/Atom source. Immutable for the duration of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    pub name: String,
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl FeedDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            category: category.into(),
        }
    }
}

// ============================================================================
// Policies
// ============================================================================

/// How feeds are fetched during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// All feeds at once, bounded by `max_concurrency`.
    Parallel,
    /// One feed at a time with `request_delay_ms` between requests.
    Serialized,
}

/// What happens to an item whose date is missing or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPolicy {
    /// Timestamp becomes 0 and the item is excluded from the aggregate.
    Strict,
    /// Timestamp becomes the build start time minus the item's index (ms).
    Lenient,
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level build configuration.
///
/// Passed explicitly into [`crate::build::run`]; nothing in the pipeline
/// reads process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving the JSON artifacts.
    pub output_dir: PathBuf,
    pub items_per_page: usize,
    /// Character budget for sanitized descriptions (before the ellipsis).
    pub description_max_chars: usize,
    pub max_items_per_feed: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub fetch_strategy: FetchStrategy,
    pub max_concurrency: usize,
    pub request_delay_ms: u64,
    pub timestamp_policy: TimestampPolicy,
    /// Emit `feeds/<slug>.json` and the `feeds.json` manifest.
    pub per_feed_pages: bool,
    pub feeds: Vec<FeedDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public/data"),
            items_per_page: 20,
            description_max_chars: 300,
            max_items_per_feed: 50,
            request_timeout_secs: 15,
            user_agent: format!("feedwall/{} (+RSS aggregator)", env!("CARGO_PKG_VERSION")),
            fetch_strategy: FetchStrategy::Parallel,
            max_concurrency: 8,
            request_delay_ms: 1000,
            timestamp_policy: TimestampPolicy::Strict,
            per_feed_pages: true,
            feeds: Vec::new(),
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "output_dir",
    "items_per_page",
    "description_max_chars",
    "max_items_per_feed",
    "request_timeout_secs",
    "user_agent",
    "fetch_strategy",
    "max_concurrency",
    "request_delay_ms",
    "timestamp_policy",
    "per_feed_pages",
    "feeds",
];

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate configuration from a TOML file.
    ///
    /// - Missing file → `Err(ConfigError::Io)`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Out-of-range values or bad feed entries → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Config file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            feeds = config.feeds.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges and the feed registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("items_per_page", self.items_per_page as u64, 1, 1000)?;
        check_range("description_max_chars", self.description_max_chars as u64, 1, 100_000)?;
        check_range("max_items_per_feed", self.max_items_per_feed as u64, 1, 500)?;
        check_range("request_timeout_secs", self.request_timeout_secs, 1, 120)?;
        check_range("max_concurrency", self.max_concurrency as u64, 1, 64)?;

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("user_agent must not be empty".into()));
        }

        for (index, feed) in self.feeds.iter().enumerate() {
            if feed.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "feeds[{index}]: name must not be empty"
                )));
            }
            if let Err(e) = validate_feed_url(&feed.url) {
                return Err(ConfigError::Invalid(format!(
                    "feeds[{index}] ({}): {e}",
                    feed.name
                )));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn check_range(key: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{key} = {value} is outside {min}..={max}"
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================
