use futures::stream::{self, StreamExt};
use std::time::Duration;
use thiserror::Error;

use super::charset::decode_feed_body;
use super::normalize::Normalizer;
use super::parser::{parse_feed, ParseError};
use super::types::FeedFetchResult;
use crate::config::{Config, FeedDescriptor, FetchStrategy};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: {status} {reason}")]
    HttpStatus { status: u16, reason: String },
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Any failure that takes a whole feed out of the build.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Builds the HTTP client shared by every fetch in a build.
///
/// The client carries the configured `User-Agent` and timeout; the timeout is
/// also enforced around each whole request in [`fetch_feed_text`].
pub fn build_client(config: &Config) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
}

/// Retrieves the body of one feed as UTF-8 text.
///
/// The body is decoded with its declared character set (BOM, `Content-Type`
/// charset or XML declaration); see [`decode_feed_body`].
///
/// # Errors
///
/// - [`FetchError::Timeout`] - no complete response within `timeout`
/// - [`FetchError::HttpStatus`] - non-2xx response
/// - [`FetchError::Network`] - connection, TLS or body stream errors
/// - [`FetchError::ResponseTooLarge`] - body over 10MB
/// - [`FetchError::IncompleteResponse`] - body shorter than Content-Length
///
/// No retries happen here; a failed feed stays failed for the build.
pub async fn fetch_feed_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    let request = async {
        let response = client.get(url).send().await.map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bytes = read_limited_bytes(response, MAX_FEED_SIZE, timeout).await?;
        Ok((bytes, content_type))
    };

    let (bytes, content_type) = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| FetchError::Timeout(timeout))??;

    Ok(decode_feed_body(&bytes, content_type.as_deref()))
}

fn classify(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Network(e)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| classify(e, timeout))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: Network interruptions can end the stream early
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

/// Fetches, parses and normalizes a single feed.
///
/// Never fails: any fetch or parse error is recorded on the returned
/// [`FeedFetchResult`] so the rest of the build can proceed.
pub async fn fetch_one(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    config: &Config,
    normalizer: &Normalizer,
) -> FeedFetchResult {
    match process_feed(client, descriptor, config, normalizer).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(feed = %descriptor.name, url = %descriptor.url, error = %e, "Feed failed");
            FeedFetchResult::failed(descriptor.clone(), e)
        }
    }
}

async fn process_feed(
    client: &reqwest::Client,
    descriptor: &FeedDescriptor,
    config: &Config,
    normalizer: &Normalizer,
) -> Result<FeedFetchResult, FeedError> {
    let body = fetch_feed_text(client, &descriptor.url, config.request_timeout()).await?;
    let parsed = parse_feed(&body, &descriptor.name, config.max_items_per_feed)?;

    if parsed.skipped > 0 {
        tracing::debug!(
            feed = %descriptor.name,
            skipped = parsed.skipped,
            cap = config.max_items_per_feed,
            "Items beyond per-feed cap ignored"
        );
    }

    let info = normalizer.sanitize_feed_info(parsed.info, descriptor);
    let items = normalizer.normalize_all(&parsed.items, descriptor, &info);
    let dropped = parsed.items.len() - items.len();
    if dropped > 0 {
        tracing::warn!(feed = %descriptor.name, dropped = dropped, "Malformed items dropped");
    }

    tracing::info!(feed = %descriptor.name, items = items.len(), "Fetched feed");
    Ok(FeedFetchResult::succeeded(descriptor.clone(), info, items))
}

/// Fetches every configured feed using the configured strategy.
///
/// # Returns
///
/// One [`FeedFetchResult`] per descriptor, in descriptor order, regardless of
/// strategy or completion order. Failed feeds are included.
///
/// # Behavior
///
/// - [`FetchStrategy::Parallel`]: up to `max_concurrency` requests in flight
/// - [`FetchStrategy::Serialized`]: one request at a time with
///   `request_delay_ms` between consecutive requests
pub async fn fetch_all(
    client: &reqwest::Client,
    config: &Config,
    normalizer: &Normalizer,
) -> Vec<FeedFetchResult> {
    if config.feeds.is_empty() {
        return Vec::new();
    }

    tracing::info!(
        feeds = config.feeds.len(),
        strategy = ?config.fetch_strategy,
        "Fetching feeds"
    );

    match config.fetch_strategy {
        FetchStrategy::Parallel => {
            // `buffered` (not `buffer_unordered`) keeps results in descriptor order
            stream::iter(config.feeds.iter())
                .map(|descriptor| fetch_one(client, descriptor, config, normalizer))
                .buffered(config.max_concurrency.max(1))
                .collect()
                .await
        }
        FetchStrategy::Serialized => {
            let mut results = Vec::with_capacity(config.feeds.len());
            for (index, descriptor) in config.feeds.iter().enumerate() {
                if index > 0 && !config.request_delay().is_zero() {
                    tokio::time::sleep(config.request_delay()).await;
                }
                results.push(fetch_one(client, descriptor, config, normalizer).await);
            }
            results
        }
    }
}
