use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Placeholder link used when an item has no usable URL.
pub const PLACEHOLDER_LINK: &str = "#";

/// Validates a URL string for use as a feed source.
///
/// Only absolute `http`/`https` URLs with a host are accepted; `file://`,
/// `ftp://` and friends are rejected before any request is made.
///
/// # Examples
///
/// ```
/// use feedwall::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("not a url").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if matches!(url.host_str(), None | Some("")) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Resolves an item link into an absolute `http`/`https` URL.
///
/// Relative links are joined onto `base` (the channel link) when one is
/// available. Empty links, unparseable links and any other scheme
/// (`javascript:`, `data:`, ...) collapse to [`PLACEHOLDER_LINK`].
pub fn resolve_item_link(link: &str, base: Option<&str>) -> String {
    let link = link.trim();
    if link.is_empty() || link == PLACEHOLDER_LINK {
        return PLACEHOLDER_LINK.to_string();
    }

    let resolved = match Url::parse(link) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .and_then(|b| Url::parse(b.trim()).ok())
            .and_then(|b| b.join(link).ok()),
        Err(_) => None,
    };

    match resolved {
        Some(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
        _ => PLACEHOLDER_LINK.to_string(),
    }
}
