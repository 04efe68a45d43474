//! Raw feed item → [`NormalizedItem`].
//!
//! Sanitization is allow-list based: anything not explicitly permitted is
//! dropped, never escaped-and-kept. Descriptions keep a small set of
//! formatting tags; titles keep none.
use ammonia::{Builder, UrlRelative};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

use super::parser::{DEFAULT_ITEM_LINK, DEFAULT_ITEM_TITLE};
use super::types::{FeedInfo, NormalizedItem, RawItem};
use crate::config::{FeedDescriptor, TimestampPolicy};
use crate::util::{collapse_whitespace, resolve_item_link, strip_control_chars, truncate_html};

/// Length of a derived item ID.
pub const ID_LENGTH: usize = 16;

const DESCRIPTION_TAGS: &[&str] = &["p", "br", "strong", "b", "em", "i", "a", "ul", "ol", "li"];
const LINK_ATTRIBUTES: &[&str] = &["href", "target"];
const URL_SCHEMES: &[&str] = &["http", "https", "mailto"];
/// Elements removed together with their content.
const DROPPED_CONTENT_TAGS: &[&str] = &["script", "style"];

static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid CDATA regex"));
static SCRIPT_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(javascript|vbscript)(\s*):").expect("valid scheme regex")
});
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(on[a-z]+)(\s*)=").expect("valid handler regex"));

static DESCRIPTION_SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::empty();
    builder
        .tags(DESCRIPTION_TAGS.iter().copied().collect())
        .tag_attributes(HashMap::from([(
            "a",
            LINK_ATTRIBUTES.iter().copied().collect::<HashSet<_>>(),
        )]))
        .url_schemes(URL_SCHEMES.iter().copied().collect())
        .url_relative(UrlRelative::PassThrough)
        .link_rel(None)
        .clean_content_tags(DROPPED_CONTENT_TAGS.iter().copied().collect());
    builder
});

static TEXT_SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::empty();
    builder.clean_content_tags(DROPPED_CONTENT_TAGS.iter().copied().collect());
    builder
});

/// A single item that cannot be normalized. Dropped, never propagated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    /// Neither a guid nor a link to derive a stable ID from.
    #[error("item has neither guid nor link")]
    MissingIdentity,
}

/// Per-build normalization settings.
#[derive(Debug, Clone)]
pub struct Normalizer {
    description_max_chars: usize,
    timestamp_policy: TimestampPolicy,
    /// Build start time (epoch ms), the base for lenient timestamps.
    now_ms: i64,
}

impl Normalizer {
    pub fn new(description_max_chars: usize, timestamp_policy: TimestampPolicy, now_ms: i64) -> Self {
        Self {
            description_max_chars,
            timestamp_policy,
            now_ms,
        }
    }

    /// Normalizes one raw item. `index` is the item's position in its feed.
    pub fn normalize(
        &self,
        raw: &RawItem,
        index: usize,
        descriptor: &FeedDescriptor,
        info: &FeedInfo,
    ) -> Result<NormalizedItem, ItemError> {
        let identity = if !raw.guid.trim().is_empty() && raw.guid != DEFAULT_ITEM_LINK {
            raw.guid.trim()
        } else if !raw.link.trim().is_empty() && raw.link != DEFAULT_ITEM_LINK {
            raw.link.trim()
        } else {
            return Err(ItemError::MissingIdentity);
        };

        let title = sanitize_title(&raw.title);
        let base = (!info.link.is_empty()).then_some(info.link.as_str());

        Ok(NormalizedItem {
            id: derive_id(identity, &descriptor.name),
            title: if title.is_empty() {
                DEFAULT_ITEM_TITLE.to_string()
            } else {
                title
            },
            link: resolve_item_link(&raw.link, base),
            description: sanitize_description(&raw.description, self.description_max_chars),
            pub_date: raw.pub_date.clone(),
            timestamp: self.timestamp(&raw.pub_date, index),
            feed_name: descriptor.name.clone(),
            category: descriptor.category.clone(),
            feed_source: info.link.clone(),
        })
    }

    /// Normalizes every item of a feed, dropping the ones that fail.
    pub fn normalize_all(
        &self,
        raw_items: &[RawItem],
        descriptor: &FeedDescriptor,
        info: &FeedInfo,
    ) -> Vec<NormalizedItem> {
        raw_items
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| match self.normalize(raw, index, descriptor, info) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::debug!(
                        feed = %descriptor.name,
                        index = index,
                        error = %e,
                        "Dropping item"
                    );
                    None
                }
            })
            .collect()
    }

    /// Applies [`sanitize_title`] to channel text so feed info is as safe
    /// as item text.
    pub fn sanitize_feed_info(&self, info: FeedInfo, descriptor: &FeedDescriptor) -> FeedInfo {
        let title = sanitize_title(&info.title);
        let link = resolve_item_link(&info.link, None);
        FeedInfo {
            title: if title.is_empty() {
                descriptor.name.clone()
            } else {
                title
            },
            description: sanitize_title(&info.description),
            link: if link == DEFAULT_ITEM_LINK {
                String::new()
            } else {
                link
            },
        }
    }

    fn timestamp(&self, pub_date: &str, index: usize) -> i64 {
        match (parse_timestamp(pub_date), self.timestamp_policy) {
            (Some(ts), _) => ts,
            (None, TimestampPolicy::Strict) => 0,
            (None, TimestampPolicy::Lenient) => self.now_ms - index as i64,
        }
    }
}

/// Derives the stable item ID from `guid` (or link) and the feed name.
///
/// SHA-256 of the concatenation, URL-safe base64 without padding, first
/// [`ID_LENGTH`] characters. Collisions are possible in principle; the ID is
/// an identifier for display and linking, not a security boundary.
pub fn derive_id(guid: &str, feed_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(guid.as_bytes());
    hasher.update(feed_name.as_bytes());
    let mut encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
    encoded.truncate(ID_LENGTH);
    encoded
}

/// Replaces every `<![CDATA[...]]>` wrapper with its inner text.
pub fn unwrap_cdata(text: &str) -> std::borrow::Cow<'_, str> {
    CDATA.replace_all(text, "$1")
}

/// Sanitizes description HTML down to the allow-list, then truncates it to
/// `max_chars` characters (plus `"..."` when cut).
///
/// A cut that would split a tag or character reference backs off to its
/// start, so the result may be shorter than `max_chars + 3`.
pub fn sanitize_description(raw: &str, max_chars: usize) -> String {
    let unwrapped = unwrap_cdata(raw);
    let clean = neutralize_script_tokens(&DESCRIPTION_SANITIZER.clean(&unwrapped).to_string());
    truncate_html(clean.trim(), max_chars).into_owned()
}

/// Strips all markup, leaving HTML-escaped plain text on one line.
pub fn sanitize_title(raw: &str) -> String {
    let unwrapped = unwrap_cdata(raw);
    let clean = neutralize_script_tokens(&TEXT_SANITIZER.clean(&unwrapped).to_string());
    collapse_whitespace(&strip_control_chars(&clean))
}

/// Entity-encodes the `:` of `javascript:`/`vbscript:` and the `=` of
/// `on<event>=` wherever they survive in sanitized HTML (text or an allowed
/// URL). Browsers render the same characters; the raw tokens are gone.
pub fn neutralize_script_tokens(html: &str) -> String {
    let html = SCRIPT_SCHEME.replace_all(html, "${1}${2}&#58;");
    EVENT_HANDLER.replace_all(&html, "${1}${2}&#61;").into_owned()
}

/// Parses feed date text into epoch milliseconds.
///
/// Accepts RFC 2822 (RSS), RFC 3339 (Atom), RFC 2822 with a `UTC` zone name,
/// ISO 8601 with a colon-less offset (`+0000`), and naive
/// `YYYY-MM-DD[ HH:MM:SS]` forms interpreted as UTC. A weekday that does not
/// match the date is ignored.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(ts) = parse_rfc2822(text) {
        return Some(ts);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    if let Some(rest) = text.strip_suffix("UTC") {
        if let Some(ts) = parse_rfc2822(&format!("{}+0000", rest)) {
            return Some(ts);
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.timestamp_millis());
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc().timestamp_millis());
    }

    None
}

/// RFC 2822, retried without the leading `Www,` when chrono rejects a
/// weekday that disagrees with the date.
fn parse_rfc2822(text: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.timestamp_millis());
    }
    let (_, rest) = text.split_once(',')?;
    DateTime::parse_from_rfc2822(rest.trim_start())
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor() -> FeedDescriptor {
        FeedDescriptor::new("Example", "https://example.com/rss", "tech")
    }

    fn info() -> FeedInfo {
        FeedInfo {
            title: "Example Blog".into(),
            description: String::new(),
            link: "https://example.com/".into(),
        }
    }

    fn raw(guid: &str, pub_date: &str) -> RawItem {
        RawItem {
            title: "A <b>bold</b> title".into(),
            link: "/posts/1".into(),
            description: "<p>Body</p>".into(),
            pub_date: pub_date.into(),
            guid: guid.into(),
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = derive_id("post-1", "Example");
        let b = derive_id("post-1", "Example");
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LENGTH);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_id_depends_on_feed_name() {
        assert_ne!(derive_id("post-1", "Example"), derive_id("post-1", "Other"));
        assert_ne!(derive_id("post-1", "Example"), derive_id("post-2", "Example"));
    }

    #[test]
    fn test_normalize_fields() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let item = normalizer
            .normalize(&raw("post-1", "Tue, 10 Jun 2003 04:00:00 GMT"), 0, &descriptor(), &info())
            .unwrap();
        assert_eq!(item.id, derive_id("post-1", "Example"));
        assert_eq!(item.title, "A bold title");
        assert_eq!(item.link, "https://example.com/posts/1");
        assert_eq!(item.description, "<p>Body</p>");
        assert_eq!(item.pub_date, "Tue, 10 Jun 2003 04:00:00 GMT");
        assert_eq!(item.timestamp, 1_055_217_600_000);
        assert_eq!(item.feed_name, "Example");
        assert_eq!(item.category, "tech");
        assert_eq!(item.feed_source, "https://example.com/");
    }

    #[test]
    fn test_id_falls_back_to_link() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let mut item = raw("", "");
        item.link = "https://example.com/x".into();
        let normalized = normalizer.normalize(&item, 0, &descriptor(), &info()).unwrap();
        assert_eq!(normalized.id, derive_id("https://example.com/x", "Example"));
    }

    #[test]
    fn test_item_without_identity_is_dropped() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let mut bad = raw("#", "");
        bad.link = "#".into();
        assert_eq!(
            normalizer.normalize(&bad, 0, &descriptor(), &info()),
            Err(ItemError::MissingIdentity)
        );

        let items = vec![raw("a", ""), bad, raw("b", "")];
        let normalized = normalizer.normalize_all(&items, &descriptor(), &info());
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn test_strict_policy_zero_timestamp() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 1_700_000_000_000);
        let item = normalizer
            .normalize(&raw("g", "not a date"), 3, &descriptor(), &info())
            .unwrap();
        assert_eq!(item.timestamp, 0);
        assert_eq!(item.pub_date, "not a date");
    }

    #[test]
    fn test_lenient_policy_substitutes_build_time() {
        let now = 1_700_000_000_000;
        let normalizer = Normalizer::new(300, TimestampPolicy::Lenient, now);
        let first = normalizer.normalize(&raw("a", ""), 0, &descriptor(), &info()).unwrap();
        let second = normalizer.normalize(&raw("b", "junk"), 1, &descriptor(), &info()).unwrap();
        assert_eq!(first.timestamp, now);
        assert_eq!(second.timestamp, now - 1);
        // Parsed dates win regardless of policy
        let dated = normalizer
            .normalize(&raw("c", "2024-01-01T00:00:00Z"), 2, &descriptor(), &info())
            .unwrap();
        assert_eq!(dated.timestamp, 1_704_067_200_000);
    }

    #[test]
    fn test_sanitize_strips_script() {
        let out = sanitize_description("<p>Hi</p><script>alert('x')</script>", 300);
        assert_eq!(out, "<p>Hi</p>");
    }

    #[test]
    fn test_sanitize_strips_event_handlers() {
        let out = sanitize_description(r#"<img src="x" onerror="alert(1)"><p onclick="x()">ok</p>"#, 300);
        assert!(!out.contains("onerror="));
        assert!(!out.contains("onclick"));
        assert!(!out.contains("<img"));
        assert_eq!(out, "<p>ok</p>");
    }

    #[test]
    fn test_sanitize_strips_javascript_scheme() {
        let out = sanitize_description(r#"<a href="javascript:alert(1)">click</a>"#, 300);
        assert!(!out.contains("javascript:"));
        assert_eq!(out, "<a>click</a>");
    }

    #[test]
    fn test_sanitize_keeps_allowed_link_attributes() {
        let out = sanitize_description(
            r#"<a href="https://example.com" target="_blank" class="x" rel="me">link</a>"#,
            300,
        );
        assert_eq!(out, r#"<a href="https://example.com" target="_blank">link</a>"#);
        let mail = sanitize_description(r#"<a href="mailto:me@example.com">mail</a>"#, 300);
        assert_eq!(mail, r#"<a href="mailto:me@example.com">mail</a>"#);
    }

    #[test]
    fn test_sanitize_drops_disallowed_tags_keeps_text() {
        let out = sanitize_description("<div><h1>Head</h1><span>text</span></div>", 300);
        assert_eq!(out, "Headtext");
    }

    #[test]
    fn test_cdata_unwrapped() {
        assert_eq!(unwrap_cdata("<![CDATA[<p>x</p>]]>"), "<p>x</p>");
        assert_eq!(unwrap_cdata("<![CDATA[a\nb]]> and <![CDATA[c]]>"), "a\nb and c");
        let out = sanitize_description("<![CDATA[<p>Wrapped</p>]]>", 300);
        assert_eq!(out, "<p>Wrapped</p>");
    }

    #[test]
    fn test_truncation_appends_ellipsis() {
        let long = "a".repeat(400);
        let out = sanitize_description(&long, 300);
        assert_eq!(out.chars().count(), 303);
        assert!(out.ends_with("..."));

        let short = sanitize_description("short", 300);
        assert_eq!(short, "short");
    }

    #[test]
    fn test_title_has_no_markup() {
        assert_eq!(sanitize_title("<em>Hello</em>  <script>bad()</script>world"), "Hello world");
        assert_eq!(sanitize_title("<![CDATA[Wrapped <b>title</b>]]>"), "Wrapped title");
        assert_eq!(sanitize_title("Tom & Jerry"), "Tom &amp; Jerry");
    }

    #[test]
    fn test_empty_title_uses_default() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let mut item = raw("g", "");
        item.title = "<img src=x>".into();
        let normalized = normalizer.normalize(&item, 0, &descriptor(), &info()).unwrap();
        assert_eq!(normalized.title, DEFAULT_ITEM_TITLE);
    }

    #[test]
    fn test_unsafe_item_link_becomes_placeholder() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let mut item = raw("g", "");
        item.link = "javascript:alert(1)".into();
        let normalized = normalizer.normalize(&item, 0, &descriptor(), &info()).unwrap();
        assert_eq!(normalized.link, "#");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2003 04:00:00 GMT"),
            Some(1_055_217_600_000)
        );
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2003 04:00:00 +0000"),
            Some(1_055_217_600_000)
        );
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2003 04:00:00 UTC"),
            Some(1_055_217_600_000)
        );
        assert_eq!(parse_timestamp("2003-06-10T04:00:00Z"), Some(1_055_217_600_000));
        assert_eq!(parse_timestamp("2003-06-10T06:00:00+02:00"), Some(1_055_217_600_000));
        assert_eq!(parse_timestamp("2003-06-10 04:00:00"), Some(1_055_217_600_000));
        assert_eq!(parse_timestamp("2003-06-10"), Some(1_055_203_200_000));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00+0000"), Some(1_704_067_200_000));
        assert_eq!(parse_timestamp("2024-01-01T02:00:00.250+0200"), Some(1_704_067_200_250));
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_timestamp_ignores_wrong_weekday() {
        // 10 Jun 2003 was a Tuesday
        assert_eq!(
            parse_timestamp("Mon, 10 Jun 2003 04:00:00 GMT"),
            Some(1_055_217_600_000)
        );
        assert_eq!(
            parse_timestamp("Fri, 10 Jun 2003 04:00:00 UTC"),
            Some(1_055_217_600_000)
        );
        assert_eq!(parse_timestamp("10 Jun 2003 04:00:00 +0000"), Some(1_055_217_600_000));
        assert_eq!(parse_timestamp("Mon, garbage"), None);
    }

    #[test]
    fn test_wrong_weekday_item_kept_under_strict() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let item = normalizer
            .normalize(&raw("g", "Mon, 10 Jun 2003 04:00:00 GMT"), 0, &descriptor(), &info())
            .unwrap();
        assert_eq!(item.timestamp, 1_055_217_600_000);
    }

    #[test]
    fn test_script_tokens_in_text_neutralized() {
        let out = sanitize_description("<p>set onerror= to javascript:void</p>", 300);
        assert_eq!(out, "<p>set onerror&#61; to javascript&#58;void</p>");
        assert!(!out.contains("onerror="));
        assert!(!out.contains("javascript:"));

        let title = sanitize_title("Why JavaScript: the good parts");
        assert_eq!(title, "Why JavaScript&#58; the good parts");
    }

    #[test]
    fn test_script_tokens_in_allowed_url_neutralized() {
        let out = sanitize_description(
            r#"<a href="https://example.com/?next=javascript:x&amp;onload=1">go</a>"#,
            300,
        );
        assert!(!out.contains("javascript:"));
        assert!(!out.contains("onload="));
        assert!(out.starts_with(r#"<a href="https://example.com/?next=javascript&#58;x"#));
    }

    #[test]
    fn test_plain_words_untouched() {
        let out = sanitize_description("<p>upon=one, mailto: and onwards</p>", 300);
        assert_eq!(out, "<p>upon=one, mailto: and onwards</p>");
    }

    #[test]
    fn test_truncation_never_splits_a_tag() {
        let html = format!("{}<a href=\"https://example.com/long\">link</a>", "a".repeat(20));
        let out = sanitize_description(&html, 30);
        assert_eq!(out, format!("{}...", "a".repeat(20)));
    }

    #[test]
    fn test_feed_info_sanitized() {
        let normalizer = Normalizer::new(300, TimestampPolicy::Strict, 0);
        let dirty = FeedInfo {
            title: "<b></b>".into(),
            description: "A <i>blog</i>".into(),
            link: "javascript:void(0)".into(),
        };
        let clean = normalizer.sanitize_feed_info(dirty, &descriptor());
        assert_eq!(clean.title, "Example");
        assert_eq!(clean.description, "A blog");
        assert_eq!(clean.link, "");
    }
}
