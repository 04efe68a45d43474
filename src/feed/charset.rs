//! Feed body bytes → UTF-8 text.
//!
//! The character set is taken from, in order: a byte-order mark, the HTTP
//! `Content-Type` charset, the XML declaration's `encoding`, then UTF-8.
//! Labels follow the WHATWG Encoding Standard, so `ISO-8859-1` decodes as
//! `windows-1252` like it does in browsers.
use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;
use std::sync::LazyLock;

/// Leading bytes searched for an XML declaration.
const DECLARATION_WINDOW: usize = 1024;

static XML_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?-u)^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("valid XML declaration regex")
});

/// Decodes a feed body using its declared character set.
///
/// Invalid sequences become U+FFFD; decoding never fails.
pub fn decode_feed_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = Encoding::for_bom(bytes)
        .map(|(encoding, _)| encoding)
        .or_else(|| {
            content_type
                .and_then(charset_param)
                .and_then(|label| Encoding::for_label(label.as_bytes()))
        })
        .or_else(|| declared_encoding(bytes))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::debug!(encoding = used.name(), "Invalid byte sequences in feed body replaced");
    }
    text.into_owned()
}

/// The `charset` parameter of a `Content-Type` value, unquoted.
fn charset_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    let label = XML_ENCODING.captures(head)?.get(1)?.as_bytes();
    // A declaration readable as ASCII cannot be UTF-16; output_encoding maps it to UTF-8
    Encoding::for_label(label).map(Encoding::output_encoding)
}
