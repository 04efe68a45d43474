use std::borrow::Cow;

/// Ellipsis appended when text is cut short.
pub const ELLIPSIS: &str = "...";

/// Truncates a string to at most `max_chars` characters.
///
/// When truncation happens the first `max_chars` characters are kept and
/// [`ELLIPSIS`] is appended, so the result is exactly `max_chars + 3`
/// characters long. Strings that already fit are returned borrowed.
///
/// Counting is by Unicode scalar value, so multi-byte characters are never
/// split.
///
/// # Examples
///
/// ```
/// use feedwall::util::truncate_chars;
///
/// assert_eq!(truncate_chars("Short", 10), "Short");
/// assert_eq!(truncate_chars("Hello World", 5), "Hello...");
/// assert_eq!(truncate_chars("日本語テキスト", 3), "日本語...");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &s[..cut], ELLIPSIS)),
    }
}

/// [`truncate_chars`] for serialized HTML.
///
/// If the cut lands inside a tag (`<a href="...`) or a character reference
/// (`&am`), the kept text backs off to the start of that tag or reference
/// before [`ELLIPSIS`] is appended. The result is never longer than
/// `max_chars + 3` characters and never ends in a partial tag.
///
/// # Examples
///
/// ```
/// use feedwall::util::truncate_html;
///
/// assert_eq!(truncate_html("<p>Hello</p>", 20), "<p>Hello</p>");
/// assert_eq!(truncate_html("Hi <b>there</b>", 5), "Hi ...");
/// assert_eq!(truncate_html("Tom &amp; Jerry", 6), "Tom ...");
/// ```
pub fn truncate_html(html: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = html.char_indices().nth(max_chars) else {
        return Cow::Borrowed(html);
    };

    let mut kept = &html[..cut];
    if let Some(open) = kept.rfind('<') {
        if !kept[open..].contains('>') {
            kept = &kept[..open];
        }
    }
    if let Some(amp) = kept.rfind('&') {
        if !kept[amp..].contains(';') {
            kept = &kept[..amp];
        }
    }

    Cow::Owned(format!("{}{}", kept, ELLIPSIS))
}

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SEC-001: Strip control characters and ANSI escape sequences from text.
///
/// Feed titles end up in JSON consumed by browsers and terminals alike, so
/// anything that could manipulate a terminal is removed.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (terminal byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b) not followed by `[` or `]`
///
/// Preserves: tab (0x09), newline (0x0A), carriage return (0x0D).
///
/// Returns `Cow::Borrowed` when the input contains no control characters (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let len = bytes.len();

    if !bytes.iter().any(|&b| is_stripped_byte(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(len);
    let mut i = 0;

    while i < len {
        let b = bytes[i];

        if b == 0x1b {
            if i + 1 < len && bytes[i + 1] == b'[' {
                // CSI: skip parameter/intermediate bytes through the final byte
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            } else if i + 1 < len && bytes[i + 1] == b']' {
                // OSC: skip until BEL or ST
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && i + 1 < len && bytes[i + 1] == b'\\' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            } else {
                i += 1;
            }
        } else if is_stripped_byte(b) {
            i += 1;
        } else {
            let start = i;
            i += 1;
            while i < len && !is_stripped_byte(bytes[i]) {
                i += 1;
            }
            // SAFETY: we only break on ASCII control bytes, which cannot appear
            // mid-codepoint in valid UTF-8, so s[start..i] is valid UTF-8.
            out.push_str(&s[start..i]);
        }
    }

    Cow::Owned(out)
}

fn is_stripped_byte(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != 0x09 && b != 0x0a && b != 0x0d)
}
