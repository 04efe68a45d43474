use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

use super::types::{FeedInfo, ParsedFeed, RawItem};

/// Title used for items that have none.
pub const DEFAULT_ITEM_TITLE: &str = "No Title";
/// Link used for items that have none.
pub const DEFAULT_ITEM_LINK: &str = "#";

/// Errors returned when a document cannot be read as a feed at all.
///
/// Recoverable damage (mismatched end tags, unknown entities, a document
/// cut off after some items) never produces an error; the items read so
/// far are returned instead.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No `rss`, `rdf:RDF`, `feed`, `channel`, `item` or `entry` element.
    #[error("Parse error: no RSS or Atom structure found")]
    NoFeedStructure,
    /// The XML broke before any feed structure was seen.
    #[error("Parse error: invalid XML at byte {position}: {message}")]
    Xml { position: u64, message: String },
}

/// Element slots read from channels and items. RSS and Atom names map onto
/// the same slots; the fallback chains live in [`RawItem`] construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Title,
    Link,
    Description,
    ContentEncoded,
    Summary,
    Content,
    Subtitle,
    PubDate,
    DcDate,
    Published,
    Updated,
    Guid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Channel,
    Item,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    scope: Scope,
    /// Stack depth of the captured element itself.
    depth: usize,
    text: String,
}

#[derive(Debug)]
struct ItemState {
    depth: usize,
    /// False for items past the per-feed cap; they are read but discarded.
    keep: bool,
    fields: HashMap<Field, String>,
}

/// What a `<link>` element's attributes say about it.
enum LinkAttr {
    /// No `href`: an RSS link whose URL is the element text.
    Absent,
    /// Atom link with a `rel` other than `alternate` (`self`, `enclosure`, ...).
    Ignored,
    Href(String),
}

/// Parses RSS 2.0, RSS 1.0 (RDF) and Atom documents into raw items.
///
/// Channel `title` falls back to `fallback_title`; at most `max_items`
/// items are extracted in document order.
///
/// # Errors
///
/// - [`ParseError::NoFeedStructure`] when the document is XML but not a feed
///   (an HTML error page, an empty body, ...)
/// - [`ParseError::Xml`] when the XML is broken before any feed element
pub fn parse_feed(
    text: &str,
    fallback_title: &str,
    max_items: usize,
) -> Result<ParsedFeed, ParseError> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations, so DOCTYPE-based
    // entity tricks in hostile feeds fall through as unresolved text.
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = false;

    let mut state = ParseState::new(max_items);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => state.open(&e, &reader, false),
            Ok(Event::Empty(e)) => state.open(&e, &reader, true),
            Ok(Event::End(e)) => {
                let qname = e.name();
                let (_, local) = split_qname(qname.as_ref());
                state.close(local);
            }
            Ok(Event::Text(e)) => {
                let decoded = e
                    .unescape()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                state.text(&decoded);
            }
            Ok(Event::CData(e)) => state.text(&String::from_utf8_lossy(&e)),
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let position = reader.buffer_position() as u64;
                if !state.saw_structure {
                    return Err(ParseError::Xml {
                        position,
                        message: e.to_string(),
                    });
                }
                tracing::warn!(
                    position = position,
                    error = %e,
                    items = state.items.len(),
                    "Malformed feed XML, keeping items read so far"
                );
                break;
            }
        }
    }

    state.finish(fallback_title)
}

struct ParseState {
    stack: Vec<Vec<u8>>,
    saw_structure: bool,
    capture: Option<Capture>,
    item: Option<ItemState>,
    channel: HashMap<Field, String>,
    items: Vec<RawItem>,
    skipped: usize,
    max_items: usize,
}

impl ParseState {
    fn new(max_items: usize) -> Self {
        Self {
            stack: Vec::new(),
            saw_structure: false,
            capture: None,
            item: None,
            channel: HashMap::new(),
            items: Vec::new(),
            skipped: 0,
            max_items,
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, reader: &Reader<&[u8]>, empty: bool) {
        let qname = e.name();
        let (prefix, local) = split_qname(qname.as_ref());

        // Markup nested inside a captured field contributes text only
        if self.capture.is_some() {
            if !empty {
                self.stack.push(local.to_vec());
            }
            return;
        }

        let parent = self.stack.last().map(Vec::as_slice);
        let mut pending: Option<(Field, Scope)> = None;

        match local {
            b"rss" | b"RDF" | b"channel" | b"feed" if self.item.is_none() => {
                self.saw_structure = true;
            }
            b"item" | b"entry" if self.item.is_none() => {
                self.saw_structure = true;
                if empty {
                    // An empty item has nothing to extract but still counts
                    self.start_item(0);
                    self.end_item();
                    return;
                }
                self.start_item(self.stack.len() + 1);
            }
            _ => {
                if let Some(item) = self.item.as_mut() {
                    if self.stack.len() == item.depth {
                        if let Some(field) = item_field(prefix, local) {
                            pending = resolve_link_field(field, e, reader, &mut item.fields)
                                .map(|f| (f, Scope::Item));
                        }
                    }
                } else if matches!(parent, Some(b"channel") | Some(b"feed")) {
                    if let Some(field) = channel_field(prefix, local) {
                        pending = resolve_link_field(field, e, reader, &mut self.channel)
                            .map(|f| (f, Scope::Channel));
                    }
                }
            }
        }

        if empty {
            return;
        }
        self.stack.push(local.to_vec());

        if let Some((field, scope)) = pending {
            self.capture = Some(Capture {
                field,
                scope,
                depth: self.stack.len(),
                text: String::new(),
            });
        }
    }

    fn close(&mut self, local: &[u8]) {
        // Unmatched end tags are ignored; unclosed children are closed implicitly
        let Some(pos) = self.stack.iter().rposition(|name| name.as_slice() == local) else {
            return;
        };
        self.stack.truncate(pos);

        if self
            .capture
            .as_ref()
            .is_some_and(|c| self.stack.len() < c.depth)
        {
            self.end_capture();
        }
        if self
            .item
            .as_ref()
            .is_some_and(|item| self.stack.len() < item.depth)
        {
            self.end_item();
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn start_item(&mut self, depth: usize) {
        let keep = self.items.len() < self.max_items;
        if !keep {
            self.skipped += 1;
        }
        self.item = Some(ItemState {
            depth,
            keep,
            fields: HashMap::new(),
        });
    }

    fn end_capture(&mut self) {
        let Some(capture) = self.capture.take() else {
            return;
        };
        let value = capture.text.trim();
        if value.is_empty() {
            return;
        }
        let target = match capture.scope {
            Scope::Channel => &mut self.channel,
            Scope::Item => match self.item.as_mut() {
                Some(item) => &mut item.fields,
                None => return,
            },
        };
        target
            .entry(capture.field)
            .or_insert_with(|| value.to_string());
    }

    fn end_item(&mut self) {
        let Some(mut item) = self.item.take() else {
            return;
        };
        if item.keep {
            self.items.push(raw_item(&mut item.fields));
        }
    }

    fn finish(mut self, fallback_title: &str) -> Result<ParsedFeed, ParseError> {
        // Documents cut off mid-item still yield what was read
        self.end_capture();
        self.end_item();

        if !self.saw_structure {
            return Err(ParseError::NoFeedStructure);
        }

        let channel = &mut self.channel;
        let info = FeedInfo {
            title: channel
                .remove(&Field::Title)
                .unwrap_or_else(|| fallback_title.to_string()),
            description: channel
                .remove(&Field::Description)
                .or_else(|| channel.remove(&Field::Subtitle))
                .unwrap_or_default(),
            link: channel.remove(&Field::Link).unwrap_or_default(),
        };

        Ok(ParsedFeed {
            info,
            items: self.items,
            skipped: self.skipped,
        })
    }
}

fn raw_item(fields: &mut HashMap<Field, String>) -> RawItem {
    let mut first = |chain: &[Field]| chain.iter().find_map(|f| fields.remove(f));

    let title = first(&[Field::Title]).unwrap_or_else(|| DEFAULT_ITEM_TITLE.to_string());
    let link = first(&[Field::Link]).unwrap_or_else(|| DEFAULT_ITEM_LINK.to_string());
    let description = first(&[
        Field::Description,
        Field::ContentEncoded,
        Field::Summary,
        Field::Content,
    ])
    .unwrap_or_default();
    let pub_date = first(&[
        Field::PubDate,
        Field::DcDate,
        Field::Published,
        Field::Updated,
    ])
    .unwrap_or_default();
    let guid = first(&[Field::Guid]).unwrap_or_else(|| link.clone());

    RawItem {
        title,
        link,
        description,
        pub_date,
        guid,
    }
}

/// For `<link>` elements, records an Atom `href` directly and reports that no
/// text capture is needed. Every other field is passed through for capture.
fn resolve_link_field(
    field: Field,
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
    target: &mut HashMap<Field, String>,
) -> Option<Field> {
    if field != Field::Link {
        return Some(field);
    }
    match link_attr(e, reader) {
        LinkAttr::Absent => Some(field),
        LinkAttr::Ignored => None,
        LinkAttr::Href(href) => {
            if !href.trim().is_empty() {
                target
                    .entry(Field::Link)
                    .or_insert_with(|| href.trim().to_string());
            }
            None
        }
    }
}

fn link_attr(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> LinkAttr {
    let mut href = None;
    let mut rel = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed link attribute");
                continue;
            }
        };
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => rel = Some(value),
            _ => {}
        }
    }

    match (href, rel.as_deref()) {
        (None, _) => LinkAttr::Absent,
        (Some(href), None | Some("alternate")) => LinkAttr::Href(href),
        (Some(_), Some(_)) => LinkAttr::Ignored,
    }
}

/// Splits `prefix:local`. The `atom:` prefix is treated as unprefixed so
/// fully-prefixed Atom documents read like default-namespace ones.
fn split_qname(qname: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match qname.iter().position(|&b| b == b':') {
        Some(i) if &qname[..i] == b"atom" => (None, &qname[i + 1..]),
        Some(i) => (Some(&qname[..i]), &qname[i + 1..]),
        None => (None, qname),
    }
}

fn item_field(prefix: Option<&[u8]>, local: &[u8]) -> Option<Field> {
    match (prefix, local) {
        (None, b"title") => Some(Field::Title),
        (None, b"link") => Some(Field::Link),
        (None, b"description") => Some(Field::Description),
        (Some(b"content"), b"encoded") => Some(Field::ContentEncoded),
        (None, b"summary") => Some(Field::Summary),
        (None, b"content") => Some(Field::Content),
        (None, b"pubDate") => Some(Field::PubDate),
        (Some(b"dc"), b"date") => Some(Field::DcDate),
        (None, b"published") => Some(Field::Published),
        (None, b"updated") => Some(Field::Updated),
        (None, b"guid") | (None, b"id") => Some(Field::Guid),
        _ => None,
    }
}

fn channel_field(prefix: Option<&[u8]>, local: &[u8]) -> Option<Field> {
    match (prefix, local) {
        (None, b"title") => Some(Field::Title),
        (None, b"link") => Some(Field::Link),
        (None, b"description") => Some(Field::Description),
        (None, b"subtitle") => Some(Field::Subtitle),
        _ => None,
    }
}
