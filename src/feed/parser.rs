//! Streaming RSS 2.0 / RSS 1.0 / Atom parser.
//!
//! The document is consumed as a `quick-xml` event stream by an explicit
//! state machine ([`ParserState`]) that threads a [`Scratch`] record through
//! small token handlers. Nothing is sorted: articles come out in document
//! order. Parsing is all-or-nothing; a syntax error anywhere discards the
//! items collected so far.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::date::parse_date;
use crate::model::Article;
use crate::util::collapse_whitespace;

/// Title given to items that have none.
pub const UNTITLED: &str = "Untitled";
/// Feed title used when the feed's `<title>` element is present but empty.
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// SEC-003: Maximum element nesting accepted before the document is rejected.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    /// The document parsed as XML but never declared a feed-level title.
    #[error("Not an RSS or Atom feed: no feed title found")]
    InvalidFeed,

    /// SEC-003: Nesting depth exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// Feed-level metadata plus the articles found in the document.
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    pub articles: Vec<Article>,
}

/// Parses a feed document, using the current time for undated items.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    parse_feed_at(bytes, Utc::now())
}

/// Parses a feed document; items without a usable date get `now`.
///
/// Entity handling: only the five predefined XML entities and numeric
/// character references are resolved. `quick-xml` never reads `<!ENTITY>`
/// declarations, so a custom entity reference is reported as a syntax error.
pub fn parse_feed_at(bytes: &[u8], now: DateTime<Utc>) -> Result<ParsedFeed, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    // Keep whitespace: text split across nodes ("Hello " + "World") must concatenate verbatim
    reader.config_mut().trim_text(false);

    let mut parser = FeedParser::new(now);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let link = link_attributes(&e, &reader)?;
                parser.start(e.name().as_ref(), link)?;
            }
            Ok(Event::Empty(e)) => {
                let link = link_attributes(&e, &reader)?;
                parser.start(e.name().as_ref(), link)?;
                parser.end(e.name().as_ref());
            }
            Ok(Event::End(e)) => parser.end(e.name().as_ref()),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| ParseError::Syntax(err.to_string()))?;
                parser.text(&text);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                parser.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Syntax(format!(
                    "{} (at byte {})",
                    e,
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    parser.finish()
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Outside,
    InFeedMeta,
    InItem,
}

/// Item fields, grouped by how repeated text is merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemField {
    // Accumulated across text callbacks
    Title,
    Description,
    Content,
    // First non-empty value wins
    Link,
    Date,
    Author,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaField {
    Title,
    Description,
}

/// `href`/`rel` of a link element (Atom style).
#[derive(Debug)]
struct LinkAttr {
    href: String,
    rel: Option<String>,
}

/// Fields collected for the item currently being parsed.
#[derive(Debug, Default)]
struct Scratch {
    title: String,
    description: String,
    content: String,
    link: Option<String>,
    /// First non-alternate link (`self`, `enclosure`, ...), used only if no alternate exists.
    fallback_link: Option<String>,
    pub_date: Option<String>,
    author: Option<String>,
}

impl Scratch {
    fn push(&mut self, field: ItemField, text: &str) {
        match field {
            ItemField::Title => self.title.push_str(text),
            ItemField::Description => self.description.push_str(text),
            ItemField::Content => self.content.push_str(text),
            ItemField::Link => first_wins(&mut self.link, text),
            ItemField::Date => first_wins(&mut self.pub_date, text),
            ItemField::Author => first_wins(&mut self.author, text),
        }
    }

    fn offer_link(&mut self, link: LinkAttr) {
        match link.rel.as_deref() {
            None | Some("alternate") => first_wins(&mut self.link, &link.href),
            Some(_) => first_wins(&mut self.fallback_link, &link.href),
        }
    }

    fn materialize(self, now: DateTime<Utc>) -> RawArticle {
        let title = collapse_whitespace(&self.title);
        let content = match self.content.trim() {
            "" => self.description.trim().to_string(),
            content => content.to_string(),
        };

        RawArticle {
            title: if title.is_empty() {
                UNTITLED.to_string()
            } else {
                title
            },
            content,
            url: self.link.or(self.fallback_link).unwrap_or_default(),
            publish_date: self.pub_date.as_deref().and_then(parse_date).unwrap_or(now),
            author: self.author,
        }
    }
}

fn first_wins(slot: &mut Option<String>, text: &str) {
    if slot.is_some() {
        return;
    }
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        *slot = Some(trimmed.to_string());
    }
}

/// An item with defaults applied, waiting for the feed title.
#[derive(Debug)]
struct RawArticle {
    title: String,
    content: String,
    url: String,
    publish_date: DateTime<Utc>,
    author: Option<String>,
}

#[derive(Debug, Default)]
struct FeedMeta {
    saw_title: bool,
    title: String,
    description: String,
}

struct FeedParser {
    now: DateTime<Utc>,
    state: ParserState,
    /// State to return to when the current item closes.
    outer: ParserState,
    stack: Vec<Vec<u8>>,
    scratch: Scratch,
    meta: FeedMeta,
    items: Vec<RawArticle>,
}

impl FeedParser {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            state: ParserState::Outside,
            outer: ParserState::Outside,
            stack: Vec::new(),
            scratch: Scratch::default(),
            meta: FeedMeta::default(),
            items: Vec::new(),
        }
    }

    fn start(&mut self, name: &[u8], link: Option<LinkAttr>) -> Result<(), ParseError> {
        if self.stack.len() >= MAX_DEPTH {
            return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
        }

        let parent = self.stack.last().map(Vec::as_slice);
        match self.state {
            ParserState::InItem => {
                if name == b"link" && parent.is_some_and(is_item_element) {
                    if let Some(link) = link {
                        self.scratch.offer_link(link);
                    }
                }
            }
            state if is_item_element(name) => {
                self.outer = state;
                self.state = ParserState::InItem;
                self.scratch = Scratch::default();
            }
            _ if is_feed_element(name) => self.state = ParserState::InFeedMeta,
            ParserState::InFeedMeta => {
                if name == b"title" && parent.is_some_and(is_feed_element) {
                    self.meta.saw_title = true;
                }
            }
            ParserState::Outside => {}
        }

        self.stack.push(name.to_vec());
        Ok(())
    }

    fn end(&mut self, name: &[u8]) {
        self.stack.pop();

        if self.state == ParserState::InItem && is_item_element(name) {
            let scratch = std::mem::take(&mut self.scratch);
            self.items.push(scratch.materialize(self.now));
            self.state = self.outer;
        } else if self.state == ParserState::InFeedMeta && is_feed_element(name) {
            self.state = ParserState::Outside;
        }
    }

    fn text(&mut self, text: &str) {
        match self.state {
            ParserState::InItem => {
                if let Some(field) = self.item_field() {
                    self.scratch.push(field, text);
                }
            }
            ParserState::InFeedMeta => match self.meta_field() {
                Some(MetaField::Title) => self.meta.title.push_str(text),
                Some(MetaField::Description) => self.meta.description.push_str(text),
                None => {}
            },
            ParserState::Outside => {}
        }
    }

    /// Field receiving text at the current position inside an item.
    ///
    /// Direct children of the item map by name. Deeper text only counts inside
    /// content/description (inline XHTML) or as an Atom `<author><name>`.
    fn item_field(&self) -> Option<ItemField> {
        let item_idx = self.stack.iter().rposition(|n| is_item_element(n))?;
        let child = self.stack.get(item_idx + 1)?;
        let field = classify_item_child(child)?;
        let depth_below_child = self.stack.len() - item_idx - 2;

        match (field, depth_below_child) {
            (field, 0) => Some(field),
            (ItemField::Content | ItemField::Description, _) => Some(field),
            (ItemField::Author, 1) if self.stack.last().is_some_and(|n| n == b"name") => {
                Some(ItemField::Author)
            }
            _ => None,
        }
    }

    fn meta_field(&self) -> Option<MetaField> {
        let n = self.stack.len();
        if n < 2 || !is_feed_element(&self.stack[n - 2]) {
            return None;
        }
        match self.stack[n - 1].as_slice() {
            b"title" => Some(MetaField::Title),
            b"description" | b"subtitle" => Some(MetaField::Description),
            _ => None,
        }
    }

    fn finish(self) -> Result<ParsedFeed, ParseError> {
        if !self.stack.is_empty() {
            return Err(ParseError::Syntax(
                "unexpected end of document: unclosed elements".to_string(),
            ));
        }
        if !self.meta.saw_title {
            return Err(ParseError::InvalidFeed);
        }

        let title = match collapse_whitespace(&self.meta.title) {
            t if t.is_empty() => UNKNOWN_SOURCE.to_string(),
            t => t,
        };
        let description = self.meta.description.trim().to_string();

        let articles = self
            .items
            .into_iter()
            .map(|raw| {
                Article::new(
                    raw.title,
                    raw.content,
                    raw.url,
                    raw.publish_date,
                    title.clone(),
                    raw.author,
                )
            })
            .collect();

        Ok(ParsedFeed {
            title,
            description,
            articles,
        })
    }
}

fn is_item_element(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

fn is_feed_element(name: &[u8]) -> bool {
    name == b"channel" || name == b"feed"
}

fn classify_item_child(name: &[u8]) -> Option<ItemField> {
    match name {
        b"title" => Some(ItemField::Title),
        b"description" | b"summary" | b"subtitle" => Some(ItemField::Description),
        b"link" => Some(ItemField::Link),
        b"pubDate" | b"published" | b"updated" | b"lastBuildDate" | b"dc:date" => {
            Some(ItemField::Date)
        }
        b"content:encoded" | b"content" => Some(ItemField::Content),
        b"author" | b"dc:creator" => Some(ItemField::Author),
        _ => None,
    }
}

/// Extracts `href`/`rel` from a `<link>` element, if it carries an `href`.
fn link_attributes(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<LinkAttr>, ParseError> {
    if e.name().as_ref() != b"link" {
        return Ok(None);
    }

    let mut href = None;
    let mut rel = None;
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping malformed link attribute");
                continue;
            }
        };
        let value = || {
            attr.decode_and_unescape_value(reader.decoder())
                .map(|v| v.trim().to_string())
                .map_err(|err| ParseError::Syntax(err.to_string()))
        };
        match attr.key.as_ref() {
            b"href" => href = Some(value()?),
            b"rel" => rel = Some(value()?),
            _ => {}
        }
    }

    Ok(href
        .filter(|h| !h.is_empty())
        .map(|href| LinkAttr { href, rel }))
}
