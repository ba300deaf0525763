// src/services/parser.rs

//! RSS 2.0, RSS 1.0 (RDF) and Atom parsing.
//!
//! The document root selects the dialect. Item fields are matched on local
//! names, so namespace prefixes (`content:encoded`, `dc:creator`) do not need
//! to be declared consistently by the publisher.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};

use crate::error::FetchError;
use crate::models::{FeedItem, ParsedFeed};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Rss,
    Rdf,
    Atom,
}

impl Dialect {
    fn from_root(name: &[u8]) -> Option<Self> {
        match name {
            b"rss" => Some(Self::Rss),
            b"RDF" => Some(Self::Rdf),
            b"feed" => Some(Self::Atom),
            _ => None,
        }
    }

    fn item_tag(self) -> &'static [u8] {
        match self {
            Self::Rss | Self::Rdf => b"item",
            Self::Atom => b"entry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FeedTitle,
    Guid,
    Link,
    Title,
    Author,
    Content,
    Description,
    Published,
    Updated,
}

/// Parse a feed document.
///
/// A blank body yields `Ok(None)`. Markup errors, a missing root, or a root
/// that is not a known feed dialect are parse errors.
pub fn parse_feed(body: &str) -> Result<Option<ParsedFeed>, FetchError> {
    if body.trim().is_empty() {
        return Ok(None);
    }

    let mut reader = Reader::from_str(body);
    let mut builder: Option<FeedBuilder> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            FetchError::Parse(format!(
                "malformed XML at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                match builder.as_mut() {
                    Some(b) => b.open(name, &e),
                    None => builder = Some(FeedBuilder::with_root(name)?),
                }
            }
            Event::Empty(e) => {
                let name = e.local_name();
                match builder.as_mut() {
                    Some(b) => b.empty(name.as_ref(), &e),
                    None => {
                        // A self-closing root is a feed without items.
                        FeedBuilder::with_root(name.as_ref().to_vec())?;
                        return Ok(Some(ParsedFeed::default()));
                    }
                }
            }
            Event::Text(t) => {
                if let Some(b) = builder.as_mut() {
                    if b.capturing() {
                        let text = t
                            .unescape_with(resolve_html_entity)
                            .map_err(|e| FetchError::Parse(format!("bad text: {e}")))?;
                        b.append(&text);
                    }
                }
            }
            Event::CData(c) => {
                if let Some(b) = builder.as_mut() {
                    if b.capturing() {
                        b.append(&String::from_utf8_lossy(&c));
                    }
                }
            }
            Event::End(_) => {
                if let Some(b) = builder.as_mut() {
                    b.close();
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let builder = builder.ok_or_else(|| FetchError::Parse("document has no root element".into()))?;
    if !builder.stack.is_empty() {
        return Err(FetchError::Parse("unexpected end of document".into()));
    }
    Ok(Some(builder.finish()))
}

struct Capture {
    depth: usize,
    field: Field,
    text: String,
}

struct FeedBuilder {
    dialect: Dialect,
    stack: Vec<Vec<u8>>,
    title: Option<String>,
    items: Vec<FeedItem>,
    item: Option<FeedItem>,
    item_depth: usize,
    updated: Option<DateTime<Utc>>,
    capture: Option<Capture>,
}

impl FeedBuilder {
    fn with_root(name: Vec<u8>) -> Result<Self, FetchError> {
        let dialect = Dialect::from_root(&name).ok_or_else(|| {
            FetchError::Parse(format!(
                "unsupported feed root element <{}>",
                String::from_utf8_lossy(&name)
            ))
        })?;
        Ok(Self {
            dialect,
            stack: vec![name],
            title: None,
            items: Vec::new(),
            item: None,
            item_depth: 0,
            updated: None,
            capture: None,
        })
    }

    fn capturing(&self) -> bool {
        self.capture.is_some()
    }

    fn append(&mut self, text: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(text);
        }
    }

    fn open(&mut self, name: Vec<u8>, e: &BytesStart<'_>) {
        if self.item.is_none() && name == self.dialect.item_tag() {
            let mut item = FeedItem::default();
            if self.dialect == Dialect::Rdf {
                item.guid = attribute(e, b"about");
            }
            self.item = Some(item);
            self.stack.push(name);
            self.item_depth = self.stack.len();
            return;
        }

        self.handle_link(&name, e);
        self.stack.push(name);
        if self.capture.is_none() {
            if let Some(field) = self.field_at_top() {
                self.capture = Some(Capture {
                    depth: self.stack.len(),
                    field,
                    text: String::new(),
                });
            }
        }
    }

    fn empty(&mut self, name: &[u8], e: &BytesStart<'_>) {
        self.handle_link(name, e);
    }

    fn close(&mut self) {
        let depth = self.stack.len();
        if let Some(capture) = self.capture.take_if(|c| c.depth == depth) {
            self.assign(capture.field, capture.text);
        }
        if self.item.is_some() && depth == self.item_depth {
            if let Some(mut item) = self.item.take() {
                if item.published.is_none() {
                    item.published = self.updated.take();
                }
                self.updated = None;
                self.items.push(item);
            }
        }
        self.stack.pop();
    }

    /// Atom links carry the target in `href`; the first `alternate` (or
    /// rel-less) link of an entry wins.
    fn handle_link(&mut self, name: &[u8], e: &BytesStart<'_>) {
        if self.dialect != Dialect::Atom || name != b"link" {
            return;
        }
        let depth = self.stack.len();
        let Some(item) = self.item.as_mut() else {
            return;
        };
        if depth != self.item_depth || item.link.is_some() {
            return;
        }
        let rel = attribute(e, b"rel");
        if matches!(rel.as_deref(), None | Some("alternate")) {
            item.link = attribute(e, b"href");
        }
    }

    /// Field captured by the element on top of the stack, if any.
    fn field_at_top(&self) -> Option<Field> {
        let depth = self.stack.len();
        let name = self.stack.last()?.as_slice();
        let parent = self.stack.get(depth.wrapping_sub(2)).map(Vec::as_slice);

        if self.item.is_none() {
            let is_feed_title = name == b"title"
                && match self.dialect {
                    Dialect::Rss | Dialect::Rdf => parent == Some(b"channel".as_slice()),
                    Dialect::Atom => depth == 2,
                };
            return is_feed_title.then_some(Field::FeedTitle);
        }

        if self.dialect == Dialect::Atom
            && depth == self.item_depth + 2
            && parent == Some(b"author".as_slice())
            && name == b"name"
        {
            return Some(Field::Author);
        }
        if depth != self.item_depth + 1 {
            return None;
        }

        match (self.dialect, name) {
            (Dialect::Rss | Dialect::Rdf, b"guid") => Some(Field::Guid),
            (Dialect::Rss | Dialect::Rdf, b"link") => Some(Field::Link),
            (Dialect::Rss | Dialect::Rdf, b"author" | b"creator") => Some(Field::Author),
            (Dialect::Rss | Dialect::Rdf, b"description") => Some(Field::Description),
            (Dialect::Rss | Dialect::Rdf, b"pubDate" | b"date") => Some(Field::Published),
            (Dialect::Atom, b"id") => Some(Field::Guid),
            (Dialect::Atom, b"summary") => Some(Field::Description),
            (Dialect::Atom, b"published") => Some(Field::Published),
            (Dialect::Atom, b"updated") => Some(Field::Updated),
            (_, b"title") => Some(Field::Title),
            (_, b"encoded" | b"content") => Some(Field::Content),
            _ => None,
        }
    }

    fn assign(&mut self, field: Field, text: String) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if field == Field::FeedTitle {
            self.title.get_or_insert_with(|| text.to_string());
            return;
        }
        if field == Field::Updated {
            self.updated = self.updated.or_else(|| parse_date(text));
            return;
        }

        let Some(item) = self.item.as_mut() else {
            return;
        };
        let slot = match field {
            Field::Guid => &mut item.guid,
            Field::Link => &mut item.link,
            Field::Title => &mut item.title,
            Field::Author => &mut item.author,
            Field::Content => &mut item.content,
            Field::Description => &mut item.description,
            Field::Published => {
                item.published = item.published.or_else(|| parse_date(text));
                return;
            }
            Field::FeedTitle | Field::Updated => return,
        };
        slot.get_or_insert_with(|| text.to_string());
    }

    fn finish(self) -> ParsedFeed {
        ParsedFeed {
            title: self.title,
            items: self.items,
        }
    }
}

fn attribute(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

/// RFC 2822 (RSS) or RFC 3339 (Atom, Dublin Core) timestamp.
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The five XML entities, then HTML named entities that publishers leave in
/// XML text.
fn resolve_html_entity(name: &str) -> Option<&'static str> {
    if let Some(predefined) = resolve_predefined_entity(name) {
        return Some(predefined);
    }
    Some(match name {
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "euro" => "\u{20ac}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example News</title>
    <link>https://example.com/</link>
    <image><title>Logo</title></image>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/posts/1?utm_source=rss</link>
      <guid isPermaLink="false">post-1</guid>
      <dc:creator>Ada</dc:creator>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <description>Short&nbsp;summary</description>
      <content:encoded><![CDATA[<p>Full <b>body</b></p>]]></content:encoded>
    </item>
    <item>
      <title>Second</title>
      <link>https://example.com/posts/2</link>
      <description><![CDATA[<p>Only a summary</p>]]></description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items() {
        let feed = parse_feed(RSS).unwrap().unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example News"));
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title.as_deref(), Some("First & foremost"));
        assert_eq!(first.guid.as_deref(), Some("post-1"));
        assert_eq!(first.author.as_deref(), Some("Ada"));
        assert_eq!(first.content.as_deref(), Some("<p>Full <b>body</b></p>"));
        assert_eq!(first.description.as_deref(), Some("Short\u{a0}summary"));
        assert_eq!(
            first.published.map(|d| d.to_rfc3339()),
            Some("2024-01-02T10:00:00+00:00".to_string())
        );

        let second = &feed.items[1];
        assert_eq!(second.guid, None);
        assert_eq!(second.content, None);
        assert_eq!(second.description.as_deref(), Some("<p>Only a summary</p>"));
    }

    #[test]
    fn parses_atom_entries() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://example.org/"/>
  <entry>
    <title type="html">Entry &lt;one&gt;</title>
    <link rel="self" href="https://example.org/api/1"/>
    <link rel="alternate" href="https://example.org/1"/>
    <link href="https://example.org/ignored"/>
    <id>urn:uuid:1</id>
    <updated>2024-03-01T12:00:00Z</updated>
    <author><name>Grace</name><email>grace@example.org</email></author>
    <summary>Summary text</summary>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
  </entry>
</feed>"#;
        let feed = parse_feed(body).unwrap().unwrap();
        assert_eq!(feed.title.as_deref(), Some("Atom Example"));
        let entry = &feed.items[0];
        assert_eq!(entry.title.as_deref(), Some("Entry <one>"));
        assert_eq!(entry.link.as_deref(), Some("https://example.org/1"));
        assert_eq!(entry.guid.as_deref(), Some("urn:uuid:1"));
        assert_eq!(entry.author.as_deref(), Some("Grace"));
        assert_eq!(entry.description.as_deref(), Some("Summary text"));
        assert_eq!(entry.content.as_deref(), Some("<p>Body</p>"));
        // No <published>: falls back to <updated>
        assert_eq!(
            entry.published.map(|d| d.to_rfc3339()),
            Some("2024-03-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn parses_rdf_items() {
        let body = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://example.net/">
    <title>RDF Example</title>
    <items><rdf:Seq><rdf:li rdf:resource="https://example.net/a"/></rdf:Seq></items>
  </channel>
  <item rdf:about="https://example.net/a">
    <title>A</title>
    <link>https://example.net/a</link>
    <dc:date>2024-05-06T07:08:09+02:00</dc:date>
  </item>
</rdf:RDF>"#;
        let feed = parse_feed(body).unwrap().unwrap();
        assert_eq!(feed.title.as_deref(), Some("RDF Example"));
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].guid.as_deref(), Some("https://example.net/a"));
        assert_eq!(
            feed.items[0].published.map(|d| d.to_rfc3339()),
            Some("2024-05-06T05:08:09+00:00".to_string())
        );
    }

    #[test]
    fn predefined_entities_are_unescaped() {
        let feed = parse_feed(
            "<rss><channel><title>A &amp; B</title><item>\
             <link>https://example.com/?a=1&amp;b=2</link>\
             <description>&lt;p&gt;&quot;Hi&quot; &apos;there&apos;&lt;/p&gt;</description>\
             </item></channel></rss>",
        )
        .unwrap()
        .unwrap();
        assert_eq!(feed.title.as_deref(), Some("A & B"));
        let item = &feed.items[0];
        assert_eq!(item.link.as_deref(), Some("https://example.com/?a=1&b=2"));
        assert_eq!(
            item.description.as_deref(),
            Some("<p>\"Hi\" 'there'</p>")
        );
    }

    #[test]
    fn blank_body_is_no_content() {
        assert_eq!(parse_feed("").unwrap(), None);
        assert_eq!(parse_feed("  \n ").unwrap(), None);
    }

    #[test]
    fn empty_channel_has_no_items() {
        let feed = parse_feed("<rss><channel><title>T</title></channel></rss>")
            .unwrap()
            .unwrap();
        assert!(feed.items.is_empty());
        assert_eq!(feed.title.as_deref(), Some("T"));
    }

    #[test]
    fn rejects_unknown_root_and_garbage() {
        assert!(matches!(
            parse_feed("<html><body>nope</body></html>"),
            Err(FetchError::Parse(_))
        ));
        assert!(parse_feed("just some text").is_err());
        assert!(parse_feed("<rss><channel><item></channel></rss>").is_err());
        assert!(parse_feed("<rss><channel>").is_err());
    }

    #[test]
    fn unparsable_dates_are_dropped() {
        let feed = parse_feed(
            "<rss><channel><item><title>x</title><pubDate>someday</pubDate></item></channel></rss>",
        )
        .unwrap()
        .unwrap();
        assert_eq!(feed.items[0].published, None);
    }
}
