//! RSS 2.0, RSS 1.0 and Atom feed parsing
//!
//! Feeds are read with a single pass over the `quick_xml` event stream. Only
//! the fields the feed widgets show are kept: the feed title and, per entry,
//! title, link, publication date, categories and media attributes
//! (`media:thumbnail`, `media:content`, `media:statistics`).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

/// A parsed feed
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>` or `<entry>`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Raw publication date text (RFC 2822 or RFC 3339)
    pub published: Option<String>,
    /// Category terms in document order
    pub categories: Vec<String>,
    pub thumbnail: Option<String>,
    pub media_content: Option<String>,
    pub views: Option<String>,
}

fn is_entry(name: &str) -> bool {
    name == "item" || name == "entry"
}

fn is_feed_root(name: &str) -> bool {
    name == "channel" || name == "feed"
}

/// Parse feed XML.
pub fn parse(xml: &str) -> quick_xml::Result<Feed> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true).expand_empty_elements(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut feed = Feed::default();
    let mut entry: Option<FeedEntry> = None;

    loop {
        match reader.read_event(&mut buf)? {
            Event::Start(start) => {
                let name = reader.decode(start.local_name()).into_owned();
                if is_entry(&name) {
                    entry = Some(FeedEntry::default());
                } else if let Some(current) = entry.as_mut() {
                    read_entry_attributes(&reader, &start, &name, current)?;
                }
                path.push(name);
            }
            Event::Text(text) => {
                let text = reader.decode(&text.unescaped()?).into_owned();
                assign_text(&mut feed, entry.as_mut(), &path, text);
            }
            Event::CData(text) => {
                let text = reader.decode(&text).into_owned();
                assign_text(&mut feed, entry.as_mut(), &path, text);
            }
            Event::End(_) => {
                if let Some(name) = path.pop()
                    && is_entry(&name)
                    && let Some(done) = entry.take()
                {
                    feed.entries.push(done);
                }
            }
            Event::Eof if path.is_empty() => break,
            Event::Eof => return Err(quick_xml::Error::UnexpectedEof(path.join("/"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(feed)
}

fn attribute<B: BufRead>(reader: &Reader<B>, start: &BytesStart, key: &[u8]) -> quick_xml::Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key == key {
            return Ok(Some(reader.decode(&attr.unescaped_value()?).into_owned()));
        }
    }
    Ok(None)
}

fn read_entry_attributes<B: BufRead>(
    reader: &Reader<B>,
    start: &BytesStart,
    name: &str,
    entry: &mut FeedEntry,
) -> quick_xml::Result<()> {
    match name {
        // Atom links carry the target in `href`; only the alternate link counts
        "link" => {
            let rel = attribute(reader, start, b"rel")?;
            if entry.link.is_none() && rel.as_deref().is_none_or(|r| r == "alternate") {
                entry.link = attribute(reader, start, b"href")?;
            }
        }
        "category" => {
            if let Some(term) = attribute(reader, start, b"term")? {
                entry.categories.push(term);
            }
        }
        "thumbnail" if entry.thumbnail.is_none() => entry.thumbnail = attribute(reader, start, b"url")?,
        "content" if entry.media_content.is_none() => entry.media_content = attribute(reader, start, b"url")?,
        "statistics" => entry.views = attribute(reader, start, b"views")?,
        _ => {}
    }
    Ok(())
}

fn assign_text(feed: &mut Feed, entry: Option<&mut FeedEntry>, path: &[String], text: String) {
    let Some((current, ancestors)) = path.split_last() else {
        return;
    };
    let parent = ancestors.last().map(String::as_str).unwrap_or_default();

    match entry {
        Some(entry) => match current.as_str() {
            "title" if is_entry(parent) => append(&mut entry.title, text),
            "link" if is_entry(parent) && entry.link.is_none() => entry.link = Some(text),
            "pubDate" | "published" if entry.published.is_none() => entry.published = Some(text),
            "category" => entry.categories.push(text),
            _ => {}
        },
        None if current == "title" && is_feed_root(parent) => append(&mut feed.title, text),
        None => {}
    }
}

/// Text split by entities or CDATA sections arrives in several events
fn append(slot: &mut Option<String>, text: String) {
    match slot {
        Some(existing) => existing.push_str(&text),
        None => *slot = Some(text),
    }
}
