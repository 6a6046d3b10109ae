//! Structural RSS decoding.
//!
//! Turns raw feed XML into a [`Channel`] of untrimmed, unvalidated strings.
//! Elements are matched by local name, but only when they belong to the feed's
//! own vocabulary: no namespace at all, or one of the configured default
//! namespaces. Extension elements such as `<atom:link>` or `<dc:date>` are
//! skipped together with everything nested in them.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

/// Default namespace used by RSS 1.0 (RDF Site Summary) documents.
pub const RSS_10_NAMESPACE: &str = "http://purl.org/rss/1.0/";

/// Default namespace some RSS 2.0 publishers declare on the root element.
pub const USERLAND_RSS2_NAMESPACE: &str = "http://backend.userland.com/rss2";

/// Errors that abort decoding before anything is persisted.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The input held nothing but whitespace.
    #[error("feed document is empty")]
    Empty,

    /// The XML reader rejected the document.
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The document ended while elements were still open.
    #[error("feed document ended inside <{element}>")]
    UnexpectedEof { element: String },

    /// The input contained text but no element.
    #[error("feed document has no root element")]
    NoRootElement,

    /// A repaired tag pair had no closing tag.
    #[error("unterminated {tag} element")]
    UnmatchedTag { tag: String },

    /// Text repair needs the raw document as UTF-8.
    #[error("feed document is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),

    /// The feed file could not be read.
    #[error("failed to read feed file: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw channel-level fields, exactly as they appeared in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub title: String,
    pub description: String,
    pub link: String,
    pub image: String,
    pub items: Vec<RawItem>,
}

/// Raw item fields; `pub_date` is still the unparsed `<pubDate>` text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub pub_date: String,
}

/// Knobs for [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Namespace URIs treated as if elements carried no namespace.
    pub default_namespaces: Vec<String>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            default_namespaces: vec![
                RSS_10_NAMESPACE.to_string(),
                USERLAND_RSS2_NAMESPACE.to_string(),
            ],
        }
    }
}

impl DecoderOptions {
    fn is_own_namespace(&self, resolved: &ResolveResult<'_>) -> bool {
        match resolved {
            ResolveResult::Unbound => true,
            ResolveResult::Bound(ns) => self
                .default_namespaces
                .iter()
                .any(|alias| alias.as_bytes() == ns.0),
            ResolveResult::Unknown(_) => false,
        }
    }
}

/// Local names the decoder cares about. Anything else is tracked as `None`.
const KNOWN_ELEMENTS: &[&str] = &[
    "channel",
    "item",
    "image",
    "title",
    "description",
    "link",
    "url",
    "pubDate",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Title,
    Description,
    Link,
    Image,
    ItemTitle,
    ItemLink,
    ItemPubDate,
}

type ElementPath = [Option<&'static str>];

/// Which field the text at `path` belongs to. `path[0]` is the root element,
/// whatever its name (`rss`, `rdf:RDF`, ...).
fn target(path: &ElementPath) -> Option<Target> {
    match path {
        [_, Some("channel"), Some("title")] => Some(Target::Title),
        [_, Some("channel"), Some("description")] => Some(Target::Description),
        [_, Some("channel"), Some("link")] => Some(Target::Link),
        [_, Some("channel"), Some("image"), Some("url")] | [_, Some("image"), Some("url")] => {
            Some(Target::Image)
        }
        [_, Some("channel"), Some("item"), Some(field)] | [_, Some("item"), Some(field)] => {
            match *field {
                "title" => Some(Target::ItemTitle),
                "link" => Some(Target::ItemLink),
                "pubDate" => Some(Target::ItemPubDate),
                _ => None,
            }
        }
        _ => None,
    }
}

/// RSS 2.0 nests items in the channel; RSS 1.0 places them beside it.
fn is_item(path: &ElementPath) -> bool {
    matches!(path, [_, Some("channel"), Some("item")] | [_, Some("item")])
}

fn known(local: &[u8]) -> Option<&'static str> {
    KNOWN_ELEMENTS
        .iter()
        .copied()
        .find(|name| name.as_bytes() == local)
}

impl Channel {
    fn field(&mut self, target: Target) -> Option<&mut String> {
        match target {
            Target::Title => Some(&mut self.title),
            Target::Description => Some(&mut self.description),
            Target::Link => Some(&mut self.link),
            Target::Image => Some(&mut self.image),
            Target::ItemTitle => self.items.last_mut().map(|item| &mut item.title),
            Target::ItemLink => self.items.last_mut().map(|item| &mut item.link),
            Target::ItemPubDate => self.items.last_mut().map(|item| &mut item.pub_date),
        }
    }

    /// Called when an element at `path` opens. A repeated field element
    /// replaces the earlier value.
    fn open(&mut self, path: &ElementPath) {
        if is_item(path) {
            self.items.push(RawItem::default());
        } else if let Some(field) = target(path).and_then(|t| self.field(t)) {
            field.clear();
        }
    }

    fn append(&mut self, path: &ElementPath, text: &str) {
        if let Some(field) = target(path).and_then(|t| self.field(t)) {
            field.push_str(text);
        }
    }
}

/// Decode a feed document from any buffered reader.
///
/// A document without a `<channel>` decodes to an empty [`Channel`]; it is
/// up to the normalizer to reject the missing fields.
pub fn decode<R: BufRead>(input: R, options: &DecoderOptions) -> Result<Channel, DecodeError> {
    // Text is kept as written; whitespace around CDATA or inline markup is
    // part of the value. Trimming happens when the record is built.
    let mut reader = NsReader::from_reader(input);

    let mut channel = Channel::default();
    let mut path: Vec<Option<&'static str>> = Vec::new();
    let mut open_names: Vec<String> = Vec::new();
    let mut seen_content = false;
    let mut seen_root = false;
    let mut buf = Vec::new();

    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
        match event {
            Event::Start(e) => {
                seen_content = true;
                seen_root = true;
                let name = options
                    .is_own_namespace(&resolved)
                    .then(|| known(e.local_name().as_ref()))
                    .flatten();
                path.push(name);
                open_names.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                channel.open(&path);
            }
            Event::Empty(e) => {
                seen_content = true;
                seen_root = true;
                let name = options
                    .is_own_namespace(&resolved)
                    .then(|| known(e.local_name().as_ref()))
                    .flatten();
                path.push(name);
                channel.open(&path);
                path.pop();
            }
            Event::End(_) => {
                path.pop();
                open_names.pop();
            }
            Event::Text(e) => {
                let text = e.unescape()?;
                seen_content |= !text.trim().is_empty();
                channel.append(&path, &text);
            }
            Event::CData(e) => {
                seen_content = true;
                channel.append(&path, &String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            _ => seen_content = true,
        }
        buf.clear();
    }

    if let Some(element) = open_names.pop() {
        return Err(DecodeError::UnexpectedEof { element });
    }
    if !seen_content {
        return Err(DecodeError::Empty);
    }
    if !seen_root {
        return Err(DecodeError::NoRootElement);
    }

    tracing::debug!(items = channel.items.len(), "Decoded feed document");
    Ok(channel)
}

/// Decode a feed document held in memory.
pub fn decode_bytes(input: &[u8], options: &DecoderOptions) -> Result<Channel, DecodeError> {
    decode(input, options)
}

/// Read and decode a feed document from disk.
pub async fn load_file(
    path: impl AsRef<Path>,
    options: &DecoderOptions,
) -> Result<Channel, DecodeError> {
    let bytes = tokio::fs::read(path.as_ref()).await?;
    decode_bytes(&bytes, options)
}
