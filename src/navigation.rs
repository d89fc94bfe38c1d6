//! Chapter titles from EPUB navigation documents.
//!
//! Supports both EPUB 3 XHTML navigation documents (`epub:type="toc"`) and
//! the EPUB 2 NCX. The nav document wins when it yields any entry; the NCX
//! is only consulted otherwise.
//!
//! Both parsers are best-effort: they stop at the first XML error and keep
//! every entry completed before it. A broken navigation source never fails
//! an open, chapters simply fall back to file-derived titles.

use std::collections::HashMap;
use std::io::{Read, Seek};

use quick_xml::events::Event;

use crate::archive::ArchiveReader;
use crate::href::{percent_decode, resolve_href, split_fragment};
use crate::xml::{
    attribute, attribute_local, decode_markup_lossy, entity, lenient_reader, local_name,
    simplify_whitespace, text,
};

/// One table-of-contents entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavEntry {
    /// Archive path of the target, with its `#fragment` when present
    pub href: String,
    /// Whitespace-simplified label
    pub label: String,
}

/// Which navigation source produced a [`NavTitleMap`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NavSource {
    /// No source, or no source yielded entries
    #[default]
    None,
    /// EPUB 3 navigation document
    NavDocument,
    /// EPUB 2 NCX
    Ncx,
}

/// Mapping from content href (optionally fragment-qualified) to label.
///
/// Keeps entries in document order. Each entry is reachable by its full
/// `path#fragment` key and by its bare path; when several entries share a
/// key the first one wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavTitleMap {
    entries: Vec<NavEntry>,
    index: HashMap<String, usize>,
    source: NavSource,
}

impl NavTitleMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Empty labels are ignored.
    pub fn insert(&mut self, href: impl Into<String>, label: impl Into<String>) {
        let href = href.into();
        let label = label.into();
        if href.is_empty() || label.is_empty() {
            return;
        }
        let position = self.entries.len();
        let key = percent_decode(&href).into_owned();
        let (bare, _) = split_fragment(&key);
        self.index.entry(bare.to_string()).or_insert(position);
        self.index.entry(key).or_insert(position);
        self.entries.push(NavEntry { href, label });
    }

    /// Label for `href`: the exact key first, then the part before `#`.
    pub fn lookup(&self, href: &str) -> Option<&str> {
        let key = percent_decode(href);
        let (bare, _) = split_fragment(&key);
        self.index
            .get(key.as_ref())
            .or_else(|| self.index.get(bare))
            .map(|&i| self.entries[i].label.as_str())
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[NavEntry] {
        &self.entries
    }

    /// Source the entries came from.
    pub fn source(&self) -> NavSource {
        self.source
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry was collected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the title map for a package.
///
/// `nav_path` and `ncx_path` are archive paths already resolved against the
/// package directory. Missing or unreadable documents count as empty.
pub fn resolve_nav_titles<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    nav_path: Option<&str>,
    ncx_path: Option<&str>,
) -> NavTitleMap {
    if let Some(path) = nav_path {
        if let Some(bytes) = archive.read_href(path).filter(|b| !b.is_empty()) {
            let map = parse_nav_document(&bytes, path);
            log::debug!("[NAV] {} yielded {} entries", path, map.len());
            if !map.is_empty() {
                return map;
            }
        } else {
            log::warn!("[NAV] Navigation document {} is missing", path);
        }
    }

    if let Some(path) = ncx_path {
        if let Some(bytes) = archive.read_href(path).filter(|b| !b.is_empty()) {
            let map = parse_ncx(&bytes, path);
            log::debug!("[NAV] {} yielded {} entries", path, map.len());
            return map;
        }
        log::warn!("[NAV] NCX {} is missing", path);
    }

    NavTitleMap::new()
}

/// Parse an EPUB 3 navigation document located at `nav_path`.
///
/// Only anchors inside a `<nav>` whose type includes `toc` are collected.
/// Hrefs resolve relative to `nav_path`.
pub fn parse_nav_document(content: &[u8], nav_path: &str) -> NavTitleMap {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();
    let mut map = NavTitleMap::new();
    map.source = NavSource::NavDocument;

    let mut toc_depth = 0usize;
    let mut anchor: Option<(Option<String>, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()).as_str() {
                "nav" => {
                    let is_toc = attribute_local(&e, &reader, "type")
                        .is_some_and(|t| t.split_whitespace().any(|t| t == "toc"));
                    if toc_depth > 0 || is_toc {
                        toc_depth += 1;
                    }
                }
                "a" if toc_depth > 0 => {
                    anchor = Some((attribute(&e, &reader, "href"), String::new()));
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some((_, label)) = anchor.as_mut() {
                    if let Some(t) = text(&e) {
                        label.push_str(&t);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, label)) = anchor.as_mut() {
                    label.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, label)) = anchor.as_mut() {
                    label.push_str(&entity(&e));
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()).as_str() {
                "a" => {
                    if let Some((Some(href), label)) = anchor.take() {
                        if let Some(resolved) = resolve_href(nav_path, &href) {
                            map.insert(resolved, simplify_whitespace(&label));
                        }
                    }
                }
                "nav" => toc_depth = toc_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[NAV] {} parse stopped: {}", nav_path, e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    map
}

/// A `navPoint` still open on the stack.
struct OpenNavPoint {
    slot: usize,
    label: Option<String>,
    src: Option<String>,
}

/// Parse an EPUB 2 NCX located at `ncx_path`.
///
/// Each `navPoint` pairs its `content src` with the text of its
/// `navLabel/text`. Entries keep document order, parents before children.
pub fn parse_ncx(content: &[u8], ncx_path: &str) -> NavTitleMap {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();

    let mut slots: Vec<Option<(String, String)>> = Vec::new();
    let mut stack: Vec<OpenNavPoint> = Vec::new();
    let mut label_text: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()).as_str() {
                "navpoint" => {
                    stack.push(OpenNavPoint {
                        slot: slots.len(),
                        label: None,
                        src: None,
                    });
                    slots.push(None);
                }
                "text" if !stack.is_empty() => label_text = Some(String::new()),
                "content" => set_ncx_src(&mut stack, attribute(&e, &reader, "src")),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "content" {
                    set_ncx_src(&mut stack, attribute(&e, &reader, "src"));
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(label) = label_text.as_mut() {
                    if let Some(t) = text(&e) {
                        label.push_str(&t);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(label) = label_text.as_mut() {
                    label.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(label) = label_text.as_mut() {
                    label.push_str(&entity(&e));
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()).as_str() {
                "text" => {
                    if let (Some(label), Some(point)) = (label_text.take(), stack.last_mut()) {
                        if point.label.is_none() {
                            point.label = Some(simplify_whitespace(&label));
                        }
                    }
                }
                "navpoint" => {
                    if let Some(point) = stack.pop() {
                        close_nav_point(point, &mut slots, ncx_path);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[NAV] {} parse stopped: {}", ncx_path, e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    // Points left open by a truncated document still count when complete.
    while let Some(point) = stack.pop() {
        close_nav_point(point, &mut slots, ncx_path);
    }

    let mut map = NavTitleMap::new();
    map.source = NavSource::Ncx;
    for (href, label) in slots.into_iter().flatten() {
        map.insert(href, label);
    }
    map
}

fn set_ncx_src(stack: &mut [OpenNavPoint], src: Option<String>) {
    if let Some(point) = stack.last_mut() {
        if point.src.is_none() {
            point.src = src;
        }
    }
}

fn close_nav_point(point: OpenNavPoint, slots: &mut [Option<(String, String)>], ncx_path: &str) {
    if let (Some(label), Some(src)) = (point.label, point.src) {
        if let Some(resolved) = resolve_href(ncx_path, &src) {
            slots[point.slot] = Some((resolved, label));
        }
    }
}
