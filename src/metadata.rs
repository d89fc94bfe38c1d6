//! EPUB package resolution: container descriptor and OPF package document.
//!
//! Both parsers are tolerant. An XML error ends the parse but keeps
//! everything collected before it; callers decide whether what was found
//! is enough.

use std::collections::BTreeSet;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ShelfError;
use crate::xml::{
    attribute, decode_markup_lossy, entity, lenient_reader, local_name, text,
};

/// Path of the OCF container descriptor inside every EPUB.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media type of the legacy NCX navigation document.
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

const DTBOOK_MEDIA_TYPE: &str = "application/x-dtbook+xml";

/// A single item in the package manifest
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManifestItem {
    /// Identifier, unique within the package
    pub id: String,
    /// Path relative to the package document
    pub href: String,
    /// MIME type (empty when the item omits it)
    pub media_type: String,
    /// Space-separated `properties` split into a set
    pub properties: BTreeSet<String>,
}

impl ManifestItem {
    /// Whether the item declares `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.contains(property)
    }

    /// Whether the item is an XHTML/HTML content document.
    ///
    /// Decided by media type, then by file extension for items that omit
    /// or misstate it.
    pub fn is_content_document(&self) -> bool {
        let media_type = self.media_type.to_ascii_lowercase();
        if media_type.contains("html") || media_type == DTBOOK_MEDIA_TYPE {
            return true;
        }
        let href = self.href.split('#').next().unwrap_or_default();
        let extension = href.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
        matches!(extension.as_deref(), Some("xhtml" | "html" | "htm" | "xml"))
    }

    /// Whether the item is an image resource.
    pub fn is_image(&self) -> bool {
        self.media_type.to_ascii_lowercase().starts_with("image/")
    }
}

/// Metadata and manifest extracted from the package document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDocument {
    /// First `title` in `<metadata>`, trimmed (may be empty)
    pub title: String,
    /// Every `creator`, in document order
    pub authors: Vec<String>,
    /// First `language`
    pub language: Option<String>,
    /// First `publisher`
    pub publisher: Option<String>,
    /// First `description`
    pub description: Option<String>,
    /// Calibre series meta or EPUB 3 `belongs-to-collection`
    pub series: Option<String>,
    /// Manifest items in document order
    pub manifest: Vec<ManifestItem>,
    /// Manifest id of the item carrying the `nav` property
    pub nav_id: Option<String>,
    /// Manifest id of the first NCX item
    pub ncx_id: Option<String>,
    /// Manifest id named as cover image
    pub cover_id: Option<String>,
    /// Guide `reference type="cover"` href, relative to the package document
    pub guide_cover_href: Option<String>,
}

impl PackageDocument {
    /// Manifest item by id.
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// The modern navigation document item.
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.nav_id.as_deref().and_then(|id| self.item(id))
    }

    /// The legacy NCX item.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.ncx_id.as_deref().and_then(|id| self.item(id))
    }

    /// The cover image item, if the package names one.
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.cover_id.as_deref().and_then(|id| self.item(id))
    }
}

/// Parse `META-INF/container.xml` for the first rootfile `full-path`.
pub fn parse_container_xml(content: &[u8]) -> Result<String, ShelfError> {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == "rootfile" {
                    if let Some(path) = attribute(&e, &reader, "full-path") {
                        let path = path.trim();
                        if !path.is_empty() {
                            return Ok(path.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[EPUB] container.xml parse stopped: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Err(ShelfError::Open("invalid container descriptor".into()))
}

/// Which metadata field the current text run belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Title,
    Creator,
    Language,
    Publisher,
    Description,
    Series,
}

impl Field {
    fn from_element(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Field::Title),
            "creator" => Some(Field::Creator),
            "language" => Some(Field::Language),
            "publisher" => Some(Field::Publisher),
            "description" => Some(Field::Description),
            _ => None,
        }
    }
}

/// Parse the OPF package document.
///
/// Collects metadata, the manifest, and which items are the nav document,
/// the NCX and the cover. Manifest items missing `id` or `href` are skipped.
pub fn parse_opf(content: &[u8]) -> PackageDocument {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();
    let mut package = PackageDocument::default();

    let mut in_metadata = false;
    let mut in_manifest = false;
    let mut in_guide = false;
    let mut title_seen = false;
    let mut capture: Option<(Field, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "manifest" => in_manifest = true,
                    "guide" => in_guide = true,
                    _ => {}
                }
                handle_element(&e, &name, &reader, &mut package, in_manifest, in_guide);
                if in_metadata && capture.is_none() {
                    capture = capture_field(&e, &name, &reader, &mut package)
                        .map(|field| (field, String::new()));
                }
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                handle_element(&e, &name, &reader, &mut package, in_manifest, in_guide);
                if in_metadata {
                    capture_field(&e, &name, &reader, &mut package);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, value)) = capture.as_mut() {
                    if let Some(t) = text(&e) {
                        value.push_str(&t);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some((_, value)) = capture.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, value)) = capture.as_mut() {
                    value.push_str(&entity(&e));
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                match name.as_str() {
                    "metadata" => in_metadata = false,
                    "manifest" => in_manifest = false,
                    "guide" => in_guide = false,
                    _ => {}
                }
                if let Some((field, value)) = capture.take() {
                    if name == "meta" || Field::from_element(&name) == Some(field) {
                        store_field(&mut package, field, value.trim(), &mut title_seen);
                    } else {
                        capture = Some((field, value));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!(
                    "[EPUB] Package document parse stopped at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    log::debug!(
        "[EPUB] Package: {} manifest items, nav={:?}, ncx={:?}",
        package.manifest.len(),
        package.nav_id,
        package.ncx_id
    );
    package
}

/// Manifest items and guide references, from either Start or Empty events.
fn handle_element(
    e: &BytesStart,
    name: &str,
    reader: &Reader<&[u8]>,
    package: &mut PackageDocument,
    in_manifest: bool,
    in_guide: bool,
) {
    if in_manifest && name == "item" {
        if let Some(item) = parse_manifest_item(e, reader) {
            if item.has_property("nav") && package.nav_id.is_none() {
                package.nav_id = Some(item.id.clone());
            }
            if item.has_property("cover-image") {
                package.cover_id = Some(item.id.clone());
            }
            if item.media_type.eq_ignore_ascii_case(NCX_MEDIA_TYPE) && package.ncx_id.is_none() {
                package.ncx_id = Some(item.id.clone());
            }
            package.manifest.push(item);
        }
    } else if in_guide && name == "reference" && package.guide_cover_href.is_none() {
        let is_cover = attribute(e, reader, "type")
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("cover"));
        if is_cover {
            package.guide_cover_href = attribute(e, reader, "href");
        }
    } else if name == "spine" && package.ncx_id.is_none() {
        // EPUB 2 `<spine toc="ncx">` names the NCX when its media type is off.
        package.ncx_id = attribute(e, reader, "toc").filter(|id| !id.is_empty());
    }
}

/// Start capturing a metadata element's text, or apply a `<meta>` whose
/// value lives in attributes.
fn capture_field(
    e: &BytesStart,
    name: &str,
    reader: &Reader<&[u8]>,
    package: &mut PackageDocument,
) -> Option<Field> {
    if name != "meta" {
        return Field::from_element(name);
    }

    let meta_name = attribute(e, reader, "name");
    let content = attribute(e, reader, "content");
    match (meta_name.as_deref(), content) {
        (Some("cover"), Some(id)) if package.cover_id.is_none() => {
            package.cover_id = Some(id.trim().to_string());
        }
        (Some("calibre:series"), Some(series)) if package.series.is_none() => {
            package.series = Some(series.trim().to_string()).filter(|s| !s.is_empty());
        }
        _ => {}
    }

    match attribute(e, reader, "property").as_deref() {
        Some("belongs-to-collection") => Some(Field::Series),
        _ => None,
    }
}

fn store_field(package: &mut PackageDocument, field: Field, value: &str, title_seen: &mut bool) {
    let value = value.to_string();
    match field {
        Field::Title => {
            if !*title_seen {
                package.title = value;
                *title_seen = true;
            }
        }
        Field::Creator => {
            if !value.is_empty() {
                package.authors.push(value);
            }
        }
        Field::Language => set_once(&mut package.language, value),
        Field::Publisher => set_once(&mut package.publisher, value),
        Field::Description => set_once(&mut package.description, value),
        Field::Series => set_once(&mut package.series, value),
    }
}

fn set_once(slot: &mut Option<String>, value: String) {
    if slot.is_none() && !value.is_empty() {
        *slot = Some(value);
    }
}

/// Parse a manifest item, skipping it when `id` or `href` is missing.
fn parse_manifest_item(e: &BytesStart, reader: &Reader<&[u8]>) -> Option<ManifestItem> {
    let id = attribute(e, reader, "id").filter(|v| !v.is_empty())?;
    let href = attribute(e, reader, "href").filter(|v| !v.is_empty())?;
    let media_type = attribute(e, reader, "media-type").unwrap_or_default();
    let properties = attribute(e, reader, "properties")
        .map(|p| p.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    Some(ManifestItem {
        id,
        href,
        media_type: media_type.trim().to_string(),
        properties,
    })
}
