//! EPUB books as text documents.
//!
//! The open flow is: container descriptor, package document, manifest and
//! spine, navigation titles, then one normalized chapter per readable spine
//! item. Missing required documents fail the open; anything after that
//! degrades (a broken chapter is skipped, a broken nav document falls back
//! to file-derived titles).

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use quick_xml::events::Event;

use crate::archive::ArchiveReader;
use crate::comic::file_title;
use crate::document::{Chapter, Document, DocumentContent, DocumentMetadata, TextContent, TocEntry};
use crate::error::ShelfError;
use crate::href::{dir_of, file_stem, join_href, percent_decode, resolve_href, split_fragment};
use crate::metadata::{parse_container_xml, parse_opf, ManifestItem, PackageDocument, CONTAINER_PATH};
use crate::navigation::{resolve_nav_titles, NavTitleMap};
use crate::normalize::normalize_xhtml;
use crate::open::OpenOptions;
use crate::scratch::{prepare_scratch_dir, sanitize_entry_path, ScratchKind};
use crate::spine::{parse_spine, Spine, SpineItem};
use crate::xml::{
    attribute, attribute_local, decode_markup_lossy, lenient_reader, local_name,
    simplify_whitespace,
};

const COVER_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];

/// Open an EPUB file into a text document.
///
/// The cover image, when the package names one and
/// [`OpenOptions::extract_cover`] is set, is written into a scratch
/// directory derived from `path`.
pub fn open_epub(path: &Path, options: &OpenOptions) -> Result<Document, ShelfError> {
    let mut archive = ArchiveReader::open_with_limits(path, options.zip_limits)
        .map_err(|e| ShelfError::Open(format!("Failed to open EPUB: {}", e.diagnostic())))?;
    let cover_source = options.extract_cover.then_some(path);
    assemble(&mut archive, &file_title(path), cover_source, options)
}

/// Open an EPUB from any seekable source.
///
/// `fallback_title` is used when the package has no title. No cover is
/// extracted since there is no source path to derive a scratch directory
/// from.
pub fn open_epub_reader<R: Read + Seek>(
    reader: R,
    fallback_title: &str,
    options: &OpenOptions,
) -> Result<Document, ShelfError> {
    let mut archive = ArchiveReader::from_reader_with_limits(reader, options.zip_limits)
        .map_err(|e| ShelfError::Open(format!("Failed to open EPUB: {}", e.diagnostic())))?;
    assemble(&mut archive, fallback_title, None, options)
}

/// Package location plus its parsed contents.
struct Package {
    opf_path: String,
    document: PackageDocument,
    spine: Spine,
}

impl Package {
    fn base_dir(&self) -> &str {
        dir_of(&self.opf_path)
    }

    fn resolve(&self, item: &ManifestItem) -> String {
        join_href(self.base_dir(), &item.href)
    }
}

fn read_package<R: Read + Seek>(archive: &mut ArchiveReader<R>) -> Result<Package, ShelfError> {
    let container = archive
        .read_entry(CONTAINER_PATH)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ShelfError::Open("missing container descriptor".into()))?;
    let opf_path = parse_container_xml(&container)?;

    let opf = archive
        .read_href(&opf_path)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ShelfError::Open("missing package document".into()))?;

    Ok(Package {
        document: parse_opf(&opf),
        spine: parse_spine(&opf),
        opf_path,
    })
}

fn assemble<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    fallback_title: &str,
    cover_source: Option<&Path>,
    options: &OpenOptions,
) -> Result<Document, ShelfError> {
    let package = read_package(archive)?;

    let nav_path = package.document.nav_item().map(|item| package.resolve(item));
    let ncx_path = package.document.ncx_item().map(|item| package.resolve(item));
    let nav = resolve_nav_titles(archive, nav_path.as_deref(), ncx_path.as_deref());

    let chapters = read_chapters(archive, &package, &nav, options.skip_non_linear);
    if chapters.is_empty() {
        return Err(ShelfError::EmptyContent("No readable text in EPUB".into()));
    }
    log::debug!(
        "[EPUB] {} chapters from {} spine items",
        chapters.len(),
        package.spine.len()
    );

    let toc = build_toc(&nav, &chapters);
    let cover_path = cover_source.and_then(|source| {
        extract_cover(archive, &package, source, options.scratch_root.as_deref())
    });

    let title = match simplify_whitespace(&package.document.title) {
        t if t.is_empty() => fallback_title.to_string(),
        t => t,
    };
    let metadata = DocumentMetadata {
        authors: package
            .document
            .authors
            .iter()
            .map(|a| simplify_whitespace(a))
            .filter(|a| !a.is_empty())
            .collect(),
        language: package.document.language.clone(),
        publisher: package.document.publisher.clone(),
        description: package.document.description.clone(),
        series: package.document.series.clone(),
        cover_path,
    };

    Ok(Document::new(
        title,
        metadata,
        DocumentContent::Text(TextContent::new(chapters, toc)),
    ))
}

/// Spine items to read, in order.
///
/// With `skip_non_linear`, auxiliary items are left out unless that would
/// leave nothing to read.
fn reading_order(spine: &Spine, skip_non_linear: bool) -> Vec<&SpineItem> {
    if skip_non_linear {
        let linear: Vec<&SpineItem> = spine.linear_items().collect();
        if !linear.is_empty() {
            return linear;
        }
    }
    spine.items().iter().collect()
}

fn read_chapters<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    package: &Package,
    nav: &NavTitleMap,
    skip_non_linear: bool,
) -> Vec<Chapter> {
    let mut chapters = Vec::new();

    for spine_item in reading_order(&package.spine, skip_non_linear) {
        let Some(item) = package.document.item(&spine_item.idref) else {
            log::warn!("[EPUB] Spine idref '{}' is not in the manifest", spine_item.idref);
            continue;
        };
        if !item.is_content_document() {
            log::debug!("[EPUB] Skipping non-text spine item {} ({})", item.href, item.media_type);
            continue;
        }

        let href = package.resolve(item);
        let Some(bytes) = archive.read_href(&href) else {
            log::warn!("[EPUB] Content document {} is missing", href);
            continue;
        };
        let text = match normalize_xhtml(&bytes, &href) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[EPUB] Skipping {}: {}", href, e);
                continue;
            }
        };
        if text.is_empty() {
            continue;
        }

        let title = nav
            .lookup(&href)
            .map(str::to_string)
            .unwrap_or_else(|| percent_decode(file_stem(&href)).into_owned());
        chapters.push(Chapter { title, text, href });
    }

    chapters
}

/// Map navigation entries onto chapter indices by content path.
fn build_toc(nav: &NavTitleMap, chapters: &[Chapter]) -> Vec<TocEntry> {
    let mut by_path: HashMap<String, usize> = HashMap::new();
    for (index, chapter) in chapters.iter().enumerate() {
        by_path
            .entry(percent_decode(&chapter.href).into_owned())
            .or_insert(index);
    }

    nav.entries()
        .iter()
        .map(|entry| {
            let decoded = percent_decode(&entry.href);
            let (path, _) = split_fragment(&decoded);
            TocEntry {
                label: entry.label.clone(),
                href: entry.href.clone(),
                chapter_index: by_path.get(path).copied(),
            }
        })
        .collect()
}

/// Archive path of the cover image, following a cover page to its first
/// image when the package points at XHTML. Without a usable declared cover,
/// the first image shown by a spine page is taken.
fn locate_cover<R: Read + Seek>(archive: &mut ArchiveReader<R>, package: &Package) -> Option<String> {
    if let Some(candidate) = declared_cover(package) {
        if is_image_href(&candidate) {
            return Some(candidate);
        }
        let page_image = archive
            .read_href(&candidate)
            .and_then(|page| first_image_in(&page, &candidate));
        if page_image.is_some() {
            return page_image;
        }
    }
    first_spine_image(archive, package)
}

fn declared_cover(package: &Package) -> Option<String> {
    let document = &package.document;
    document
        .cover_item()
        .map(|item| package.resolve(item))
        .or_else(|| {
            document
                .guide_cover_href
                .as_deref()
                .map(|href| join_href(package.base_dir(), split_fragment(href).0))
        })
        .or_else(|| {
            document
                .manifest
                .iter()
                .find(|item| {
                    item.is_image()
                        && (item.id.to_ascii_lowercase().contains("cover")
                            || item.href.to_ascii_lowercase().contains("cover"))
                })
                .map(|item| package.resolve(item))
        })
}

/// First image referenced by a spine page that is present in the archive.
fn first_spine_image<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    package: &Package,
) -> Option<String> {
    package.spine.items().iter().find_map(|spine_item| {
        let item = package.document.item(&spine_item.idref)?;
        let page_path = package.resolve(item);
        let page = archive.read_href(&page_path)?;
        let image = first_image_in(&page, &page_path)?;
        archive.contains_href(&image).then_some(image)
    })
}

fn is_image_href(href: &str) -> bool {
    let (path, _) = split_fragment(href);
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        COVER_IMAGE_EXTENSIONS
            .iter()
            .any(|known| ext.eq_ignore_ascii_case(known))
    })
}

/// First `<img src>` (or SVG `<image href>`) in a content document,
/// resolved against `page_path`.
fn first_image_in(content: &[u8], page_path: &str) -> Option<String> {
    let content = decode_markup_lossy(content);
    let mut reader = lenient_reader(content.as_bytes());
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let src = match local_name(e.name().as_ref()).as_str() {
                    "img" => attribute(&e, &reader, "src"),
                    "image" => attribute_local(&e, &reader, "href"),
                    _ => None,
                };
                if let Some(resolved) = src.and_then(|s| resolve_href(page_path, &s)) {
                    return Some(split_fragment(&resolved).0.to_string());
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn extract_cover<R: Read + Seek>(
    archive: &mut ArchiveReader<R>,
    package: &Package,
    source: &Path,
    scratch_root: Option<&Path>,
) -> Option<PathBuf> {
    let href = locate_cover(archive, package)?;
    let decoded = percent_decode(&href).into_owned();
    let file_name = sanitize_entry_path(decoded.rsplit('/').next().unwrap_or(&decoded))?;
    let entry = if archive.contains(&href) { href } else { decoded };

    let dir = match prepare_scratch_dir(source, ScratchKind::Epub, scratch_root) {
        Ok(dir) => dir,
        Err(e) => {
            log::warn!("[EPUB] Cover not extracted: {}", e);
            return None;
        }
    };
    let dest = dir.join(file_name);
    match archive.extract_entry_to(&entry, &dest) {
        Ok(_) => {
            log::debug!("[EPUB] Cover {} written to {}", entry, dest.display());
            Some(dest)
        }
        Err(e) => {
            log::warn!("[EPUB] Cover {} not extracted: {}", entry, e);
            None
        }
    }
}
