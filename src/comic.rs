//! Comic archives (CBZ, CBR) as image documents.
//!
//! CBZ entries are decoded in-process and written to the scratch directory.
//! CBR archives go through the external extraction chain; a CBR that is
//! really a ZIP (and a CBZ that is really RAR) is routed by its magic bytes.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{sniff_container, ArchiveReader, ContainerKind};
use crate::document::{Document, DocumentContent, DocumentMetadata};
use crate::error::ShelfError;
use crate::extract::extract_all;
use crate::open::OpenOptions;
use crate::scratch::{prepare_scratch_dir, sanitize_entry_path, ScratchKind};
use crate::sequence::{is_image_file, sequence_images};

/// Comic container flavor, from the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComicKind {
    /// `.cbz`, expected to be ZIP
    Cbz,
    /// `.cbr`, expected to be RAR
    Cbr,
}

impl ComicKind {
    fn label(self) -> &'static str {
        match self {
            ComicKind::Cbz => "CBZ",
            ComicKind::Cbr => "CBR",
        }
    }
}

/// Open a comic archive into an image document.
///
/// Pages are extracted to a scratch directory derived from `path` and
/// returned in natural order. Fails with [`ShelfError::EmptyContent`] when
/// no page image is found.
pub fn open_comic(path: &Path, kind: ComicKind, options: &OpenOptions) -> Result<Document, ShelfError> {
    let container = match sniff_container(path) {
        Ok(container) => container,
        Err(e) => {
            return Err(ShelfError::Open(format!(
                "Failed to open {}: {}",
                kind.label(),
                e.diagnostic()
            )))
        }
    };

    let images = match (kind, container) {
        (_, ContainerKind::Zip) | (ComicKind::Cbz, ContainerKind::Unknown) => {
            extract_zip_pages(path, kind, options)?
        }
        (_, ContainerKind::Rar) | (ComicKind::Cbr, ContainerKind::Unknown) => {
            extract_with_tools(path, kind, options)?
        }
    };

    if images.is_empty() {
        return Err(ShelfError::EmptyContent(format!(
            "No images found in {}",
            kind.label()
        )));
    }
    log::debug!("[COMIC] {} pages in {}", images.len(), path.display());

    Ok(Document::new(
        file_title(path),
        DocumentMetadata::default(),
        DocumentContent::Images(images),
    ))
}

/// Display title for a file: its name without the last extension.
pub(crate) fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extract_zip_pages(
    path: &Path,
    kind: ComicKind,
    options: &OpenOptions,
) -> Result<Vec<PathBuf>, ShelfError> {
    let mut archive = ArchiveReader::open_with_limits(path, options.zip_limits).map_err(|e| {
        ShelfError::Open(format!("Failed to open {}: {}", kind.label(), e.diagnostic()))
    })?;
    let scratch = prepare_scratch_dir(path, ScratchKind::Comic, options.scratch_root.as_deref())?;

    let mut pages = Vec::new();
    for entry in archive.list_entries() {
        if !is_image_file(Path::new(&entry.name)) {
            continue;
        }
        let Some(relative) = sanitize_entry_path(&entry.name) else {
            log::warn!("[COMIC] Skipping unusable entry name '{}'", entry.name);
            continue;
        };
        let dest = scratch.join(relative);
        match archive.extract_entry_to(&entry.name, &dest) {
            Ok(_) => pages.push(dest),
            Err(e) => log::warn!("[COMIC] Failed to extract '{}': {}", entry.name, e),
        }
    }

    Ok(sequence_images(pages))
}

fn extract_with_tools(
    path: &Path,
    kind: ComicKind,
    options: &OpenOptions,
) -> Result<Vec<PathBuf>, ShelfError> {
    let scratch = prepare_scratch_dir(path, ScratchKind::Comic, options.scratch_root.as_deref())?;
    let tool = extract_all(path, &scratch, &options.extraction).map_err(|e| match e {
        ShelfError::Extraction(msg) => ShelfError::Extraction(format!("{} {}", kind.label(), msg)),
        other => other,
    })?;
    log::debug!("[COMIC] Extracted {} with {}", path.display(), tool);

    let mut files = Vec::new();
    collect_files(&scratch, &mut files)?;
    Ok(sequence_images(files))
}

/// Every regular file under `dir`, recursively.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ShelfError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}
