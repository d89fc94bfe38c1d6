//! Format dispatch and open configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::book::open_epub;
use crate::comic::{open_comic, ComicKind};
use crate::document::Document;
use crate::error::ShelfError;
use crate::extract::{ExtractionOptions, ExtractionTool};
use crate::zip::ZipLimits;

/// Supported source formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// ZIP comic archive
    Cbz,
    /// RAR comic archive
    Cbr,
    /// EPUB 2 or 3 book
    Epub,
}

impl Format {
    /// Format for a file extension, compared case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "cbz" => Some(Format::Cbz),
            "cbr" => Some(Format::Cbr),
            "epub" => Some(Format::Epub),
            _ => None,
        }
    }

    /// Format for a path, by its extension.
    pub fn from_path(path: &Path) -> Result<Self, ShelfError> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_extension(&extension).ok_or_else(|| {
            ShelfError::UnsupportedFormat(format!("No provider for extension: {}", extension))
        })
    }

    /// Extensions this crate opens, lowercase.
    pub fn supported_extensions() -> &'static [&'static str] {
        &["cbz", "cbr", "epub"]
    }
}

/// Configuration shared by every provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOptions {
    /// Optional ZIP safety limits used while reading archive entries.
    ///
    /// When `None`, no explicit file-size caps are enforced.
    pub zip_limits: Option<ZipLimits>,
    /// Base directory for scratch extraction. Defaults to the temp dir.
    pub scratch_root: Option<PathBuf>,
    /// External tool chain for RAR-family archives.
    pub extraction: ExtractionOptions,
    /// Write the EPUB cover image into a scratch directory.
    pub extract_cover: bool,
    /// Read only linear spine items when there are any.
    pub skip_non_linear: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            zip_limits: None,
            scratch_root: None,
            extraction: ExtractionOptions::default(),
            extract_cover: true,
            skip_non_linear: false,
        }
    }
}

/// Builder for [`OpenOptions`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOptionsBuilder {
    options: OpenOptions,
}

impl OpenOptionsBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set explicit ZIP limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.options.zip_limits = Some(limits);
        self
    }

    /// Extract into `root` instead of the temp directory.
    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.scratch_root = Some(root.into());
        self
    }

    /// Per-tool wait for external extraction.
    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.options.extraction.timeout = timeout;
        self
    }

    /// Replace the external tool chain.
    pub fn extraction_tools(mut self, tools: Vec<ExtractionTool>) -> Self {
        self.options.extraction.tools = tools;
        self
    }

    /// Whether to write the EPUB cover image to disk.
    pub fn extract_cover(mut self, extract: bool) -> Self {
        self.options.extract_cover = extract;
        self
    }

    /// Whether to leave out non-linear spine items.
    pub fn skip_non_linear(mut self, skip: bool) -> Self {
        self.options.skip_non_linear = skip;
        self
    }

    /// Finished options.
    pub fn build(self) -> OpenOptions {
        self.options
    }

    /// Open a document with these options.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Document, ShelfError> {
        open_document_with_options(path, &self.options)
    }
}

/// Open a comic or book with default options.
pub fn open_document<P: AsRef<Path>>(path: P) -> Result<Document, ShelfError> {
    open_document_with_options(path, &OpenOptions::default())
}

/// Open a comic or book, choosing the provider by file extension.
pub fn open_document_with_options<P: AsRef<Path>>(
    path: P,
    options: &OpenOptions,
) -> Result<Document, ShelfError> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    log::debug!("[OPEN] {} as {:?}", path.display(), format);

    match format {
        Format::Cbz => open_comic(path, ComicKind::Cbz, options),
        Format::Cbr => open_comic(path, ComicKind::Cbr, options),
        Format::Epub => open_epub(path, options),
    }
}
