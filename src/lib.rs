//! mu-shelf -- Comic archive and EPUB ingestion for reader applications
//!
//! Opens CBZ/CBR comics and EPUB books into one [`Document`] shape: comics
//! become an ordered list of page images extracted to a scratch directory,
//! books become normalized plain-text chapters with titles taken from the
//! navigation document.
//!
//! ```no_run
//! use mu_shelf::open_document;
//!
//! let doc = open_document("book.epub")?;
//! println!("{} ({} chapters)", doc.title(), doc.chapters().len());
//! # Ok::<(), mu_shelf::ShelfError>(())
//! ```
//!
//! # Features
//!
//! - `cli` -- builds the `mu-shelf` inspection binary
//!
//! # Blocking
//!
//! Every open is synchronous. RAR extraction shells out to external tools
//! and can block for up to the per-tool timeout for each configured tool.

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod archive;
pub mod book;
pub mod comic;
pub mod document;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod navigation;
pub mod normalize;
pub mod open;
pub mod scratch;
pub mod sequence;
pub mod spine;
pub mod zip;

mod href;
mod xml;

// Re-export key types for convenience
pub use archive::{sniff_container, ArchiveEntry, ArchiveReader, ContainerKind};
pub use book::{open_epub, open_epub_reader};
pub use comic::{open_comic, ComicKind};
pub use document::{Chapter, Document, DocumentContent, DocumentMetadata, TextContent, TocEntry};
pub use error::{ShelfError, ZipError, ZipErrorKind};
pub use extract::{extract_all, ExtractionOptions, ExtractionTool, ToolArg, ToolFailure};
pub use metadata::{ManifestItem, PackageDocument};
pub use navigation::{NavEntry, NavSource, NavTitleMap};
pub use normalize::{normalize_xhtml, TextNormalizer};
pub use open::{open_document, open_document_with_options, Format, OpenOptions, OpenOptionsBuilder};
pub use sequence::{natural_cmp, sequence_images};
pub use spine::{Spine, SpineItem};
pub use zip::ZipLimits;
