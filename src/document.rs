//! The uniform document every provider produces.

use std::path::{Path, PathBuf};

/// One readable chapter of a text document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chapter {
    /// Navigation label, or the content document's file stem
    pub title: String,
    /// Normalized text, never empty
    pub text: String,
    /// Archive path of the content document
    pub href: String,
}

/// A table-of-contents entry mapped onto the chapter list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Label from the navigation document
    pub label: String,
    /// Archive path of the target, with its fragment when present
    pub href: String,
    /// Index into [`Document::chapters`] when the target is a chapter
    pub chapter_index: Option<usize>,
}

/// Text payload: chapters plus their concatenation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextContent {
    pub(crate) chapters: Vec<Chapter>,
    pub(crate) full_text: String,
    pub(crate) toc: Vec<TocEntry>,
}

impl TextContent {
    /// Build from chapters in reading order. The full text is derived here
    /// so it always matches the chapter texts.
    pub(crate) fn new(chapters: Vec<Chapter>, toc: Vec<TocEntry>) -> Self {
        let full_text = chapters
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            chapters,
            full_text,
            toc,
        }
    }
}

/// What a document carries: text or page images, never both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentContent {
    /// EPUB-style text chapters
    Text(TextContent),
    /// Comic pages in reading order
    Images(Vec<PathBuf>),
}

/// Descriptive metadata from the EPUB package. Empty for comics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Creators in package order
    pub authors: Vec<String>,
    /// Package `language`
    pub language: Option<String>,
    /// Package `publisher`
    pub publisher: Option<String>,
    /// Package `description`, markup kept as written
    pub description: Option<String>,
    /// Series name
    pub series: Option<String>,
    /// Cover image extracted to the scratch directory
    pub cover_path: Option<PathBuf>,
}

impl DocumentMetadata {
    /// Authors joined for display (`"A; B"`).
    pub fn authors_display(&self) -> String {
        self.authors.join("; ")
    }
}

/// An opened comic or book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    title: String,
    metadata: DocumentMetadata,
    content: DocumentContent,
}

impl Document {
    pub(crate) fn new(title: String, metadata: DocumentMetadata, content: DocumentContent) -> Self {
        Self {
            title,
            metadata,
            content,
        }
    }

    /// Display title, never empty for documents opened from a named file.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Descriptive metadata.
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    /// Text or image payload.
    pub fn content(&self) -> &DocumentContent {
        &self.content
    }

    /// Whether this is a text document.
    pub fn is_text(&self) -> bool {
        matches!(self.content, DocumentContent::Text(_))
    }

    /// Chapters in reading order; empty for image documents.
    pub fn chapters(&self) -> &[Chapter] {
        match &self.content {
            DocumentContent::Text(text) => &text.chapters,
            DocumentContent::Images(_) => &[],
        }
    }

    /// Chapter titles in reading order.
    pub fn chapter_titles(&self) -> Vec<&str> {
        self.chapters().iter().map(|c| c.title.as_str()).collect()
    }

    /// Chapter texts in reading order.
    pub fn chapter_texts(&self) -> Vec<&str> {
        self.chapters().iter().map(|c| c.text.as_str()).collect()
    }

    /// Chapter texts joined by a blank line; empty for image documents.
    pub fn full_text(&self) -> &str {
        match &self.content {
            DocumentContent::Text(text) => &text.full_text,
            DocumentContent::Images(_) => "",
        }
    }

    /// Table of contents in navigation order; empty for image documents.
    pub fn toc(&self) -> &[TocEntry] {
        match &self.content {
            DocumentContent::Text(text) => &text.toc,
            DocumentContent::Images(_) => &[],
        }
    }

    /// Page images in reading order; empty for text documents.
    pub fn image_paths(&self) -> &[PathBuf] {
        match &self.content {
            DocumentContent::Images(paths) => paths,
            DocumentContent::Text(_) => &[],
        }
    }

    /// Cover image on disk, if one was extracted.
    pub fn cover_path(&self) -> Option<&Path> {
        self.metadata.cover_path.as_deref()
    }
}
