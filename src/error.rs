//! Unified error types for mu-shelf
//!
//! Every open call returns exactly one `ShelfError` on failure. Module-level
//! parse problems are recovered locally and only surface through `log`.

use std::fmt;

/// Top-level error type for document opening
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShelfError {
    /// Container unreadable or structurally invalid at the entry point
    Open(String),
    /// No decoder or external tool could extract a RAR-family container
    Extraction(String),
    /// Container decoded fine but held no usable chapters or images
    EmptyContent(String),
    /// No provider handles the file extension
    UnsupportedFormat(String),
    /// ZIP archive error
    Zip(ZipError),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Chapter content is malformed in its own encoding
    ChapterNotUtf8 {
        /// Chapter path in the archive.
        href: String,
    },
}

impl ShelfError {
    /// Short human-readable diagnostic, without the category prefix.
    pub fn diagnostic(&self) -> String {
        match self {
            ShelfError::Open(msg)
            | ShelfError::Extraction(msg)
            | ShelfError::EmptyContent(msg)
            | ShelfError::UnsupportedFormat(msg)
            | ShelfError::Io(msg) => msg.clone(),
            ShelfError::Zip(kind) => kind.to_string(),
            ShelfError::ChapterNotUtf8 { href } => {
                format!("chapter content cannot be decoded: {}", href)
            }
        }
    }
}

impl fmt::Display for ShelfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShelfError::Open(msg) => write!(f, "Open failed: {}", msg),
            ShelfError::Extraction(msg) => write!(f, "Extraction failed: {}", msg),
            ShelfError::EmptyContent(msg) => write!(f, "Empty content: {}", msg),
            ShelfError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            ShelfError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            ShelfError::Io(msg) => write!(f, "I/O error: {}", msg),
            ShelfError::ChapterNotUtf8 { href } => {
                write!(f, "Chapter content cannot be decoded: {}", href)
            }
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// I/O error during ZIP operations
    IoError,
    /// Buffer too small for decompressed content
    BufferTooSmall,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::IoError => write!(f, "I/O error"),
            ZipErrorKind::BufferTooSmall => write!(f, "buffer too small"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

impl std::error::Error for ShelfError {}

impl std::error::Error for ZipErrorKind {}

impl From<ZipErrorKind> for ShelfError {
    fn from(err: ZipErrorKind) -> Self {
        ShelfError::Zip(err)
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(err: std::io::Error) -> Self {
        ShelfError::Io(err.to_string())
    }
}
