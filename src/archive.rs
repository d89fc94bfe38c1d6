//! Archive reader over ZIP-compatible containers.
//!
//! Wraps [`StreamingZip`] with the lookups document providers need: entry
//! enumeration in archive order, whole-entry reads that treat a missing or
//! unreadable entry as absent, and extraction of single entries to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::error::{ShelfError, ZipErrorKind};
use crate::href::{percent_decode, split_fragment};
use crate::zip::{CdEntry, StreamingZip, ZipLimits};

/// Container family detected from leading magic bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// `PK` local header or empty-archive EOCD.
    Zip,
    /// RAR 1.5 to 5.0 signature.
    Rar,
    /// Neither signature matched, or the file was too short to tell.
    Unknown,
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

impl ContainerKind {
    /// Classify a byte prefix.
    pub fn from_magic(prefix: &[u8]) -> Self {
        if prefix.starts_with(ZIP_MAGIC) || prefix.starts_with(ZIP_EMPTY_MAGIC) {
            ContainerKind::Zip
        } else if prefix.starts_with(RAR_MAGIC) {
            ContainerKind::Rar
        } else {
            ContainerKind::Unknown
        }
    }
}

/// Sniff the container family of a file on disk.
pub fn sniff_container(path: &Path) -> Result<ContainerKind, ShelfError> {
    let mut file = File::open(path)?;
    let mut prefix = [0u8; 8];
    let mut filled = 0;
    while filled < prefix.len() {
        match file.read(&mut prefix[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(ContainerKind::from_magic(&prefix[..filled]))
}

/// Name and uncompressed size of one archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

/// Random-access reader over a ZIP-compatible container.
///
/// Owns its source exclusively; dropping the reader closes it.
pub struct ArchiveReader<R: Read + Seek> {
    zip: StreamingZip<R>,
}

impl ArchiveReader<File> {
    /// Open a container from the filesystem.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ShelfError> {
        Self::open_with_limits(path, None)
    }

    /// Open a container from the filesystem with explicit ZIP limits.
    pub fn open_with_limits<P: AsRef<Path>>(
        path: P,
        limits: Option<ZipLimits>,
    ) -> Result<Self, ShelfError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ShelfError::Open(format!("{}: {}", path.display(), e)))?;
        Self::from_reader_with_limits(file, limits)
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open a container from any seekable source.
    pub fn from_reader(reader: R) -> Result<Self, ShelfError> {
        Self::from_reader_with_limits(reader, None)
    }

    /// Open a container from any seekable source with explicit ZIP limits.
    pub fn from_reader_with_limits(
        reader: R,
        limits: Option<ZipLimits>,
    ) -> Result<Self, ShelfError> {
        let zip = StreamingZip::new_with_limits(reader, limits)
            .map_err(|e| ShelfError::Open(format!("unreadable archive: {}", e)))?;
        Ok(Self { zip })
    }

    /// Entries in archive-native order. Directory records are omitted.
    pub fn list_entries(&self) -> Vec<ArchiveEntry> {
        self.zip
            .entries()
            .filter(|e| !e.is_dir())
            .map(|e| ArchiveEntry {
                name: e.filename.clone(),
                size: e.uncompressed_size as u64,
            })
            .collect()
    }

    /// Whether an entry with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.zip.get_entry(name).is_some()
    }

    /// Read a whole entry.
    ///
    /// `None` means the entry is absent or could not be decoded (the cause
    /// is logged). A zero-length entry is `Some` of an empty vector.
    pub fn read_entry(&mut self, name: &str) -> Option<Vec<u8>> {
        let entry = self.find(name)?;
        match self.zip.read_to_vec(&entry) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                log::warn!("[ARCHIVE] Failed to read '{}': {}", name, err);
                None
            }
        }
    }

    /// Read an entry named by a resolved href.
    ///
    /// Tries the path verbatim, then its percent-decoded form, and strips
    /// any `#fragment` first.
    pub fn read_href(&mut self, href: &str) -> Option<Vec<u8>> {
        let (path, _) = split_fragment(href);
        if self.contains(path) {
            return self.read_entry(path);
        }
        let decoded = percent_decode(path);
        if decoded != path {
            return self.read_entry(&decoded);
        }
        None
    }

    /// Whether an href names an entry, by the same rules as [`Self::read_href`].
    pub fn contains_href(&self, href: &str) -> bool {
        let (path, _) = split_fragment(href);
        self.contains(path) || self.contains(&percent_decode(path))
    }

    /// Stream one entry into a file at `dest`, creating parent directories.
    pub fn extract_entry_to(&mut self, name: &str, dest: &Path) -> Result<u64, ShelfError> {
        let entry = self.find(name).ok_or(ZipErrorKind::FileNotFound)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(dest)?);
        let written = self.zip.read_file_to_writer(&entry, &mut out)?;
        out.flush()?;
        Ok(written as u64)
    }

    fn find(&self, name: &str) -> Option<CdEntry> {
        self.zip.get_entry(name).cloned()
    }
}
