//! Streaming ZIP decoder
//!
//! Reads the central directory once, then streams individual entries on
//! demand. Stored and DEFLATE entries are supported, decompressed with
//! miniz_oxide and verified against their CRC32.

use miniz_oxide::{DataFormat, MZFlush, MZStatus};
use std::io::{Read, Seek, SeekFrom, Write};

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed file size allowed for reads.
    pub max_file_read_size: usize,
    /// Whether ZIP parsing should fail on strict structural issues.
    pub strict: bool,
    /// Maximum bytes scanned from file tail while searching for EOCD.
    pub max_eocd_scan: usize,
}

impl ZipLimits {
    /// Create explicit ZIP limits.
    pub fn new(max_file_read_size: usize) -> Self {
        Self {
            max_file_read_size,
            strict: false,
            max_eocd_scan: MAX_EOCD_SCAN,
        }
    }

    /// Enable or disable strict ZIP parsing behavior.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set a cap for EOCD tail scan bytes.
    pub fn with_max_eocd_scan(mut self, max_eocd_scan: usize) -> Self {
        self.max_eocd_scan = max_eocd_scan.max(EOCD_MIN_SIZE);
        self
    }
}

/// Local file header signature (little-endian)
pub(crate) const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;

/// Central directory entry signature (little-endian)
pub(crate) const SIG_CD_ENTRY: u32 = 0x02014b50;

/// End of central directory signature (little-endian)
pub(crate) const SIG_EOCD: u32 = 0x06054b50;
/// ZIP64 end of central directory locator signature (little-endian)
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;

/// Compression methods
pub(crate) const METHOD_STORED: u16 = 0;
pub(crate) const METHOD_DEFLATED: u16 = 8;

/// Chunk size used for streaming reads and inflate output.
const STREAM_CHUNK: usize = 8 * 1024;

pub use crate::error::ZipError;

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: u64,
    cd_size: u32,
    num_entries: u16,
    uses_zip64: bool,
}

/// Central directory entry metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CdEntry {
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Entry name as stored in the archive
    pub filename: String,
}

impl CdEntry {
    /// Directory entries carry a trailing slash and no data.
    pub fn is_dir(&self) -> bool {
        self.filename.ends_with('/')
    }
}

/// Streaming ZIP file reader
pub struct StreamingZip<F: Read + Seek> {
    file: F,
    /// Central directory entries in archive order
    entries: Vec<CdEntry>,
    limits: Option<ZipLimits>,
}

impl<F: Read + Seek> StreamingZip<F> {
    /// Open a ZIP file and parse the central directory
    pub fn new(file: F) -> Result<Self, ZipError> {
        Self::new_with_limits(file, None)
    }

    /// Open a ZIP file with explicit runtime limits.
    pub fn new_with_limits(mut file: F, limits: Option<ZipLimits>) -> Result<Self, ZipError> {
        let max_eocd_scan = limits
            .map(|l| l.max_eocd_scan.min(MAX_EOCD_SCAN))
            .unwrap_or(MAX_EOCD_SCAN);
        let eocd = Self::find_eocd(&mut file, max_eocd_scan)?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }
        let strict = limits.is_some_and(|l| l.strict);

        file.seek(SeekFrom::Start(eocd.cd_offset))
            .map_err(|_| ZipError::IoError)?;
        let cd_end = eocd.cd_offset + eocd.cd_size as u64;

        let mut entries = Vec::with_capacity(eocd.num_entries as usize);
        for _ in 0..eocd.num_entries {
            let pos = file.stream_position().map_err(|_| ZipError::IoError)?;
            if pos >= cd_end {
                if strict {
                    return Err(ZipError::InvalidFormat);
                }
                break;
            }
            match Self::read_cd_entry(&mut file)? {
                Some(entry) => entries.push(entry),
                None if strict => return Err(ZipError::InvalidFormat),
                None => break,
            }
        }

        if entries.len() < eocd.num_entries as usize {
            log::warn!(
                "[ZIP] Central directory declares {} entries but only {} were readable",
                eocd.num_entries,
                entries.len()
            );
        }
        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        Ok(Self {
            file,
            entries,
            limits,
        })
    }

    /// Find EOCD and extract central directory info
    fn find_eocd(file: &mut F, max_eocd_scan: usize) -> Result<EocdInfo, ZipError> {
        let file_size = file.seek(SeekFrom::End(0)).map_err(|_| ZipError::IoError)?;
        if file_size < EOCD_MIN_SIZE as u64 {
            return Err(ZipError::InvalidFormat);
        }

        let scan_range = file_size.min(max_eocd_scan as u64) as usize;
        if scan_range < EOCD_MIN_SIZE {
            return Err(ZipError::InvalidFormat);
        }
        let mut buffer = vec![0u8; scan_range];
        file.seek(SeekFrom::Start(file_size - scan_range as u64))
            .map_err(|_| ZipError::IoError)?;
        file.read_exact(&mut buffer).map_err(|_| ZipError::IoError)?;
        let scan_base = file_size - scan_range as u64;

        // Scan backwards so a trailing comment containing the signature loses
        // to the real record.
        for i in (0..=scan_range - EOCD_MIN_SIZE).rev() {
            if read_u32_le(&buffer, i) != SIG_EOCD {
                continue;
            }
            let num_entries = read_u16_le(&buffer, i + 10);
            let cd_size = read_u32_le(&buffer, i + 12);
            let cd_offset = read_u32_le(&buffer, i + 16) as u64;
            let comment_len = read_u16_le(&buffer, i + 20) as u64;
            let eocd_pos = scan_base + i as u64;
            if eocd_pos + EOCD_MIN_SIZE as u64 + comment_len != file_size {
                continue;
            }

            let uses_zip64_sentinel =
                num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX as u64;
            let uses_zip64_locator =
                i >= 20 && read_u32_le(&buffer, i - 20) == SIG_ZIP64_EOCD_LOCATOR;
            if !(uses_zip64_sentinel || uses_zip64_locator) {
                let cd_end = cd_offset
                    .checked_add(cd_size as u64)
                    .ok_or(ZipError::InvalidFormat)?;
                if cd_end > eocd_pos {
                    return Err(ZipError::InvalidFormat);
                }
            }

            return Ok(EocdInfo {
                cd_offset,
                cd_size,
                num_entries,
                uses_zip64: uses_zip64_sentinel || uses_zip64_locator,
            });
        }

        Err(ZipError::InvalidFormat)
    }

    /// Read one central directory record, `None` once the signature stops matching.
    fn read_cd_entry(file: &mut F) -> Result<Option<CdEntry>, ZipError> {
        let mut sig_buf = [0u8; 4];
        if file.read_exact(&mut sig_buf).is_err() {
            return Ok(None);
        }
        if u32::from_le_bytes(sig_buf) != SIG_CD_ENTRY {
            return Ok(None);
        }

        // Fixed part after the signature: CD offsets 4..46.
        let mut buf = [0u8; 42];
        file.read_exact(&mut buf).map_err(|_| ZipError::IoError)?;

        let name_len = read_u16_le(&buf, 24) as usize;
        let extra_len = read_u16_le(&buf, 26) as i64;
        let comment_len = read_u16_le(&buf, 28) as i64;

        let mut name_buf = vec![0u8; name_len];
        file.read_exact(&mut name_buf)
            .map_err(|_| ZipError::IoError)?;
        if extra_len + comment_len > 0 {
            file.seek(SeekFrom::Current(extra_len + comment_len))
                .map_err(|_| ZipError::IoError)?;
        }

        Ok(Some(CdEntry {
            method: read_u16_le(&buf, 6),
            crc32: read_u32_le(&buf, 12),
            compressed_size: read_u32_le(&buf, 16),
            uncompressed_size: read_u32_le(&buf, 20),
            local_header_offset: read_u32_le(&buf, 38),
            filename: String::from_utf8_lossy(&name_buf).into_owned(),
        }))
    }

    /// Get entry by filename.
    ///
    /// Exact matches win; otherwise the first ASCII case-insensitive match,
    /// ignoring a leading `/` on either side.
    pub fn get_entry(&self, name: &str) -> Option<&CdEntry> {
        if let Some(exact) = self.entries.iter().find(|e| e.filename == name) {
            return Some(exact);
        }
        let wanted = name.trim_start_matches('/');
        self.entries
            .iter()
            .find(|e| e.filename.trim_start_matches('/').eq_ignore_ascii_case(wanted))
    }

    /// Iterate over all entries in archive order.
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Number of readable central directory entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Get the active limits used by this ZIP reader.
    pub fn limits(&self) -> Option<ZipLimits> {
        self.limits
    }

    /// Read an entry fully into memory.
    pub fn read_to_vec(&mut self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
        self.read_file_to_writer(entry, &mut out)?;
        Ok(out)
    }

    /// Stream a file's decompressed bytes into an arbitrary writer.
    pub fn read_file_to_writer<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
    ) -> Result<usize, ZipError> {
        let mut input_buf = vec![0u8; STREAM_CHUNK];
        let mut output_buf = vec![0u8; STREAM_CHUNK];
        self.read_file_to_writer_with_scratch(entry, writer, &mut input_buf, &mut output_buf)
    }

    /// Stream a file's decompressed bytes into a writer using caller-provided buffers.
    ///
    /// `input_buf` and `output_buf` must both be non-empty. Stored entries only
    /// touch `input_buf`.
    pub fn read_file_to_writer_with_scratch<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
        input_buf: &mut [u8],
        output_buf: &mut [u8],
    ) -> Result<usize, ZipError> {
        if input_buf.is_empty() || output_buf.is_empty() {
            return Err(ZipError::BufferTooSmall);
        }
        if let Some(limits) = self.limits {
            if entry.uncompressed_size as usize > limits.max_file_read_size
                || entry.compressed_size as usize > limits.max_file_read_size
            {
                return Err(ZipError::FileTooLarge);
            }
        }

        let data_offset = self.calc_data_offset(entry)?;
        self.file
            .seek(SeekFrom::Start(data_offset))
            .map_err(|_| ZipError::IoError)?;

        let mut hasher = crc32fast::Hasher::new();
        let written = match entry.method {
            METHOD_STORED => {
                let mut remaining = entry.compressed_size as usize;
                let mut written = 0usize;
                while remaining > 0 {
                    let take = remaining.min(input_buf.len());
                    self.file
                        .read_exact(&mut input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    writer
                        .write_all(&input_buf[..take])
                        .map_err(|_| ZipError::IoError)?;
                    hasher.update(&input_buf[..take]);
                    written += take;
                    remaining -= take;
                }
                written
            }
            METHOD_DEFLATED => {
                self.inflate_to_writer(entry, writer, &mut hasher, input_buf, output_buf)?
            }
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if entry.crc32 != 0 && hasher.finalize() != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(written)
    }

    fn inflate_to_writer<W: Write>(
        &mut self,
        entry: &CdEntry,
        writer: &mut W,
        hasher: &mut crc32fast::Hasher,
        input_buf: &mut [u8],
        output_buf: &mut [u8],
    ) -> Result<usize, ZipError> {
        let mut state = Box::new(miniz_oxide::inflate::stream::InflateState::new(
            DataFormat::Raw,
        ));
        let mut compressed_remaining = entry.compressed_size as usize;
        let mut pending_start = 0usize;
        let mut pending_end = 0usize;
        let mut written = 0usize;

        loop {
            if pending_start == pending_end && compressed_remaining > 0 {
                let take = compressed_remaining.min(input_buf.len());
                self.file
                    .read_exact(&mut input_buf[..take])
                    .map_err(|_| ZipError::IoError)?;
                pending_start = 0;
                pending_end = take;
                compressed_remaining -= take;
            }

            // Never `Finish`: on a first call it demands the whole output fit in
            // `output_buf`.
            let result = miniz_oxide::inflate::stream::inflate(
                &mut state,
                &input_buf[pending_start..pending_end],
                output_buf,
                MZFlush::None,
            );
            let consumed = result.bytes_consumed;
            let produced = result.bytes_written;
            pending_start += consumed;

            if produced > 0 {
                writer
                    .write_all(&output_buf[..produced])
                    .map_err(|_| ZipError::IoError)?;
                hasher.update(&output_buf[..produced]);
                written += produced;
            }

            match result.status {
                Ok(MZStatus::StreamEnd) => {
                    if compressed_remaining != 0 || pending_start != pending_end {
                        return Err(ZipError::DecompressError);
                    }
                    return Ok(written);
                }
                Ok(MZStatus::Ok) => {
                    if consumed == 0 && produced == 0 {
                        return Err(ZipError::DecompressError);
                    }
                }
                Ok(MZStatus::NeedDict) | Err(_) => return Err(ZipError::DecompressError),
            }
        }
    }

    /// Offset of the entry data, past the local header and its variable fields.
    fn calc_data_offset(&mut self, entry: &CdEntry) -> Result<u64, ZipError> {
        let offset = entry.local_header_offset as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| ZipError::IoError)?;

        let mut header = [0u8; 30];
        self.file
            .read_exact(&mut header)
            .map_err(|_| ZipError::IoError)?;
        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }

        let name_len = read_u16_le(&header, 26) as u64;
        let extra_len = read_u16_le(&header, 28) as u64;
        Ok(offset + 30 + name_len + extra_len)
    }
}

fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build an in-memory ZIP holding the given entries in order.
    ///
    /// Entries whose flag is `true` are DEFLATE-compressed, the rest stored.
    pub(crate) fn build_zip(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let mut zip = Vec::new();
        let mut central = Vec::new();

        for (name, content, deflate) in files {
            let name_bytes = name.as_bytes();
            let crc = crc32fast::hash(content);
            let (method, data) = if *deflate {
                (
                    METHOD_DEFLATED,
                    miniz_oxide::deflate::compress_to_vec(content, 6),
                )
            } else {
                (METHOD_STORED, content.to_vec())
            };
            let local_offset = zip.len() as u32;

            zip.extend_from_slice(&SIG_LOCAL_FILE_HEADER.to_le_bytes());
            zip.extend_from_slice(&20u16.to_le_bytes()); // version needed
            zip.extend_from_slice(&0u16.to_le_bytes()); // flags
            zip.extend_from_slice(&method.to_le_bytes());
            zip.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
            zip.extend_from_slice(&crc.to_le_bytes());
            zip.extend_from_slice(&(data.len() as u32).to_le_bytes());
            zip.extend_from_slice(&(content.len() as u32).to_le_bytes());
            zip.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            zip.extend_from_slice(&0u16.to_le_bytes()); // extra length
            zip.extend_from_slice(name_bytes);
            zip.extend_from_slice(&data);

            central.extend_from_slice(&SIG_CD_ENTRY.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes()); // version made by
            central.extend_from_slice(&20u16.to_le_bytes()); // version needed
            central.extend_from_slice(&0u16.to_le_bytes()); // flags
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&0u32.to_le_bytes()); // mod time + date
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(content.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes()); // extra length
            central.extend_from_slice(&0u16.to_le_bytes()); // comment length
            central.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            central.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
            central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
            central.extend_from_slice(&local_offset.to_le_bytes());
            central.extend_from_slice(name_bytes);
        }

        let cd_offset = zip.len() as u32;
        let cd_size = central.len() as u32;
        zip.extend_from_slice(&central);

        let count = files.len() as u16;
        zip.extend_from_slice(&SIG_EOCD.to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes()); // disk number
        zip.extend_from_slice(&0u16.to_le_bytes()); // disk with CD
        zip.extend_from_slice(&count.to_le_bytes());
        zip.extend_from_slice(&count.to_le_bytes());
        zip.extend_from_slice(&cd_size.to_le_bytes());
        zip.extend_from_slice(&cd_offset.to_le_bytes());
        zip.extend_from_slice(&0u16.to_le_bytes()); // comment length
        zip
    }
}
