//! # Container Engine
//!
//! A minimal ZIP-compatible container with a pluggable compression method
//! registry. PKZ needs to store entries under a private method id, which the
//! usual ZIP libraries refuse to write, so the engine keeps only what PKZ uses:
//!
//! 1.  **Local entries**: `[local file header][name][compressed bytes]`, one per entry.
//! 2.  **Central directory**: one header per entry, pointing back at its local header.
//! 3.  **End of central directory**: a fixed 22-byte record at the end of the file.
//!
//! Names are flagged as UTF-8. No encryption, no data descriptors; sizes and
//! CRCs are known before each local header is written.
//!
//! ZIP64 is used only where a value does not fit: a size or offset of
//! `0xFFFFFFFF` or more moves into the ZIP64 extended-information extra field,
//! and 65535 or more entries (or an oversized central directory) add the
//! ZIP64 end record and locator in front of the classic end record.
//!
//! Methods are dispatched by id. Stored (0) and deflated (8) are built in; other
//! ids are registered by the caller (see [`crate::codec::ObfuscatedMethod`]).

use std::io::{self, Read};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

mod reader;
mod writer;

pub use reader::ContainerReader;
pub use writer::ContainerWriter;

pub(crate) const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;
pub(crate) const CENTRAL_DIRECTORY_HEADER_SIGNATURE: u32 = 0x02014b50;
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE: u32 = 0x07064b50;

pub(crate) const LOCAL_FILE_HEADER_SIZE: u64 = 30;
pub(crate) const CENTRAL_DIRECTORY_HEADER_SIZE: u64 = 46;
pub(crate) const END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 22;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE: u64 = 56;
pub(crate) const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE: u64 = 20;

/// Header id of the ZIP64 extended-information extra field.
pub(crate) const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;
/// A 32-bit header value equal to this is stored in the ZIP64 extra field instead.
pub(crate) const ZIP64_SENTINEL_U32: u32 = u32::MAX;
/// A 16-bit entry count equal to this is stored in the ZIP64 end record instead.
pub(crate) const ZIP64_SENTINEL_U16: u16 = u16::MAX;

/// "Version needed to extract" written to every header (2.0: deflate).
pub(crate) const VERSION_NEEDED: u16 = 20;
/// "Version needed to extract" for entries and records that use ZIP64 (4.5).
pub(crate) const VERSION_ZIP64: u16 = 45;
/// General purpose flag bit 11: file name is UTF-8.
pub(crate) const FLAG_UTF8: u16 = 1 << 11;

/// ZIP method id: no compression.
pub const STORED: u16 = 0;
/// ZIP method id: raw deflate.
pub const DEFLATED: u16 = 8;

/// Write-side half of a compression method.
pub trait Compressor {
    /// Encode one complete entry payload.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Read-side half of a compression method.
pub trait Decompressor {
    /// Wrap the raw stored bytes of one entry in a decoding reader.
    fn decompress<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a>;
}

/// Method 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct Stored;

impl Compressor for Stored {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

impl Decompressor for Stored {
    fn decompress<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        raw
    }
}

/// Method 8.
#[derive(Debug, Clone, Copy)]
pub struct Deflated {
    level: Compression,
}

impl Deflated {
    pub fn new(level: u32) -> Self {
        Self { level: Compression::new(level.min(9)) }
    }
}

impl Default for Deflated {
    fn default() -> Self {
        Self { level: Compression::default() }
    }
}

impl Compressor for Deflated {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use std::io::Write;
        let mut enc = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        enc.write_all(data)?;
        enc.finish()
    }
}

impl Decompressor for Deflated {
    fn decompress<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(DeflateDecoder::new(raw))
    }
}

/// Central directory information for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Entry name as stored (UTF-8).
    pub name: String,
    /// Compression method id.
    pub method: u16,
    /// CRC-32 of the uncompressed bytes.
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Offset of the local file header from the start of the container.
    pub header_offset: u64,
}

/// True if `value` does not fit a 32-bit header field and needs the ZIP64 extra field.
pub(crate) fn needs_zip64(value: u64) -> bool {
    value >= ZIP64_SENTINEL_U32 as u64
}

/// The 32-bit header representation of `value`: itself, or the ZIP64 sentinel.
pub(crate) fn header_u32(value: u64) -> u32 {
    if needs_zip64(value) {
        ZIP64_SENTINEL_U32
    } else {
        value as u32
    }
}

/// Convert a calendar timestamp into the MS-DOS `(time, date)` pair ZIP headers use.
/// Years outside 1980..=2107 are clamped.
pub(crate) fn dos_timestamp<T: chrono::Datelike + chrono::Timelike>(t: &T) -> (u16, u16) {
    let year = t.year().clamp(1980, 2107) as u16;
    let time = ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | ((t.second() as u16) / 2);
    let date = ((year - 1980) << 9) | ((t.month() as u16) << 5) | (t.day() as u16);
    (time, date)
}
