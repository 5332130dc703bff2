use std::collections::{HashMap, HashSet};
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::{
    dos_timestamp, header_u32, needs_zip64, Compressor, Deflated, EntryMeta, Stored, CENTRAL_DIRECTORY_HEADER_SIGNATURE,
    CENTRAL_DIRECTORY_HEADER_SIZE, DEFLATED, END_OF_CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIZE,
    FLAG_UTF8, LOCAL_FILE_HEADER_SIGNATURE, LOCAL_FILE_HEADER_SIZE, STORED, VERSION_NEEDED, VERSION_ZIP64,
    ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE, ZIP64_EXTRA_FIELD_ID,
    ZIP64_SENTINEL_U16,
};
use crate::error::{PkzError, Result};

/// A writer that appends named entries to a ZIP-compatible container.
///
/// Entries are compressed in memory, then written as `[local header][data]`.
/// The central directory and end record are emitted by [`ContainerWriter::finish`].
/// The sink only needs `Write`; offsets are tracked internally.
pub struct ContainerWriter<W: Write> {
    sink: W,
    offset: u64,
    entries: Vec<EntryMeta>,
    names: HashSet<String>,
    compressors: HashMap<u16, Box<dyn Compressor>>,
    dos_time: u16,
    dos_date: u16,
}

impl<W: Write> ContainerWriter<W> {
    /// Creates a writer with the built-in stored and deflated methods registered.
    pub fn new(sink: W) -> Self {
        let (dos_time, dos_date) = dos_timestamp(&chrono::Local::now());
        let mut compressors: HashMap<u16, Box<dyn Compressor>> = HashMap::new();
        compressors.insert(STORED, Box::new(Stored));
        compressors.insert(DEFLATED, Box::new(Deflated::default()));
        Self {
            sink,
            offset: 0,
            entries: Vec::new(),
            names: HashSet::new(),
            compressors,
            dos_time,
            dos_date,
        }
    }

    /// Registers (or replaces) the compressor used for `method`.
    pub fn register_compressor(&mut self, method: u16, compressor: Box<dyn Compressor>) {
        self.compressors.insert(method, compressor);
    }

    /// True if an entry with this name has already been written.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Total bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Compresses `data` with the compressor registered for `method` and appends it
    /// as entry `name`. Returns the stored (compressed) size.
    pub fn add_entry(&mut self, name: &str, method: u16, data: &[u8]) -> Result<u64> {
        if self.names.contains(name) {
            return Err(PkzError::DuplicateEntry(name.to_string()));
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| PkzError::ContainerLimit(format!("entry name is {} bytes long", name.len())))?;

        let compressor = self
            .compressors
            .get(&method)
            .ok_or_else(|| PkzError::UnsupportedMethod { method, name: name.to_string() })?;
        let packed = compressor.compress(data)?;

        let crc32 = crc32fast::hash(data);
        let compressed_size = packed.len() as u64;
        let uncompressed_size = data.len() as u64;

        // The local header has no offset field, so only the sizes can overflow here.
        let zip64 = needs_zip64(compressed_size) || needs_zip64(uncompressed_size);
        let mut extra = Vec::new();
        if zip64 {
            extra.write_u16::<LittleEndian>(ZIP64_EXTRA_FIELD_ID)?;
            extra.write_u16::<LittleEndian>(16)?;
            extra.write_u64::<LittleEndian>(uncompressed_size)?;
            extra.write_u64::<LittleEndian>(compressed_size)?;
        }

        let w = &mut self.sink;
        w.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIGNATURE)?;
        w.write_u16::<LittleEndian>(if zip64 { VERSION_ZIP64 } else { VERSION_NEEDED })?;
        w.write_u16::<LittleEndian>(FLAG_UTF8)?;
        w.write_u16::<LittleEndian>(method)?;
        w.write_u16::<LittleEndian>(self.dos_time)?;
        w.write_u16::<LittleEndian>(self.dos_date)?;
        w.write_u32::<LittleEndian>(crc32)?;
        w.write_u32::<LittleEndian>(header_u32(compressed_size))?;
        w.write_u32::<LittleEndian>(header_u32(uncompressed_size))?;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_u16::<LittleEndian>(extra.len() as u16)?;
        w.write_all(name.as_bytes())?;
        w.write_all(&extra)?;
        w.write_all(&packed)?;

        let header_offset = self.offset;
        self.offset += LOCAL_FILE_HEADER_SIZE + name.len() as u64 + extra.len() as u64 + compressed_size;
        self.names.insert(name.to_string());
        self.entries.push(EntryMeta {
            name: name.to_string(),
            method,
            crc32,
            compressed_size,
            uncompressed_size,
            header_offset,
        });

        tracing::trace!(name, method, stored = compressed_size, plain = uncompressed_size, zip64, "container entry written");
        Ok(compressed_size)
    }

    /// Writes the central directory and end record, flushes, and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        let cd_offset = self.offset;
        let mut cd_size: u64 = 0;

        let w = &mut self.sink;
        for e in &self.entries {
            cd_size += write_central_header(w, e, self.dos_time, self.dos_date)?;
        }

        let count = self.entries.len() as u64;
        let zip64 = count >= ZIP64_SENTINEL_U16 as u64 || needs_zip64(cd_size) || needs_zip64(cd_offset);
        let mut total = cd_offset + cd_size;
        if zip64 {
            let record_offset = total;
            w.write_u32::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
            // Size of the remaining record, excluding the signature and this field.
            w.write_u64::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE - 12)?;
            w.write_u16::<LittleEndian>(VERSION_ZIP64)?; // version made by
            w.write_u16::<LittleEndian>(VERSION_ZIP64)?;
            w.write_u32::<LittleEndian>(0)?; // this disk
            w.write_u32::<LittleEndian>(0)?; // disk with central directory
            w.write_u64::<LittleEndian>(count)?;
            w.write_u64::<LittleEndian>(count)?;
            w.write_u64::<LittleEndian>(cd_size)?;
            w.write_u64::<LittleEndian>(cd_offset)?;

            w.write_u32::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE)?;
            w.write_u32::<LittleEndian>(0)?; // disk with the ZIP64 end record
            w.write_u64::<LittleEndian>(record_offset)?;
            w.write_u32::<LittleEndian>(1)?; // total disks
            total += ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE + ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE;
        }

        let count16 = count.min(ZIP64_SENTINEL_U16 as u64) as u16;
        w.write_u32::<LittleEndian>(END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        w.write_u16::<LittleEndian>(0)?; // this disk
        w.write_u16::<LittleEndian>(0)?; // disk with central directory
        w.write_u16::<LittleEndian>(count16)?;
        w.write_u16::<LittleEndian>(count16)?;
        w.write_u32::<LittleEndian>(header_u32(cd_size))?;
        w.write_u32::<LittleEndian>(header_u32(cd_offset))?;
        w.write_u16::<LittleEndian>(0)?; // comment length
        w.flush()?;

        total += END_OF_CENTRAL_DIRECTORY_SIZE;
        tracing::debug!(entries = count, bytes = total, zip64, "container sealed");
        Ok(self.sink)
    }
}

/// Writes one central directory header. Sizes and the offset that do not fit
/// 32 bits go, in that order, into a ZIP64 extra field. Returns the bytes written.
pub(super) fn write_central_header<W: Write>(w: &mut W, e: &EntryMeta, dos_time: u16, dos_date: u16) -> Result<u64> {
    let mut extra = Vec::new();
    for value in [e.uncompressed_size, e.compressed_size, e.header_offset] {
        if needs_zip64(value) {
            extra.write_u64::<LittleEndian>(value)?;
        }
    }
    let zip64 = !extra.is_empty();
    if zip64 {
        let mut field = Vec::with_capacity(4 + extra.len());
        field.write_u16::<LittleEndian>(ZIP64_EXTRA_FIELD_ID)?;
        field.write_u16::<LittleEndian>(extra.len() as u16)?;
        field.extend_from_slice(&extra);
        extra = field;
    }
    let version = if zip64 { VERSION_ZIP64 } else { VERSION_NEEDED };

    w.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_HEADER_SIGNATURE)?;
    w.write_u16::<LittleEndian>(version)?; // version made by
    w.write_u16::<LittleEndian>(version)?;
    w.write_u16::<LittleEndian>(FLAG_UTF8)?;
    w.write_u16::<LittleEndian>(e.method)?;
    w.write_u16::<LittleEndian>(dos_time)?;
    w.write_u16::<LittleEndian>(dos_date)?;
    w.write_u32::<LittleEndian>(e.crc32)?;
    w.write_u32::<LittleEndian>(header_u32(e.compressed_size))?;
    w.write_u32::<LittleEndian>(header_u32(e.uncompressed_size))?;
    w.write_u16::<LittleEndian>(e.name.len() as u16)?;
    w.write_u16::<LittleEndian>(extra.len() as u16)?;
    w.write_u16::<LittleEndian>(0)?; // comment length
    w.write_u16::<LittleEndian>(0)?; // disk number start
    w.write_u16::<LittleEndian>(0)?; // internal attributes
    w.write_u32::<LittleEndian>(0)?; // external attributes
    w.write_u32::<LittleEndian>(header_u32(e.header_offset))?;
    w.write_all(e.name.as_bytes())?;
    w.write_all(&extra)?;
    Ok(CENTRAL_DIRECTORY_HEADER_SIZE + e.name.len() as u64 + extra.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerReader;
    use std::io::Cursor;

    #[test]
    fn test_empty_container_is_just_an_end_record() -> Result<()> {
        let bytes = ContainerWriter::new(Vec::new()).finish()?;
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], &END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        Ok(())
    }

    #[test]
    fn test_duplicate_name_is_rejected() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("a", STORED, b"1")?;
        match w.add_entry("a", STORED, b"2") {
            Err(PkzError::DuplicateEntry(name)) => assert_eq!(name, "a"),
            other => panic!("expected DuplicateEntry, got {:?}", other),
        }
        assert_eq!(w.entry_count(), 1);
        Ok(())
    }

    #[test]
    fn test_unregistered_method_is_rejected() {
        let mut w = ContainerWriter::new(Vec::new());
        let err = w.add_entry("x", 0x4242, b"data").unwrap_err();
        assert!(matches!(err, PkzError::UnsupportedMethod { method: 0x4242, .. }));
        assert!(!w.contains("x"));
    }

    #[test]
    fn test_more_than_65535_entries_use_zip64_end_record() -> Result<()> {
        let total = 70_000usize;
        let mut w = ContainerWriter::new(Vec::new());
        for i in 0..total {
            w.add_entry(&format!("e{}", i), STORED, &[(i % 251) as u8])?;
        }
        let bytes = w.finish()?;

        // The classic end record carries the sentinel count; the ZIP64 locator sits right before it.
        let eocd = bytes.len() - END_OF_CENTRAL_DIRECTORY_SIZE as usize;
        assert_eq!(&bytes[eocd + 8..eocd + 10], &ZIP64_SENTINEL_U16.to_le_bytes());
        let locator = eocd - ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE as usize;
        assert_eq!(&bytes[locator..locator + 4], &ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE.to_le_bytes());

        let mut r = ContainerReader::new(Cursor::new(bytes))?;
        assert_eq!(r.len(), total);
        assert_eq!(r.read("e0")?, vec![0]);
        assert_eq!(r.read("e65535")?, vec![(65535 % 251) as u8]);
        assert_eq!(r.read("e69999")?, vec![(69999 % 251) as u8]);
        Ok(())
    }

    #[test]
    fn test_small_containers_have_no_zip64_records() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("a", STORED, b"abc")?;
        let bytes = w.finish()?;
        // local header + name + data, one central header + name, end record
        assert_eq!(bytes.len(), 30 + 1 + 3 + 46 + 1 + 22);
        Ok(())
    }

    #[test]
    fn test_builtin_methods_read_back() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("stored.txt", STORED, b"plain bytes")?;
        w.add_entry("deflated.txt", DEFLATED, &[7u8; 4096])?;
        let bytes = w.finish()?;

        let mut r = ContainerReader::new(Cursor::new(bytes))?;
        assert_eq!(r.read("stored.txt")?, b"plain bytes");
        assert_eq!(r.read("deflated.txt")?, vec![7u8; 4096]);
        let meta = r.entry("deflated.txt").unwrap();
        assert!(meta.compressed_size < meta.uncompressed_size);
        Ok(())
    }
}
