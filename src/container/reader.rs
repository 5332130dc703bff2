use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::{
    Decompressor, Deflated, EntryMeta, Stored, CENTRAL_DIRECTORY_HEADER_SIGNATURE, CENTRAL_DIRECTORY_HEADER_SIZE,
    DEFLATED, END_OF_CENTRAL_DIRECTORY_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIZE, LOCAL_FILE_HEADER_SIGNATURE,
    LOCAL_FILE_HEADER_SIZE, STORED, ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE, ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE, ZIP64_EXTRA_FIELD_ID, ZIP64_SENTINEL_U16, ZIP64_SENTINEL_U32,
};
use crate::error::{PkzError, Result};

/// Largest possible trailing archive comment.
const MAX_COMMENT_LEN: u64 = u16::MAX as u64;

/// Upper bound for buffers pre-sized from header fields; they grow past it as data arrives.
const MAX_PREALLOC: u64 = 1 << 20;

/// A random-access reader over a ZIP-compatible container.
///
/// The central directory is loaded once on construction; individual entries are
/// decoded on demand with the decompressor registered for their method id.
pub struct ContainerReader<R: Read + Seek> {
    source: R,
    entries: Vec<EntryMeta>,
    by_name: HashMap<String, usize>,
    decompressors: HashMap<u16, Box<dyn Decompressor>>,
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Parses the end record and central directory of `source`.
    pub fn new(mut source: R) -> Result<Self> {
        let (cd_offset, cd_size, count) = read_end_record(&mut source)?;

        source.seek(SeekFrom::Start(cd_offset))?;
        let mut cd = vec![0u8; cd_size as usize];
        source.read_exact(&mut cd)?;

        let mut cur = &cd[..];
        // Every header takes at least 46 bytes, which bounds a bogus count.
        let capacity = count.min(cd.len() / CENTRAL_DIRECTORY_HEADER_SIZE as usize);
        let mut entries = Vec::with_capacity(capacity);
        let mut by_name = HashMap::with_capacity(capacity);
        for _ in 0..count {
            let meta = parse_central_header(&mut cur)?;
            by_name.insert(meta.name.clone(), entries.len());
            entries.push(meta);
        }

        let mut decompressors: HashMap<u16, Box<dyn Decompressor>> = HashMap::new();
        decompressors.insert(STORED, Box::new(Stored));
        decompressors.insert(DEFLATED, Box::new(Deflated::default()));

        tracing::trace!(entries = entries.len(), "container opened");
        Ok(Self { source, entries, by_name, decompressors })
    }

    /// Registers (or replaces) the decompressor used for `method`.
    pub fn register_decompressor(&mut self, method: u16, decompressor: Box<dyn Decompressor>) {
        self.decompressors.insert(method, decompressor);
    }

    /// Entry names in central directory order.
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[EntryMeta] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn entry(&self, name: &str) -> Option<&EntryMeta> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    /// Reads and fully decodes one entry, verifying its CRC-32.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let meta = self
            .entry(name)
            .cloned()
            .ok_or_else(|| PkzError::EntryNotFound(name.to_string()))?;
        let decompressor = self
            .decompressors
            .get(&meta.method)
            .ok_or_else(|| PkzError::UnsupportedMethod { method: meta.method, name: meta.name.clone() })?;

        self.source.seek(SeekFrom::Start(meta.header_offset))?;
        let mut header = [0u8; LOCAL_FILE_HEADER_SIZE as usize];
        self.source.read_exact(&mut header)?;
        let mut cur = &header[..];
        if cur.read_u32::<LittleEndian>()? != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(PkzError::InvalidContainer(format!("bad local header signature for '{}'", meta.name)));
        }
        // Name and extra lengths live at the end of the fixed header.
        let mut tail = &header[26..];
        let name_len = tail.read_u16::<LittleEndian>()? as i64;
        let extra_len = tail.read_u16::<LittleEndian>()? as i64;
        self.source.seek(SeekFrom::Current(name_len + extra_len))?;

        let raw: Box<dyn Read + '_> = Box::new((&mut self.source).take(meta.compressed_size));
        let mut decoded = decompressor.decompress(raw);
        let mut out = Vec::with_capacity(meta.uncompressed_size.min(MAX_PREALLOC) as usize);
        decoded.read_to_end(&mut out)?;

        let actual = crc32fast::hash(&out);
        if actual != meta.crc32 {
            return Err(PkzError::CrcMismatch { name: meta.name, expected: meta.crc32, actual });
        }
        Ok(out)
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

/// Locates the end-of-central-directory record, following the ZIP64 locator when
/// the classic record holds sentinels, and returns
/// `(central directory offset, central directory size, entry count)`.
fn read_end_record<R: Read + Seek>(source: &mut R) -> Result<(u64, u64, usize)> {
    let len = source.seek(SeekFrom::End(0))?;
    if len < END_OF_CENTRAL_DIRECTORY_SIZE {
        return Err(PkzError::InvalidContainer("file too small".into()));
    }
    let window = len.min(END_OF_CENTRAL_DIRECTORY_SIZE + MAX_COMMENT_LEN);
    source.seek(SeekFrom::Start(len - window))?;
    let mut tail = vec![0u8; window as usize];
    source.read_exact(&mut tail)?;

    let sig = END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes();
    let last = tail.len() - END_OF_CENTRAL_DIRECTORY_SIZE as usize;
    let pos = (0..=last)
        .rev()
        .find(|&i| {
            if tail[i..i + 4] != sig {
                return false;
            }
            let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
            i + END_OF_CENTRAL_DIRECTORY_SIZE as usize + comment_len == tail.len()
        })
        .ok_or_else(|| PkzError::InvalidContainer("end of central directory not found".into()))?;

    let mut cur = &tail[pos + 4..];
    let _disk = cur.read_u16::<LittleEndian>()?;
    let _cd_disk = cur.read_u16::<LittleEndian>()?;
    let _on_disk = cur.read_u16::<LittleEndian>()?;
    let count16 = cur.read_u16::<LittleEndian>()?;
    let cd_size32 = cur.read_u32::<LittleEndian>()?;
    let cd_offset32 = cur.read_u32::<LittleEndian>()?;

    let eocd_offset = len - window + pos as u64;
    let (mut count, mut cd_size, mut cd_offset) = (count16 as u64, cd_size32 as u64, cd_offset32 as u64);
    let mut directory_end = eocd_offset;
    if count16 == ZIP64_SENTINEL_U16 || cd_size32 == ZIP64_SENTINEL_U32 || cd_offset32 == ZIP64_SENTINEL_U32 {
        if let Some(record) = read_zip64_end_record(source, eocd_offset)? {
            directory_end = record.offset;
            count = record.count;
            cd_size = record.cd_size;
            cd_offset = record.cd_offset;
        }
    }

    match cd_offset.checked_add(cd_size) {
        Some(end) if end <= directory_end => {}
        _ => return Err(PkzError::InvalidContainer("central directory overlaps end record".into())),
    }
    let count = usize::try_from(count)
        .map_err(|_| PkzError::InvalidContainer(format!("entry count {} is out of range", count)))?;
    Ok((cd_offset, cd_size, count))
}

/// Fields of the ZIP64 end-of-central-directory record.
struct Zip64EndRecord {
    offset: u64,
    count: u64,
    cd_size: u64,
    cd_offset: u64,
}

/// Reads the ZIP64 locator right before the classic end record at `eocd_offset`
/// and the ZIP64 end record it points at. `None` when there is no locator.
fn read_zip64_end_record<R: Read + Seek>(source: &mut R, eocd_offset: u64) -> Result<Option<Zip64EndRecord>> {
    let Some(locator_offset) = eocd_offset.checked_sub(ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE) else {
        return Ok(None);
    };
    source.seek(SeekFrom::Start(locator_offset))?;
    let mut locator = [0u8; ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIZE as usize];
    source.read_exact(&mut locator)?;
    let mut cur = &locator[..];
    if cur.read_u32::<LittleEndian>()? != ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let _disk = cur.read_u32::<LittleEndian>()?;
    let offset = cur.read_u64::<LittleEndian>()?;

    match offset.checked_add(ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE) {
        Some(end) if end <= locator_offset => {}
        _ => return Err(PkzError::InvalidContainer("ZIP64 end record out of range".into())),
    }
    source.seek(SeekFrom::Start(offset))?;
    let mut record = [0u8; ZIP64_END_OF_CENTRAL_DIRECTORY_SIZE as usize];
    source.read_exact(&mut record)?;
    let mut cur = &record[..];
    if cur.read_u32::<LittleEndian>()? != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(PkzError::InvalidContainer("bad ZIP64 end record signature".into()));
    }
    let _record_size = cur.read_u64::<LittleEndian>()?;
    let _made_by = cur.read_u16::<LittleEndian>()?;
    let _needed = cur.read_u16::<LittleEndian>()?;
    let _disk = cur.read_u32::<LittleEndian>()?;
    let _cd_disk = cur.read_u32::<LittleEndian>()?;
    let _on_disk = cur.read_u64::<LittleEndian>()?;
    let count = cur.read_u64::<LittleEndian>()?;
    let cd_size = cur.read_u64::<LittleEndian>()?;
    let cd_offset = cur.read_u64::<LittleEndian>()?;
    Ok(Some(Zip64EndRecord { offset, count, cd_size, cd_offset }))
}

pub(super) fn parse_central_header(cur: &mut &[u8]) -> Result<EntryMeta> {
    let truncated = |_| PkzError::InvalidContainer("truncated central directory".into());
    if cur.read_u32::<LittleEndian>().map_err(truncated)? != CENTRAL_DIRECTORY_HEADER_SIGNATURE {
        return Err(PkzError::InvalidContainer("bad central directory signature".into()));
    }
    let mut fixed = [0u8; 42];
    cur.read_exact(&mut fixed).map_err(truncated)?;
    let mut f = &fixed[..];
    let _made_by = f.read_u16::<LittleEndian>()?;
    let _needed = f.read_u16::<LittleEndian>()?;
    let _flags = f.read_u16::<LittleEndian>()?;
    let method = f.read_u16::<LittleEndian>()?;
    let _time = f.read_u16::<LittleEndian>()?;
    let _date = f.read_u16::<LittleEndian>()?;
    let crc32 = f.read_u32::<LittleEndian>()?;
    let mut compressed_size = f.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = f.read_u32::<LittleEndian>()? as u64;
    let name_len = f.read_u16::<LittleEndian>()? as usize;
    let extra_len = f.read_u16::<LittleEndian>()? as usize;
    let comment_len = f.read_u16::<LittleEndian>()? as usize;
    let _disk_start = f.read_u16::<LittleEndian>()?;
    let _internal = f.read_u16::<LittleEndian>()?;
    let _external = f.read_u32::<LittleEndian>()?;
    let mut header_offset = f.read_u32::<LittleEndian>()? as u64;

    let variable = name_len + extra_len + comment_len;
    if cur.len() < variable {
        return Err(PkzError::InvalidContainer("truncated central directory".into()));
    }
    let name = String::from_utf8_lossy(&cur[..name_len]).into_owned();
    let extra = &cur[name_len..name_len + extra_len];
    apply_zip64_extra(extra, [&mut uncompressed_size, &mut compressed_size, &mut header_offset])?;
    *cur = &cur[variable..];

    Ok(EntryMeta { name, method, crc32, compressed_size, uncompressed_size, header_offset })
}

/// Replaces sentinel values with the 64-bit ones from a ZIP64 extra field.
/// `values` are the uncompressed size, compressed size and header offset, the
/// order in which the field stores whichever of them overflowed.
fn apply_zip64_extra(extra: &[u8], values: [&mut u64; 3]) -> Result<()> {
    let Some(mut field) = find_extra_field(extra, ZIP64_EXTRA_FIELD_ID)? else {
        return Ok(());
    };
    for value in values {
        if *value == ZIP64_SENTINEL_U32 as u64 {
            *value = field
                .read_u64::<LittleEndian>()
                .map_err(|_| PkzError::InvalidContainer("short ZIP64 extra field".into()))?;
        }
    }
    Ok(())
}

/// Payload of the first extra field with header id `wanted`.
fn find_extra_field(mut extra: &[u8], wanted: u16) -> Result<Option<&[u8]>> {
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let size = u16::from_le_bytes([extra[2], extra[3]]) as usize;
        extra = &extra[4..];
        if extra.len() < size {
            return Err(PkzError::InvalidContainer("truncated extra field".into()));
        }
        if id == wanted {
            return Ok(Some(&extra[..size]));
        }
        extra = &extra[size..];
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use std::io::Cursor;

    #[test]
    fn test_garbage_is_not_a_container() {
        let err = ContainerReader::new(Cursor::new(vec![0u8; 64])).err().unwrap();
        assert!(matches!(err, PkzError::InvalidContainer(_)));

        let err = ContainerReader::new(Cursor::new(vec![1u8, 2, 3])).err().unwrap();
        assert!(matches!(err, PkzError::InvalidContainer(_)));
    }

    #[test]
    fn test_missing_entry() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("present", STORED, b"x")?;
        let mut r = ContainerReader::new(Cursor::new(w.finish()?))?;
        assert!(r.contains("present"));
        assert!(matches!(r.read("absent"), Err(PkzError::EntryNotFound(n)) if n == "absent"));
        Ok(())
    }

    #[test]
    fn test_corrupted_payload_fails_crc() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("e", STORED, b"abcdef")?;
        let mut bytes = w.finish()?;
        // Stored payload begins right after the 30-byte header and the 1-byte name.
        bytes[31] ^= 0xff;
        let mut r = ContainerReader::new(Cursor::new(bytes))?;
        assert!(matches!(r.read("e"), Err(PkzError::CrcMismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_central_header_follows_zip64_extra_field() -> Result<()> {
        let meta = EntryMeta {
            name: "big".into(),
            method: STORED,
            crc32: 0xDEADBEEF,
            compressed_size: 5 << 32,
            uncompressed_size: 7 << 32,
            header_offset: 0x1234,
        };
        let mut header = Vec::new();
        let written = crate::container::writer::write_central_header(&mut header, &meta, 0, 0)?;
        assert_eq!(written as usize, header.len());

        let mut cur = &header[..];
        assert_eq!(parse_central_header(&mut cur)?, meta);
        assert!(cur.is_empty());

        let far = EntryMeta { header_offset: 9 << 32, compressed_size: 10, uncompressed_size: 20, ..meta };
        header.clear();
        crate::container::writer::write_central_header(&mut header, &far, 0, 0)?;
        assert_eq!(parse_central_header(&mut &header[..])?, far);
        Ok(())
    }

    #[test]
    fn test_forged_uncompressed_size_is_not_trusted() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.add_entry("e", STORED, b"abc")?;
        let mut bytes = w.finish()?;
        // Central header follows the 30-byte local header, the name and the data;
        // its uncompressed size field sits 24 bytes in.
        let field = 30 + 1 + 3 + 24;
        bytes[field..field + 4].copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());

        let mut r = ContainerReader::new(Cursor::new(bytes))?;
        assert_eq!(r.entry("e").map(|m| m.uncompressed_size), Some(0xFFFF_FFF0));
        assert_eq!(r.read("e")?, b"abc");
        Ok(())
    }

    #[test]
    fn test_oversized_entry_count_is_rejected() {
        // A classic end record claiming entries that the central directory cannot hold.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&500u16.to_le_bytes());
        bytes.extend_from_slice(&500u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]);
        let err = ContainerReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(matches!(err, PkzError::InvalidContainer(_)));
    }

    #[test]
    fn test_unknown_method_needs_registration() -> Result<()> {
        let mut w = ContainerWriter::new(Vec::new());
        w.register_compressor(0x77, Box::new(Stored));
        w.add_entry("custom", 0x77, b"payload")?;
        let bytes = w.finish()?;

        let mut r = ContainerReader::new(Cursor::new(bytes))?;
        assert!(matches!(r.read("custom"), Err(PkzError::UnsupportedMethod { method: 0x77, .. })));
        r.register_decompressor(0x77, Box::new(Stored));
        assert_eq!(r.read("custom")?, b"payload");
        Ok(())
    }
}
