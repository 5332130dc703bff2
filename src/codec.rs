//! # Obfuscation Codec
//!
//! Every entry written by this crate goes through a single-byte XOR scrambler
//! (key `170`) layered on top of raw deflate. XOR is its own inverse, so the same
//! byte transform serves both directions:
//!
//! - write side: `plain -> xor -> deflate -> container`
//! - read side:  `container -> inflate -> xor -> plain`
//!
//! This is not encryption. Anyone who knows the key byte can read the archive.
//! The pair is exposed to the container engine as [`ObfuscatedMethod`] under the
//! private method id [`OBFUSCATED_METHOD`].

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::container::{Compressor, Decompressor};

/// The fixed obfuscation key.
pub const KEY: u8 = 170;

/// Container method id for obfuscated-deflate entries.
/// Distinct from ZIP's stored (0) and deflated (8).
pub const OBFUSCATED_METHOD: u16 = 0xAA;

/// Scramble one byte.
#[inline]
pub fn obfuscate(b: u8) -> u8 {
    b ^ KEY
}

/// Unscramble one byte. Identical to [`obfuscate`].
#[inline]
pub fn deobfuscate(b: u8) -> u8 {
    obfuscate(b)
}

/// Apply the transform to a whole buffer.
pub fn obfuscate_in_place(buf: &mut [u8]) {
    for b in buf.iter_mut() {
        *b ^= KEY;
    }
}

/// Write-side stream: scrambles every byte, then feeds it to a deflate encoder.
pub struct ObfuscatedWriter<W: Write> {
    inner: DeflateEncoder<W>,
    scratch: Vec<u8>,
}

impl<W: Write> ObfuscatedWriter<W> {
    pub fn new(sink: W, level: Compression) -> Self {
        Self {
            inner: DeflateEncoder::new(sink, level),
            scratch: Vec::new(),
        }
    }

    /// Flush the deflate stream and hand back the underlying sink.
    pub fn finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

impl<W: Write> Write for ObfuscatedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Callers keep ownership of `buf`, so scramble a copy.
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        obfuscate_in_place(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Read-side stream: inflates, then unscrambles every byte it hands out.
pub struct ObfuscatedReader<R: Read> {
    inner: DeflateDecoder<R>,
}

impl<R: Read> ObfuscatedReader<R> {
    pub fn new(source: R) -> Self {
        Self { inner: DeflateDecoder::new(source) }
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R: Read> Read for ObfuscatedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        obfuscate_in_place(&mut buf[..n]);
        Ok(n)
    }
}

/// The codec as a pluggable container compression method.
#[derive(Debug, Clone, Copy)]
pub struct ObfuscatedMethod {
    level: Compression,
}

impl ObfuscatedMethod {
    pub fn new(level: u32) -> Self {
        Self { level: Compression::new(level.min(9)) }
    }
}

impl Default for ObfuscatedMethod {
    fn default() -> Self {
        Self { level: Compression::best() }
    }
}

impl Compressor for ObfuscatedMethod {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut w = ObfuscatedWriter::new(Vec::with_capacity(data.len() / 2), self.level);
        w.write_all(data)?;
        w.finish()
    }
}

impl Decompressor for ObfuscatedMethod {
    fn decompress<'a>(&self, raw: Box<dyn Read + 'a>) -> Box<dyn Read + 'a> {
        Box::new(ObfuscatedReader::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_transform_is_involution() {
        for b in 0..=u8::MAX {
            assert_eq!(deobfuscate(obfuscate(b)), b);
        }
        assert_eq!(obfuscate(3), 3 ^ 170);
        assert_eq!(obfuscate(0), KEY);
    }

    #[test]
    fn test_buffer_transform_twice_restores_input() {
        let mut p = vec![1u8, 2, 3];
        obfuscate_in_place(&mut p);
        assert_eq!(p, vec![1 ^ 170, 2 ^ 170, 3 ^ 170]);
        obfuscate_in_place(&mut p);
        assert_eq!(p, vec![1, 2, 3]);

        let mut empty: Vec<u8> = Vec::new();
        obfuscate_in_place(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_stream_pair_restores_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let plain = b"PKZ stream pair test payload, repeated. PKZ stream pair test payload.".to_vec();
        let mut w = ObfuscatedWriter::new(Vec::new(), Compression::best());
        w.write_all(&plain)?;
        let packed = w.finish()?;

        let mut out = Vec::new();
        ObfuscatedReader::new(&packed[..]).read_to_end(&mut out)?;
        assert_eq!(out, plain);
        Ok(())
    }

    #[test]
    fn test_stream_is_not_plain_deflate() -> Result<(), Box<dyn std::error::Error>> {
        let plain = b"hello hello hello".to_vec();
        let packed = ObfuscatedMethod::default().compress(&plain)?;

        // Inflating without the XOR step yields scrambled bytes.
        let mut raw = Vec::new();
        DeflateDecoder::new(&packed[..]).read_to_end(&mut raw)?;
        assert_ne!(raw, plain);
        obfuscate_in_place(&mut raw);
        assert_eq!(raw, plain);
        Ok(())
    }
}
