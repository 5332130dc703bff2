use std::io::{Cursor, Read, Write};

use flate2::Compression;
use pkz::codec::{obfuscate_in_place, ObfuscatedMethod, ObfuscatedReader, ObfuscatedWriter, OBFUSCATED_METHOD};
use pkz::container::{ContainerReader, ContainerWriter, Compressor, DEFLATED, STORED};
use rand::{thread_rng, Rng};

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    thread_rng().fill(&mut buf[..]);
    buf
}

#[test]
fn obfuscation_is_an_involution() {
    for len in [0usize, 1, 2, 255, 4096, 100_000] {
        let original = random_bytes(len);
        let mut data = original.clone();
        obfuscate_in_place(&mut data);
        if len > 0 {
            assert_ne!(data, original);
        }
        obfuscate_in_place(&mut data);
        assert_eq!(data, original);
    }
}

#[test]
fn stream_pair_roundtrip_in_small_writes() -> Result<(), Box<dyn std::error::Error>> {
    let original = random_bytes(70_000);
    let mut w = ObfuscatedWriter::new(Vec::new(), Compression::fast());
    for chunk in original.chunks(333) {
        w.write_all(chunk)?;
    }
    let packed = w.finish()?;

    // Read back through a tiny buffer to exercise partial reads.
    let mut r = ObfuscatedReader::new(Cursor::new(packed));
    let mut out = Vec::new();
    let mut buf = [0u8; 17];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, original);
    Ok(())
}

#[test]
fn empty_and_single_byte_entries() -> Result<(), Box<dyn std::error::Error>> {
    let mut w = ContainerWriter::new(Vec::new());
    w.register_compressor(OBFUSCATED_METHOD, Box::new(ObfuscatedMethod::default()));
    w.add_entry("empty", OBFUSCATED_METHOD, b"")?;
    w.add_entry("one", OBFUSCATED_METHOD, &[0xAA])?;
    let bytes = w.finish()?;

    let mut r = ContainerReader::new(Cursor::new(bytes))?;
    r.register_decompressor(OBFUSCATED_METHOD, Box::new(ObfuscatedMethod::default()));
    assert_eq!(r.read("empty")?, Vec::<u8>::new());
    assert_eq!(r.read("one")?, vec![0xAA]);
    Ok(())
}

#[test]
fn obfuscated_entries_need_the_codec_to_read() -> Result<(), Box<dyn std::error::Error>> {
    let payload = b"the quick brown fox jumps over the lazy dog".repeat(20);
    let mut w = ContainerWriter::new(Vec::new());
    w.register_compressor(OBFUSCATED_METHOD, Box::new(ObfuscatedMethod::new(6)));
    w.add_entry("fox", OBFUSCATED_METHOD, &payload)?;
    let bytes = w.finish()?;

    let mut r = ContainerReader::new(Cursor::new(bytes.clone()))?;
    assert!(r.read("fox").is_err(), "method 0xAA is not built in");

    // Decoding as plain deflate yields the wrong bytes and fails the CRC check.
    let mut r = ContainerReader::new(Cursor::new(bytes))?;
    r.register_decompressor(OBFUSCATED_METHOD, Box::new(pkz::container::Deflated::default()));
    assert!(matches!(r.read("fox"), Err(pkz::PkzError::CrcMismatch { .. })));
    Ok(())
}

#[test]
fn method_ids_are_distinct() {
    assert_ne!(OBFUSCATED_METHOD, STORED);
    assert_ne!(OBFUSCATED_METHOD, DEFLATED);
}

#[test]
fn payload_is_not_visible_in_container() -> Result<(), Box<dyn std::error::Error>> {
    let secret = b"PLAINTEXT-MARKER-PLAINTEXT-MARKER".to_vec();
    let packed = ObfuscatedMethod::new(0).compress(&secret)?;
    // Level 0 emits stored deflate blocks, so without XOR the marker would show up verbatim.
    assert!(!packed.windows(secret.len()).any(|w| w == &secret[..]));
    Ok(())
}
