//! # Archive Reader
//!
//! Opens a PKZ container, registers the obfuscation decompressor and gives
//! random access to the index and to any asset entry by its stored path.
//!
//! [`read_entry`] and [`read_archive_index`] are one-shot helpers that open and
//! close the file per call. [`PkzReader`] keeps the container open for callers
//! that fetch many assets.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use crate::codec::{ObfuscatedMethod, OBFUSCATED_METHOD};
use crate::container::{ContainerReader, EntryMeta};
use crate::error::{PkzError, Result};
use crate::model::Archive;
use crate::INDEX_ENTRY;

/// Reads one entry from the container at `path`, fully decoded.
pub fn read_entry(path: &Path, entry_name: &str) -> Result<Vec<u8>> {
    PkzReader::open(path)?.read_entry(entry_name)
}

/// Reads and parses the `PKZ-INFO` index of the container at `path`.
pub fn read_archive_index(path: &Path) -> Result<Archive> {
    PkzReader::open(path)?.index()
}

/// Result of [`PkzReader::verify`].
#[derive(Debug, Default, Clone)]
pub struct VerifyReport {
    /// Stored counters or `idx` values that disagree with the tree.
    pub count_issues: Vec<String>,
    /// Non-empty paths with no matching entry.
    pub missing_entries: Vec<String>,
    /// Entries that failed to decode (CRC or codec errors), with the error text.
    pub unreadable_entries: Vec<(String, String)>,
    /// Entries present in the container but referenced by nothing.
    pub orphan_entries: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.count_issues.is_empty()
            && self.missing_entries.is_empty()
            && self.unreadable_entries.is_empty()
            && self.orphan_entries.is_empty()
    }
}

/// An open PKZ container.
pub struct PkzReader<R: Read + Seek> {
    container: ContainerReader<R>,
}

impl PkzReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PkzError::io_at(e, path))?;
        let reader = Self::new(BufReader::new(file))?;
        tracing::debug!(path = %path.display(), entries = reader.len(), "container opened");
        Ok(reader)
    }
}

impl<R: Read + Seek> PkzReader<R> {
    pub fn new(source: R) -> Result<Self> {
        let mut container = ContainerReader::new(source)?;
        container.register_decompressor(OBFUSCATED_METHOD, Box::new(ObfuscatedMethod::default()));
        Ok(Self { container })
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.container.entry_names()
    }

    pub fn entries(&self) -> &[EntryMeta] {
        self.container.entries()
    }

    pub fn contains(&self, entry_name: &str) -> bool {
        self.container.contains(entry_name)
    }

    /// Reads one entry, fully de-obfuscated.
    pub fn read_entry(&mut self, entry_name: &str) -> Result<Vec<u8>> {
        self.container.read(entry_name)
    }

    /// Reads and parses the index entry.
    pub fn index(&mut self) -> Result<Archive> {
        let bytes = self.container.read(INDEX_ENTRY)?;
        Ok(Archive::from_json(&bytes)?)
    }

    /// Structural check of an index against this container.
    ///
    /// Decodes every referenced entry, so the cost is a full read of the file.
    pub fn verify(&mut self, archive: &Archive) -> VerifyReport {
        let mut report = VerifyReport { count_issues: archive.consistency_issues(), ..Default::default() };

        let referenced = archive.asset_paths();
        for path in &referenced {
            if !self.container.contains(path) {
                report.missing_entries.push(path.to_string());
                continue;
            }
            if let Err(e) = self.container.read(path) {
                report.unreadable_entries.push((path.to_string(), e.to_string()));
            }
        }

        let referenced: std::collections::HashSet<&str> = referenced.into_iter().collect();
        report.orphan_entries = self
            .container
            .entry_names()
            .filter(|n| *n != INDEX_ENTRY && !referenced.contains(n))
            .map(str::to_string)
            .collect();
        report
    }

    pub fn into_inner(self) -> R {
        self.container.into_inner()
    }
}
