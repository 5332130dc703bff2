//! # PKZ Core Library
//!
//! PKZ packs a comic collection (archive → comics → volumes → chapters →
//! pictures) into one ZIP-compatible file. Every stored entry is deflated and
//! scrambled with a fixed-key XOR; the tree itself is a JSON index stored under
//! the entry name [`INDEX_ENTRY`].
//!
//! ## Key Modules
//!
//! - [`codec`]: the obfuscation byte transform and its deflate stream pair.
//! - [`container`]: the ZIP container engine with pluggable compression methods.
//! - [`model`]: the archive tree and its JSON wire format.
//! - [`fetcher`]: the data-source trait the writer pulls from.
//! - [`writer`]: depth-first archive construction.
//! - [`reader`]: index and entry access on an existing container.
//! - [`dir_fetcher`]: a fetcher that serves a comic tree from disk.
//!
//! ## Examples
//!
//! ```no_run
//! use std::path::Path;
//!
//! let fetcher = pkz::DirectoryFetcher::open(Path::new("comics/"))?;
//! let opts = pkz::WriteOptions::default();
//! pkz::write_archive_file(Path::new("comics.pkz"), &fetcher, &opts, None)?;
//!
//! let archive = pkz::read_archive_index(Path::new("comics.pkz"))?;
//! let first = &archive.comics[0].volumes[0].chapters[0].pictures[0];
//! let _bytes = pkz::read_entry(Path::new("comics.pkz"), &first.picture_path)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cli;
pub mod cli_runner;
pub mod codec;
pub mod container;
pub mod dir_fetcher;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod progress;
pub mod reader;
pub mod writer;

pub use dir_fetcher::DirectoryFetcher;
pub use error::{PkzError, Result};
pub use fetcher::{Asset, Fetcher, Node};
pub use model::{Archive, ArchiveInfo, Chapter, ChapterInfo, Comic, ComicInfo, Picture, PictureInfo, Volume, VolumeInfo};
pub use reader::{read_archive_index, read_entry, PkzReader, VerifyReport};
pub use writer::{write_archive, write_archive_file, write_archive_with, WriteOptions};

/// Name of the entry holding the JSON index.
pub const INDEX_ENTRY: &str = "PKZ-INFO";
