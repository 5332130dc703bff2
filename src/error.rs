use std::path::PathBuf;

use thiserror::Error;

/// Boxed error type produced by [`Fetcher`](crate::fetcher::Fetcher) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type for all operations in the `pkz` crate.
#[derive(Error, Debug)]
pub enum PkzError {
    /// An I/O error occurred while reading or writing the container.
    /// Includes the path where the error happened (empty for in-memory streams).
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io { source: std::io::Error, path: PathBuf },

    /// A data-source callback failed. The whole write is aborted.
    #[error("fetcher error: {0}")]
    Fetch(#[source] BoxError),

    /// The archive index could not be serialized or parsed.
    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested entry does not exist in the container.
    #[error("entry not found in container: {0}")]
    EntryNotFound(String),

    /// No compressor or decompressor is registered for the entry's method id.
    #[error("unsupported compression method {method} for entry '{name}'")]
    UnsupportedMethod { method: u16, name: String },

    /// An entry with the same name was already written in this pass.
    #[error("duplicate entry name: {0}")]
    DuplicateEntry(String),

    /// Decoded entry bytes do not match the CRC-32 stored in the central directory.
    #[error("CRC mismatch for entry '{name}': expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { name: String, expected: u32, actual: u32 },

    /// The container structure is malformed (bad signature, truncated record).
    #[error("invalid container: {0}")]
    InvalidContainer(String),

    /// A value does not fit the container format, such as an entry name over 65535 bytes.
    #[error("container limit exceeded: {0}")]
    ContainerLimit(String),
}

impl PkzError {
    /// Attach a path to an I/O error.
    pub fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PkzError::Io { source, path: path.into() }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for PkzError {
    fn from(err: std::io::Error) -> Self {
        PkzError::Io { source: err, path: PathBuf::new() }
    }
}

pub type Result<T> = std::result::Result<T, PkzError>;
