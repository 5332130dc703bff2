//! The data-source contract the archive writer pulls from.
//!
//! The writer never enumerates anything itself. It asks the [`Fetcher`] for a
//! count, then for each item's metadata by index, then for that item's binary
//! assets, descending depth-first. Every call after `comic_info` receives the
//! index and metadata of all ancestors as [`Node`] values, so a fetcher can stay
//! stateless.
//!
//! Binary calls return `Ok(None)` for "no asset"; the writer leaves the matching
//! path empty. Any `Err` aborts the whole write.

use crate::error::BoxError;
use crate::model::{ArchiveInfo, ChapterInfo, ComicInfo, PictureInfo, VolumeInfo};

/// An already-fetched ancestor: its position among its siblings and its metadata.
#[derive(Debug)]
pub struct Node<'a, T> {
    pub idx: usize,
    pub info: &'a T,
}

impl<'a, T> Node<'a, T> {
    pub fn new(idx: usize, info: &'a T) -> Self {
        Self { idx, info }
    }
}

impl<T> Clone for Node<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Node<'_, T> {}

/// Asset bytes, or `None` when the item has no such asset.
pub type Asset = Option<Vec<u8>>;

/// Supplies archive metadata and assets on demand.
///
/// Calls arrive strictly in traversal order from a single thread.
pub trait Fetcher {
    /// Error returned by any call. It is boxed into [`PkzError::Fetch`](crate::PkzError::Fetch).
    type Error: Into<BoxError>;

    fn archive_info(&self) -> Result<ArchiveInfo, Self::Error>;

    fn archive_cover(&self) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn archive_author_avatar(&self) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn comic_count(&self) -> Result<usize, Self::Error>;

    fn comic_info(&self, comic_idx: usize) -> Result<ComicInfo, Self::Error>;

    fn comic_cover(&self, _comic: Node<'_, ComicInfo>) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn comic_author_avatar(&self, _comic: Node<'_, ComicInfo>) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn volume_count(&self, comic: Node<'_, ComicInfo>) -> Result<usize, Self::Error>;

    fn volume_info(&self, comic: Node<'_, ComicInfo>, volume_idx: usize) -> Result<VolumeInfo, Self::Error>;

    fn volume_cover(
        &self,
        _comic: Node<'_, ComicInfo>,
        _volume: Node<'_, VolumeInfo>,
    ) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn chapter_count(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>) -> Result<usize, Self::Error>;

    fn chapter_info(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter_idx: usize,
    ) -> Result<ChapterInfo, Self::Error>;

    fn chapter_cover(
        &self,
        _comic: Node<'_, ComicInfo>,
        _volume: Node<'_, VolumeInfo>,
        _chapter: Node<'_, ChapterInfo>,
    ) -> Result<Asset, Self::Error> {
        Ok(None)
    }

    fn picture_count(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
    ) -> Result<usize, Self::Error>;

    fn picture_info(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture_idx: usize,
    ) -> Result<PictureInfo, Self::Error>;

    fn picture_data(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture: Node<'_, PictureInfo>,
    ) -> Result<Asset, Self::Error>;
}
