//! # Archive Writer
//!
//! Packs a comic tree into a PKZ container. The tree is pulled from a
//! [`Fetcher`] depth-first, strictly in order:
//!
//! ```text
//! archive info, count, cover, avatar
//!   comic info, cover, avatar, volume count
//!     volume info, cover, chapter count
//!       chapter info, cover, picture count
//!         picture info, data
//! ```
//!
//! Every asset becomes one obfuscated entry under a fresh UUID v4 name. After
//! the whole tree is populated, the [`Archive`] is serialized as JSON into the
//! `PKZ-INFO` entry, which is always the last entry written.
//!
//! The first error from the fetcher or from the container aborts the pass. The
//! container is still sealed on the way out, but the output must be treated as
//! unusable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::codec::{ObfuscatedMethod, OBFUSCATED_METHOD};
use crate::container::{ContainerWriter, Deflated, DEFLATED};
use crate::error::{BoxError, PkzError, Result};
use crate::fetcher::{Asset, Fetcher, Node};
use crate::model::{Archive, Chapter, ChapterInfo, Comic, ComicInfo, Picture, Volume, VolumeInfo};
use crate::progress::ProgressTracker;
use crate::INDEX_ENTRY;

/// Knobs for a write pass.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Deflate level (0-9) for every entry.
    pub level: u32,
    /// Store the index with plain deflate instead of the obfuscated method.
    /// Readers accept both.
    pub plain_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { level: 9, plain_index: false }
    }
}

/// Writes a PKZ container to `output` using default options.
pub fn write_archive<W, F>(output: W, fetcher: &F) -> Result<Archive>
where
    W: Write,
    F: Fetcher + ?Sized,
{
    write_archive_with(output, fetcher, &WriteOptions::default(), None)
}

/// Creates (or truncates) `path` and writes a PKZ container into it.
pub fn write_archive_file<F>(
    path: &Path,
    fetcher: &F,
    options: &WriteOptions,
    progress: Option<&mut ProgressTracker>,
) -> Result<Archive>
where
    F: Fetcher + ?Sized,
{
    let file = File::create(path).map_err(|e| PkzError::io_at(e, path))?;
    // use 1 MiB buffer, entries are written header-then-payload in small pieces
    let writer = BufWriter::with_capacity(1024 * 1024, file);
    write_archive_with(writer, fetcher, options, progress)
}

/// Writes a PKZ container to `output`.
///
/// Returns the index that was stored, so callers do not need to read it back.
pub fn write_archive_with<W, F>(
    output: W,
    fetcher: &F,
    options: &WriteOptions,
    progress: Option<&mut ProgressTracker>,
) -> Result<Archive>
where
    W: Write,
    F: Fetcher + ?Sized,
{
    let mut container = ContainerWriter::new(output);
    container.register_compressor(OBFUSCATED_METHOD, Box::new(ObfuscatedMethod::new(options.level)));
    container.register_compressor(DEFLATED, Box::new(Deflated::new(options.level)));

    let mut pass = Pass { container, fetcher, progress };
    let outcome = pass.populate().and_then(|archive| {
        let method = if options.plain_index { DEFLATED } else { OBFUSCATED_METHOD };
        let index = archive.to_json()?;
        pass.container.add_entry(INDEX_ENTRY, method, &index)?;
        Ok(archive)
    });

    let Pass { container, progress, .. } = pass;
    match outcome {
        Ok(archive) => {
            let entries = container.entry_count();
            container.finish()?;
            if let Some(p) = progress {
                p.force_completion();
            }
            tracing::info!(
                comics = archive.comic_count,
                volumes = archive.volumes_count,
                chapters = archive.chapter_count,
                pictures = archive.picture_count,
                entries,
                "archive written"
            );
            Ok(archive)
        }
        Err(e) => {
            // Seal whatever was written; the caller discards it anyway.
            if let Err(close_err) = container.finish() {
                tracing::warn!(error = %close_err, "failed to close container after error");
            }
            Err(e)
        }
    }
}

/// Counts come from the fetcher, so reserve at most this many children up front.
const MAX_PREALLOC_CHILDREN: usize = 1024;

fn prealloc(count: usize) -> usize {
    count.min(MAX_PREALLOC_CHILDREN)
}

fn fetched<T, E: Into<BoxError>>(r: std::result::Result<T, E>) -> Result<T> {
    r.map_err(|e| PkzError::Fetch(e.into()))
}

/// State of one write pass.
struct Pass<'a, W: Write, F: Fetcher + ?Sized> {
    container: ContainerWriter<W>,
    fetcher: &'a F,
    progress: Option<&'a mut ProgressTracker>,
}

impl<W: Write, F: Fetcher + ?Sized> Pass<'_, W, F> {
    /// A UUID v4 name not yet used in this container.
    fn fresh_name(&self) -> String {
        loop {
            let name = uuid::Uuid::new_v4().to_string();
            if !self.container.contains(&name) {
                return name;
            }
        }
    }

    /// Stores one asset and returns its entry name; empty string when there is no asset.
    fn store(&mut self, asset: Asset, is_picture: bool) -> Result<String> {
        let data = match asset {
            Some(data) if !data.is_empty() => data,
            _ => return Ok(String::new()),
        };
        let name = self.fresh_name();
        let stored = self.container.add_entry(&name, OBFUSCATED_METHOD, &data)?;
        tracing::debug!(entry = %name, plain = data.len(), stored, "asset stored");
        if let Some(p) = self.progress.as_deref_mut() {
            p.record_entry(data.len() as u64, stored, is_picture);
        }
        Ok(name)
    }

    fn populate(&mut self) -> Result<Archive> {
        let f = self.fetcher;
        let info = fetched(f.archive_info())?;
        let comic_count = fetched(f.comic_count())?;
        tracing::debug!(name = %info.name, comic_count, "packing archive");
        if let Some(p) = self.progress.as_deref_mut() {
            p.set_total_comics(comic_count);
        }

        let mut archive = Archive::new(info);
        archive.comics = Vec::with_capacity(prealloc(comic_count));
        archive.cover_path = self.store(fetched(f.archive_cover())?, false)?;
        archive.author_avatar_path = self.store(fetched(f.archive_author_avatar())?, false)?;

        for comic_idx in 0..comic_count {
            let comic = self.comic(comic_idx)?;
            archive.comic_count += 1;
            archive.volumes_count += comic.volumes_count;
            archive.chapter_count += comic.chapter_count;
            archive.picture_count += comic.picture_count;
            archive.comics.push(comic);
            if let Some(p) = self.progress.as_deref_mut() {
                p.record_comic_completed();
            }
        }
        Ok(archive)
    }

    fn comic(&mut self, comic_idx: usize) -> Result<Comic> {
        let f = self.fetcher;
        let info = fetched(f.comic_info(comic_idx))?;
        tracing::debug!(comic = comic_idx, title = %info.title, "packing comic");

        let node = Node::new(comic_idx, &info);
        let cover_path = self.store(fetched(f.comic_cover(node))?, false)?;
        let author_avatar_path = self.store(fetched(f.comic_author_avatar(node))?, false)?;
        let volume_count = fetched(f.volume_count(node))?;

        let mut volumes = Vec::with_capacity(prealloc(volume_count));
        let (mut chapter_count, mut picture_count) = (0, 0);
        for volume_idx in 0..volume_count {
            let volume = self.volume(node, volume_idx)?;
            chapter_count += volume.chapter_count;
            picture_count += volume.picture_count;
            volumes.push(volume);
        }

        Ok(Comic {
            volumes_count: volumes.len(),
            info,
            cover_path,
            author_avatar_path,
            volumes,
            chapter_count,
            picture_count,
            idx: comic_idx,
        })
    }

    fn volume(&mut self, comic: Node<'_, ComicInfo>, volume_idx: usize) -> Result<Volume> {
        let f = self.fetcher;
        let info = fetched(f.volume_info(comic, volume_idx))?;
        let node = Node::new(volume_idx, &info);
        let cover_path = self.store(fetched(f.volume_cover(comic, node))?, false)?;
        let chapter_count = fetched(f.chapter_count(comic, node))?;

        let mut chapters = Vec::with_capacity(prealloc(chapter_count));
        let mut picture_count = 0;
        for chapter_idx in 0..chapter_count {
            let chapter = self.chapter(comic, node, chapter_idx)?;
            picture_count += chapter.picture_count;
            chapters.push(chapter);
        }

        Ok(Volume { chapter_count: chapters.len(), info, cover_path, chapters, picture_count, idx: volume_idx })
    }

    fn chapter(
        &mut self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter_idx: usize,
    ) -> Result<Chapter> {
        let f = self.fetcher;
        let info = fetched(f.chapter_info(comic, volume, chapter_idx))?;
        let node = Node::new(chapter_idx, &info);
        let cover_path = self.store(fetched(f.chapter_cover(comic, volume, node))?, false)?;
        let picture_count = fetched(f.picture_count(comic, volume, node))?;

        let mut pictures = Vec::with_capacity(prealloc(picture_count));
        for picture_idx in 0..picture_count {
            pictures.push(self.picture(comic, volume, node, picture_idx)?);
        }

        Ok(Chapter { picture_count: pictures.len(), info, cover_path, pictures, idx: chapter_idx })
    }

    fn picture(
        &mut self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture_idx: usize,
    ) -> Result<Picture> {
        let f = self.fetcher;
        let info = fetched(f.picture_info(comic, volume, chapter, picture_idx))?;
        let data = fetched(f.picture_data(comic, volume, chapter, Node::new(picture_idx, &info)))?;
        let picture_path = self.store(data, true)?;
        Ok(Picture { info, picture_path, idx: picture_idx })
    }
}
