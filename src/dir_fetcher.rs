//! A [`Fetcher`] backed by a directory tree.
//!
//! ```text
//! root/                  archive   (archive.json, cover.*, avatar.*)
//!   <comic>/             comic     (comic.json, cover.*, avatar.*)
//!     <volume>/          volume    (volume.json, cover.*)
//!       <chapter>/       chapter   (chapter.json, pictures.json, cover.*)
//!         001.jpg ...    pictures
//! ```
//!
//! `pictures.json` is an optional array of `PictureInfo` objects, one per
//! picture file in order. A picture with an entry there is served from it
//! verbatim; others get their title from the file stem and their size from the
//! image header.
//!
//! Sub-directories and pictures are ordered by natural file-name order
//! (`2.jpg` before `10.jpg`). The `*.json` files are optional and hold the
//! matching `*Info` object; without one, ids and titles come from the directory
//! name and timestamps from its modification time.
//!
//! The tree layout is scanned once on [`DirectoryFetcher::open`]. File contents
//! and picture dimensions are read lazily when the writer asks for them.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use walkdir::WalkDir;

use crate::fetcher::{Asset, Fetcher, Node};
use crate::model::{ArchiveInfo, ChapterInfo, ComicInfo, PictureInfo, VolumeInfo};

/// File extensions accepted as pictures and covers.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Per-chapter picture metadata file.
pub const PICTURES_FILE: &str = "pictures.json";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io { source: std::io::Error, path: PathBuf },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid metadata file '{}': {source}", .path.display())]
    Metadata { source: serde_json::Error, path: PathBuf },

    #[error("cannot read picture dimensions of '{}': {source}", .path.display())]
    Image { source: image::ImageError, path: PathBuf },

    #[error("index out of range: {0}")]
    OutOfRange(String),
}

#[derive(Debug)]
struct ChapterDir {
    info: ChapterInfo,
    cover: Option<PathBuf>,
    pictures: Vec<PathBuf>,
    picture_infos: Vec<PictureInfo>,
}

#[derive(Debug)]
struct VolumeDir {
    info: VolumeInfo,
    cover: Option<PathBuf>,
    chapters: Vec<ChapterDir>,
}

#[derive(Debug)]
struct ComicDir {
    info: ComicInfo,
    cover: Option<PathBuf>,
    avatar: Option<PathBuf>,
    volumes: Vec<VolumeDir>,
}

/// Serves an on-disk comic tree to the archive writer.
#[derive(Debug)]
pub struct DirectoryFetcher {
    root: PathBuf,
    info: ArchiveInfo,
    cover: Option<PathBuf>,
    avatar: Option<PathBuf>,
    comics: Vec<ComicDir>,
}

impl DirectoryFetcher {
    /// Scans the layout under `root`.
    pub fn open(root: &Path) -> Result<Self, DirectoryError> {
        let listing = Listing::read(root)?;
        let info = match read_json::<ArchiveInfo>(&root.join("archive.json"))? {
            Some(info) => info,
            None => ArchiveInfo { name: dir_name(root), ..Default::default() },
        };

        let mut comics = Vec::with_capacity(listing.dirs.len());
        for comic_dir in &listing.dirs {
            comics.push(scan_comic(comic_dir)?);
        }
        tracing::debug!(root = %root.display(), comics = comics.len(), "directory scanned");

        Ok(Self { root: root.to_path_buf(), info, cover: listing.cover, avatar: listing.avatar, comics })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn comic(&self, idx: usize) -> Result<&ComicDir, DirectoryError> {
        self.comics.get(idx).ok_or_else(|| DirectoryError::OutOfRange(format!("comic {}", idx)))
    }

    fn volume(&self, comic: usize, volume: usize) -> Result<&VolumeDir, DirectoryError> {
        self.comic(comic)?
            .volumes
            .get(volume)
            .ok_or_else(|| DirectoryError::OutOfRange(format!("comic {} volume {}", comic, volume)))
    }

    fn chapter(&self, comic: usize, volume: usize, chapter: usize) -> Result<&ChapterDir, DirectoryError> {
        self.volume(comic, volume)?
            .chapters
            .get(chapter)
            .ok_or_else(|| DirectoryError::OutOfRange(format!("comic {} volume {} chapter {}", comic, volume, chapter)))
    }

    fn picture(&self, comic: usize, volume: usize, chapter: usize, picture: usize) -> Result<&Path, DirectoryError> {
        self.chapter(comic, volume, chapter)?
            .pictures
            .get(picture)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                DirectoryError::OutOfRange(format!(
                    "comic {} volume {} chapter {} picture {}",
                    comic, volume, chapter, picture
                ))
            })
    }
}

impl Fetcher for DirectoryFetcher {
    type Error = DirectoryError;

    fn archive_info(&self) -> Result<ArchiveInfo, DirectoryError> {
        Ok(self.info.clone())
    }

    fn archive_cover(&self) -> Result<Asset, DirectoryError> {
        read_optional(self.cover.as_deref())
    }

    fn archive_author_avatar(&self) -> Result<Asset, DirectoryError> {
        read_optional(self.avatar.as_deref())
    }

    fn comic_count(&self) -> Result<usize, DirectoryError> {
        Ok(self.comics.len())
    }

    fn comic_info(&self, comic_idx: usize) -> Result<ComicInfo, DirectoryError> {
        Ok(self.comic(comic_idx)?.info.clone())
    }

    fn comic_cover(&self, comic: Node<'_, ComicInfo>) -> Result<Asset, DirectoryError> {
        read_optional(self.comic(comic.idx)?.cover.as_deref())
    }

    fn comic_author_avatar(&self, comic: Node<'_, ComicInfo>) -> Result<Asset, DirectoryError> {
        read_optional(self.comic(comic.idx)?.avatar.as_deref())
    }

    fn volume_count(&self, comic: Node<'_, ComicInfo>) -> Result<usize, DirectoryError> {
        Ok(self.comic(comic.idx)?.volumes.len())
    }

    fn volume_info(&self, comic: Node<'_, ComicInfo>, volume_idx: usize) -> Result<VolumeInfo, DirectoryError> {
        Ok(self.volume(comic.idx, volume_idx)?.info.clone())
    }

    fn volume_cover(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>) -> Result<Asset, DirectoryError> {
        read_optional(self.volume(comic.idx, volume.idx)?.cover.as_deref())
    }

    fn chapter_count(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>) -> Result<usize, DirectoryError> {
        Ok(self.volume(comic.idx, volume.idx)?.chapters.len())
    }

    fn chapter_info(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter_idx: usize,
    ) -> Result<ChapterInfo, DirectoryError> {
        Ok(self.chapter(comic.idx, volume.idx, chapter_idx)?.info.clone())
    }

    fn chapter_cover(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
    ) -> Result<Asset, DirectoryError> {
        read_optional(self.chapter(comic.idx, volume.idx, chapter.idx)?.cover.as_deref())
    }

    fn picture_count(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
    ) -> Result<usize, DirectoryError> {
        Ok(self.chapter(comic.idx, volume.idx, chapter.idx)?.pictures.len())
    }

    fn picture_info(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture_idx: usize,
    ) -> Result<PictureInfo, DirectoryError> {
        if let Some(info) = self.chapter(comic.idx, volume.idx, chapter.idx)?.picture_infos.get(picture_idx) {
            return Ok(info.clone());
        }
        let path = self.picture(comic.idx, volume.idx, chapter.idx, picture_idx)?;
        let (width, height) =
            image::image_dimensions(path).map_err(|source| DirectoryError::Image { source, path: path.to_path_buf() })?;
        let title = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(PictureInfo {
            id: format!("{}-{}", chapter.info.id, picture_idx),
            title,
            width,
            height,
            format: extension(path).unwrap_or_default(),
        })
    }

    fn picture_data(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture: Node<'_, PictureInfo>,
    ) -> Result<Asset, DirectoryError> {
        read_optional(Some(self.picture(comic.idx, volume.idx, chapter.idx, picture.idx)?))
    }
}

/// Immediate children of one directory, split by role.
struct Listing {
    dirs: Vec<PathBuf>,
    images: Vec<PathBuf>,
    cover: Option<PathBuf>,
    avatar: Option<PathBuf>,
}

impl Listing {
    fn read(dir: &Path) -> Result<Self, DirectoryError> {
        let mut listing = Listing { dirs: Vec::new(), images: Vec::new(), cover: None, avatar: None };
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by(|a, b| natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy()));
        for entry in walker {
            let entry = entry?;
            let path = entry.path().to_path_buf();
            if entry.file_type().is_dir() {
                listing.dirs.push(path);
                continue;
            }
            if !entry.file_type().is_file() || !is_image(&path) {
                continue;
            }
            let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_default();
            match stem.as_str() {
                "cover" if listing.cover.is_none() => listing.cover = Some(path),
                "avatar" if listing.avatar.is_none() => listing.avatar = Some(path),
                _ => listing.images.push(path),
            }
        }
        Ok(listing)
    }
}

fn scan_comic(dir: &Path) -> Result<ComicDir, DirectoryError> {
    let listing = Listing::read(dir)?;
    let info = match read_json::<ComicInfo>(&dir.join("comic.json"))? {
        Some(info) => info,
        None => {
            let modified = modified_at(dir)?;
            ComicInfo {
                id: dir_name(dir),
                title: dir_name(dir),
                updated_at: modified,
                created_at: modified,
                ..Default::default()
            }
        }
    };
    let mut volumes = Vec::with_capacity(listing.dirs.len());
    for volume_dir in &listing.dirs {
        volumes.push(scan_volume(volume_dir)?);
    }
    Ok(ComicDir { info, cover: listing.cover, avatar: listing.avatar, volumes })
}

fn scan_volume(dir: &Path) -> Result<VolumeDir, DirectoryError> {
    let listing = Listing::read(dir)?;
    let info = match read_json::<VolumeInfo>(&dir.join("volume.json"))? {
        Some(info) => info,
        None => {
            let modified = modified_at(dir)?;
            VolumeInfo { id: dir_name(dir), title: dir_name(dir), updated_at: modified, created_at: modified }
        }
    };
    let mut chapters = Vec::with_capacity(listing.dirs.len());
    for chapter_dir in &listing.dirs {
        chapters.push(scan_chapter(chapter_dir)?);
    }
    Ok(VolumeDir { info, cover: listing.cover, chapters })
}

fn scan_chapter(dir: &Path) -> Result<ChapterDir, DirectoryError> {
    let listing = Listing::read(dir)?;
    let info = match read_json::<ChapterInfo>(&dir.join("chapter.json"))? {
        Some(info) => info,
        None => {
            let modified = modified_at(dir)?;
            ChapterInfo { id: dir_name(dir), title: dir_name(dir), updated_at: modified, created_at: modified }
        }
    };
    // An avatar file has no meaning at chapter level; treat it as a page.
    let mut pictures = listing.images;
    if let Some(avatar) = listing.avatar {
        pictures.push(avatar);
        pictures.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    }
    let picture_infos = read_json::<Vec<PictureInfo>>(&dir.join(PICTURES_FILE))?.unwrap_or_default();
    Ok(ChapterDir { info, cover: listing.cover, pictures, picture_infos })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DirectoryError> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).map_err(|source| DirectoryError::Io { source, path: path.to_path_buf() })?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| DirectoryError::Metadata { source, path: path.to_path_buf() })
}

fn read_optional(path: Option<&Path>) -> Result<Asset, DirectoryError> {
    match path {
        Some(p) => fs::read(p)
            .map(Some)
            .map_err(|source| DirectoryError::Io { source, path: p.to_path_buf() }),
        None => Ok(None),
    }
}

fn modified_at(path: &Path) -> Result<i64, DirectoryError> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|source| DirectoryError::Io { source, path: path.to_path_buf() })?;
    Ok(chrono::DateTime::<chrono::Utc>::from(modified).timestamp())
}

fn dir_name(path: &Path) -> String {
    path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

fn extension(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

fn is_image(path: &Path) -> bool {
    extension(path).map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Compares names so that embedded numbers order by value: `2` < `10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let a_end = a.find(|c: char| !c.is_ascii_digit()).unwrap_or(a.len());
                let b_end = b.find(|c: char| !c.is_ascii_digit()).unwrap_or(b.len());
                let (na, nb) = (a[..a_end].trim_start_matches('0'), b[..b_end].trim_start_matches('0'));
                let ord = na.len().cmp(&nb.len()).then_with(|| na.cmp(nb));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = &a[a_end..];
                b = &b[b_end..];
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a = &a[x.len_utf8()..];
                b = &b[y.len_utf8()..];
            }
        }
    }
}
