//! # Entity Model
//!
//! The archive tree as it is stored in the `PKZ-INFO` index entry.
//!
//! Each node is a pair: the metadata the [`Fetcher`](crate::fetcher::Fetcher)
//! supplied (`*Info`) plus the fields the writer derives while packing
//! (asset paths, ordinal `idx`, aggregate counters). The metadata is flattened
//! on the wire, so a comic serializes as one JSON object with `id`, `title`, ...
//! next to `cover_path`, `volumes`, `idx`.
//!
//! Deserialization takes counters and `idx` exactly as stored. Use
//! [`Archive::consistency_issues`] to check them against the tree.

use serde::{Deserialize, Serialize};

/// Archive-level metadata.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub name: String,
    pub author: String,
    pub description: String,
}

/// Comic metadata. Timestamps are Unix seconds.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ComicInfo {
    pub id: String,
    pub title: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub author_id: String,
    pub author: String,
    pub updated_at: i64,
    pub created_at: i64,
    pub description: String,
    pub chinese_team: String,
    pub finished: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub id: String,
    pub title: String,
    pub updated_at: i64,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterInfo {
    pub id: String,
    pub title: String,
    pub updated_at: i64,
    pub created_at: i64,
}

/// Picture metadata. `format` is a free-form string such as `"jpg"` or `"png"`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureInfo {
    pub id: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Root of the index.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    #[serde(flatten)]
    pub info: ArchiveInfo,
    /// Container entry holding the archive cover, or empty.
    pub cover_path: String,
    /// Container entry holding the author avatar, or empty.
    pub author_avatar_path: String,
    pub comics: Vec<Comic>,
    pub comic_count: usize,
    pub volumes_count: usize,
    pub chapter_count: usize,
    pub picture_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Comic {
    #[serde(flatten)]
    pub info: ComicInfo,
    pub cover_path: String,
    pub author_avatar_path: String,
    pub volumes: Vec<Volume>,
    pub volumes_count: usize,
    pub chapter_count: usize,
    pub picture_count: usize,
    /// Position within [`Archive::comics`].
    pub idx: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    #[serde(flatten)]
    pub info: VolumeInfo,
    pub cover_path: String,
    pub chapters: Vec<Chapter>,
    pub chapter_count: usize,
    pub picture_count: usize,
    pub idx: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Chapter {
    #[serde(flatten)]
    pub info: ChapterInfo,
    pub cover_path: String,
    pub pictures: Vec<Picture>,
    pub picture_count: usize,
    pub idx: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Picture {
    #[serde(flatten)]
    pub info: PictureInfo,
    /// Container entry holding the picture bytes, or empty.
    pub picture_path: String,
    pub idx: usize,
}

impl Archive {
    pub fn new(info: ArchiveInfo) -> Self {
        Self { info, ..Default::default() }
    }

    /// Serialize to the canonical JSON index document.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parse an index document. Counters and `idx` values are kept as stored.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Every non-empty asset path in the tree, in traversal order.
    pub fn asset_paths(&self) -> Vec<&str> {
        fn push<'a>(out: &mut Vec<&'a str>, p: &'a str) {
            if !p.is_empty() {
                out.push(p);
            }
        }
        let mut out = Vec::new();
        push(&mut out, &self.cover_path);
        push(&mut out, &self.author_avatar_path);
        for comic in &self.comics {
            push(&mut out, &comic.cover_path);
            push(&mut out, &comic.author_avatar_path);
            for volume in &comic.volumes {
                push(&mut out, &volume.cover_path);
                for chapter in &volume.chapters {
                    push(&mut out, &chapter.cover_path);
                    for picture in &chapter.pictures {
                        push(&mut out, &picture.picture_path);
                    }
                }
            }
        }
        out
    }

    /// Compares every stored counter and `idx` against the tree it describes.
    /// Returns a human-readable line per mismatch; empty means consistent.
    ///
    /// Nothing is modified: the stored values stay authoritative.
    pub fn consistency_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let mut check = |what: String, stored: usize, actual: usize| {
            if stored != actual {
                issues.push(format!("{}: stored {}, actual {}", what, stored, actual));
            }
        };

        let (mut volumes, mut chapters, mut pictures) = (0, 0, 0);
        for (ci, comic) in self.comics.iter().enumerate() {
            check(format!("comics[{}].idx", ci), comic.idx, ci);
            let (mut c_chapters, mut c_pictures) = (0, 0);
            for (vi, volume) in comic.volumes.iter().enumerate() {
                let at = format!("comics[{}].volumes[{}]", ci, vi);
                check(format!("{}.idx", at), volume.idx, vi);
                let mut v_pictures = 0;
                for (hi, chapter) in volume.chapters.iter().enumerate() {
                    let at = format!("{}.chapters[{}]", at, hi);
                    check(format!("{}.idx", at), chapter.idx, hi);
                    for (pi, picture) in chapter.pictures.iter().enumerate() {
                        check(format!("{}.pictures[{}].idx", at, pi), picture.idx, pi);
                    }
                    check(format!("{}.picture_count", at), chapter.picture_count, chapter.pictures.len());
                    v_pictures += chapter.pictures.len();
                }
                check(format!("{}.chapter_count", at), volume.chapter_count, volume.chapters.len());
                check(format!("{}.picture_count", at), volume.picture_count, v_pictures);
                c_chapters += volume.chapters.len();
                c_pictures += v_pictures;
            }
            check(format!("comics[{}].volumes_count", ci), comic.volumes_count, comic.volumes.len());
            check(format!("comics[{}].chapter_count", ci), comic.chapter_count, c_chapters);
            check(format!("comics[{}].picture_count", ci), comic.picture_count, c_pictures);
            volumes += comic.volumes.len();
            chapters += c_chapters;
            pictures += c_pictures;
        }
        check("comic_count".into(), self.comic_count, self.comics.len());
        check("volumes_count".into(), self.volumes_count, volumes);
        check("chapter_count".into(), self.chapter_count, chapters);
        check("picture_count".into(), self.picture_count, pictures);
        issues
    }
}
