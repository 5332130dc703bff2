#![allow(dead_code)]

use std::cell::RefCell;

use pkz::{Asset, ArchiveInfo, ChapterInfo, ComicInfo, Fetcher, Node, PictureInfo, VolumeInfo};

/// In-memory fetcher over a fixed shape: `shape[comic][volume][chapter]` = picture count.
/// Records every call so tests can check traversal order.
pub struct TreeFetcher {
    pub shape: Vec<Vec<Vec<usize>>>,
    /// Serve covers and avatars for even-indexed nodes only.
    pub with_covers: bool,
    /// Serve `Some(vec![])` for every cover and avatar, and for picture 0 of each chapter.
    pub empty_assets: bool,
    /// `(comic, volume, chapter, picture)` whose `picture_info` fails.
    pub fail_picture_info: Option<(usize, usize, usize, usize)>,
    pub calls: RefCell<Vec<String>>,
}

impl TreeFetcher {
    pub fn new(shape: Vec<Vec<Vec<usize>>>) -> Self {
        Self { shape, with_covers: false, empty_assets: false, fail_picture_info: None, calls: RefCell::new(Vec::new()) }
    }

    pub fn with_covers(mut self) -> Self {
        self.with_covers = true;
        self
    }

    pub fn with_empty_assets(mut self) -> Self {
        self.empty_assets = true;
        self
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn cover(&self, idx: usize, label: String) -> Asset {
        if self.empty_assets {
            Some(Vec::new())
        } else if self.with_covers && idx % 2 == 0 {
            Some(label.into_bytes())
        } else {
            None
        }
    }
}

pub fn picture_bytes(c: usize, v: usize, h: usize, p: usize) -> Vec<u8> {
    format!("picture {}/{}/{}/{} ", c, v, h, p).repeat(17 + p).into_bytes()
}

pub fn comic_info(c: usize) -> ComicInfo {
    ComicInfo {
        id: format!("comic-{}", c),
        title: format!("Comic #{}", c),
        categories: vec!["action".into(), "drama".into()],
        tags: vec![format!("tag{}", c)],
        author_id: format!("author-{}", c),
        author: "Somebody".into(),
        updated_at: 1_700_000_000 + c as i64,
        created_at: 1_600_000_000 + c as i64,
        description: "description".into(),
        chinese_team: "team".into(),
        finished: c % 2 == 1,
    }
}

impl Fetcher for TreeFetcher {
    type Error = String;

    fn archive_info(&self) -> Result<ArchiveInfo, String> {
        self.log("archive_info".into());
        Ok(ArchiveInfo { name: "Test Archive".into(), author: "Tester".into(), description: "fixture".into() })
    }

    fn archive_cover(&self) -> Result<Asset, String> {
        self.log("archive_cover".into());
        Ok(self.cover(0, "archive cover".into()))
    }

    fn archive_author_avatar(&self) -> Result<Asset, String> {
        self.log("archive_author_avatar".into());
        Ok(None)
    }

    fn comic_count(&self) -> Result<usize, String> {
        self.log("comic_count".into());
        Ok(self.shape.len())
    }

    fn comic_info(&self, comic_idx: usize) -> Result<ComicInfo, String> {
        self.log(format!("comic_info {}", comic_idx));
        Ok(comic_info(comic_idx))
    }

    fn comic_cover(&self, comic: Node<'_, ComicInfo>) -> Result<Asset, String> {
        self.log(format!("comic_cover {}", comic.idx));
        Ok(self.cover(comic.idx, format!("cover of {}", comic.info.id)))
    }

    fn comic_author_avatar(&self, comic: Node<'_, ComicInfo>) -> Result<Asset, String> {
        self.log(format!("comic_author_avatar {}", comic.idx));
        Ok(self.cover(comic.idx, format!("avatar of {}", comic.info.author_id)))
    }

    fn volume_count(&self, comic: Node<'_, ComicInfo>) -> Result<usize, String> {
        self.log(format!("volume_count {}", comic.idx));
        Ok(self.shape[comic.idx].len())
    }

    fn volume_info(&self, comic: Node<'_, ComicInfo>, volume_idx: usize) -> Result<VolumeInfo, String> {
        self.log(format!("volume_info {} {}", comic.idx, volume_idx));
        Ok(VolumeInfo { id: format!("{}-v{}", comic.info.id, volume_idx), title: format!("Volume {}", volume_idx + 1), updated_at: 2, created_at: 1 })
    }

    fn volume_cover(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>) -> Result<Asset, String> {
        self.log(format!("volume_cover {} {}", comic.idx, volume.idx));
        Ok(self.cover(volume.idx, format!("cover of {}", volume.info.id)))
    }

    fn chapter_count(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>) -> Result<usize, String> {
        self.log(format!("chapter_count {} {}", comic.idx, volume.idx));
        Ok(self.shape[comic.idx][volume.idx].len())
    }

    fn chapter_info(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>, chapter_idx: usize) -> Result<ChapterInfo, String> {
        self.log(format!("chapter_info {} {} {}", comic.idx, volume.idx, chapter_idx));
        Ok(ChapterInfo { id: format!("{}-c{}", volume.info.id, chapter_idx), title: format!("Chapter {}", chapter_idx + 1), updated_at: 4, created_at: 3 })
    }

    fn chapter_cover(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>, chapter: Node<'_, ChapterInfo>) -> Result<Asset, String> {
        self.log(format!("chapter_cover {} {} {}", comic.idx, volume.idx, chapter.idx));
        Ok(None)
    }

    fn picture_count(&self, comic: Node<'_, ComicInfo>, volume: Node<'_, VolumeInfo>, chapter: Node<'_, ChapterInfo>) -> Result<usize, String> {
        self.log(format!("picture_count {} {} {}", comic.idx, volume.idx, chapter.idx));
        Ok(self.shape[comic.idx][volume.idx][chapter.idx])
    }

    fn picture_info(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture_idx: usize,
    ) -> Result<PictureInfo, String> {
        let at = (comic.idx, volume.idx, chapter.idx, picture_idx);
        self.log(format!("picture_info {} {} {} {}", at.0, at.1, at.2, at.3));
        if self.fail_picture_info == Some(at) {
            return Err(format!("picture {:?} is unavailable", at));
        }
        Ok(PictureInfo {
            id: format!("{}-p{}", chapter.info.id, picture_idx),
            title: format!("{:03}", picture_idx + 1),
            width: 800 + picture_idx as u32,
            height: 1200,
            format: "jpg".into(),
        })
    }

    fn picture_data(
        &self,
        comic: Node<'_, ComicInfo>,
        volume: Node<'_, VolumeInfo>,
        chapter: Node<'_, ChapterInfo>,
        picture: Node<'_, PictureInfo>,
    ) -> Result<Asset, String> {
        self.log(format!("picture_data {} {} {} {}", comic.idx, volume.idx, chapter.idx, picture.idx));
        if self.empty_assets && picture.idx == 0 {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(picture_bytes(comic.idx, volume.idx, chapter.idx, picture.idx)))
    }
}
