//! ID3v2.4 tagger.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use id3::frame::{Picture, PictureType};
use id3::{ErrorKind, Tag, TagLike, Version};

use crate::pipeline::{TagError, Tagger, TrackMeta};

/// Writes title, artists, album and the front cover in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Tagger;

fn cover_mime(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn write_tags(path: &Path, meta: &TrackMeta, cover: Option<&[u8]>) -> Result<(), TagError> {
    let mut tag = match Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(e) if matches!(e.kind, ErrorKind::NoTag) => Tag::new(),
        Err(e) => return Err(TagError(e.to_string())),
    };

    tag.set_title(meta.title.as_str());
    if !meta.artists.is_empty() {
        tag.set_artist(meta.artists.join(", "));
    }
    if let Some(album) = meta.album.as_deref() {
        tag.set_album(album);
    }
    if let Some(data) = cover {
        tag.remove_picture_by_type(PictureType::CoverFront);
        tag.add_frame(Picture {
            mime_type: cover_mime(data).to_string(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: data.to_vec(),
        });
    }

    tag.write_to_path(path, Version::Id3v24)
        .map_err(|e| TagError(e.to_string()))
}

#[async_trait]
impl Tagger for Id3Tagger {
    async fn tag(&self, path: &Path, meta: &TrackMeta, cover: Option<&[u8]>) -> Result<(), TagError> {
        let path: PathBuf = path.to_path_buf();
        let meta = meta.clone();
        let cover = cover.map(<[u8]>::to_vec);
        tokio::task::spawn_blocking(move || write_tags(&path, &meta, cover.as_deref()))
            .await
            .map_err(|e| TagError(format!("tagging task failed: {e}")))?
    }
}
