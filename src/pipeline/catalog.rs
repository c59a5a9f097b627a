//! Music catalog and playback-state seams, plus search ranking.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Audio bytes as they arrive from the catalog.
pub type AudioStream = BoxStream<'static, Result<Bytes, CatalogError>>;

/// Track metadata from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackMeta {
    pub id: String,
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Catalog-specific cover reference.
    pub cover_uri: Option<String>,
    pub duration_ms: Option<u64>,
}

impl TrackMeta {
    /// Artists joined with ", " or "Unknown Artist".
    pub fn artists_line(&self) -> String {
        if self.artists.is_empty() {
            "Unknown Artist".to_string()
        } else {
            self.artists.join(", ")
        }
    }

    /// Upload caption: `Artists – Title`, plus the album on a second line.
    pub fn caption(&self) -> String {
        let mut caption = format!("{} – {}", self.artists_line(), self.title);
        if let Some(album) = self.album.as_deref().filter(|a| !a.is_empty()) {
            caption.push_str("\n💿 ");
            caption.push_str(album);
        }
        caption
    }
}

/// Snapshot of the account's player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track_id: String,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub paused: bool,
}

/// Catalog and playback-state failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The service refused the request (auth, region, quota).
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("transport: {0}")]
    Transport(String),
}

/// Music catalog operations.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMeta>, CatalogError>;

    async fn track(&self, id: &str) -> Result<TrackMeta, CatalogError>;

    /// Opens the best available audio stream for the track.
    async fn open_stream(&self, id: &str) -> Result<AudioStream, CatalogError>;

    /// Cover art bytes; `None` when the track has none.
    async fn cover(&self, meta: &TrackMeta) -> Result<Option<Vec<u8>>, CatalogError>;
}

/// Player state of the account.
#[async_trait]
pub trait PlaybackState: Send + Sync + 'static {
    /// The active track, or `None` when nothing is loaded.
    async fn current(&self) -> Result<Option<NowPlaying>, CatalogError>;
}

/// Picks the best match for `query`.
///
/// Order of preference: artist and title both match, then the title alone,
/// then the first result. Comparison ignores case, punctuation and spacing.
pub fn rank(query: &str, results: &[TrackMeta]) -> Option<usize> {
    if results.is_empty() {
        return None;
    }
    let q = normalize(query);

    let full = results.iter().position(|t| {
        let artists = t.artists.join(" ");
        normalize(&format!("{artists} {}", t.title)) == q
            || normalize(&format!("{} {artists}", t.title)) == q
    });
    let title = || results.iter().position(|t| normalize(&t.title) == q);

    full.or_else(title).or(Some(0))
}

fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
