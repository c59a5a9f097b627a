//! # Track acquisition pipeline.
//!
//! [`Pipeline::acquire`] turns a [`TrackRequest`] into an [`AcquiredTrack`]:
//!
//! ```text
//! Url(link)        ──► track id ─────────────┐
//! Search(query)    ──► catalog search ─► rank ┼─► metadata ─► download (.part, retry once)
//! CurrentlyPlaying ──► playback state ───────┘                  │
//!                                                               ▼
//!                                            cover art (optional) ─► tags ─► rename ─► AcquiredTrack
//! ```
//!
//! ## Rules
//! - Steps run strictly in order per request; distinct requests run concurrently
//!   with distinct file names.
//! - `Download` failures are retried once after a backoff; other failures are
//!   returned immediately.
//! - On any error no file is left in the downloads area.
//! - Missing cover art and tagging failures are not errors; they clear
//!   `tagging_ok` (tagging failures are also logged at warn).
//! - The pipeline does not log its errors; the caller reports each one once.

mod catalog;
mod deliver;
mod download;
mod links;
mod tagging;

pub use catalog::{AudioStream, Catalog, CatalogError, NowPlaying, PlaybackState, TrackMeta, rank};
pub use deliver::{Courier, Destination};
pub use download::{Downloads, PartFile};
pub use links::{find_track_link, track_id};
pub use tagging::{TagError, Tagger};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AcquireError;
use crate::logsink::LogSink;
use crate::policies::RetryPolicy;

/// How many catalog results a search considers.
pub const SEARCH_LIMIT: usize = 10;

/// What to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRequest {
    /// A catalog track link.
    Url(String),
    /// Free text, resolved through search.
    Search(String),
    /// Whatever the account is playing now.
    CurrentlyPlaying,
}

impl TrackRequest {
    /// Link if `text` carries one, otherwise a search.
    pub fn from_text(text: &str) -> Self {
        match find_track_link(text) {
            Some(link) => TrackRequest::Url(link.to_string()),
            None => TrackRequest::Search(text.trim().to_string()),
        }
    }
}

/// A finished, tagged file owned by the holder until delivered.
#[derive(Debug)]
pub struct AcquiredTrack {
    path: PathBuf,
    caption: String,
    tagging_ok: bool,
    meta: TrackMeta,
}

impl AcquiredTrack {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Cover art and tags were both embedded.
    pub fn tagging_ok(&self) -> bool {
        self.tagging_ok
    }

    pub fn meta(&self) -> &TrackMeta {
        &self.meta
    }
}

/// The account's player joined with catalog metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayingTrack {
    pub meta: TrackMeta,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub paused: bool,
}

/// Request → tagged file.
pub struct Pipeline {
    catalog: Arc<dyn Catalog>,
    playback: Arc<dyn PlaybackState>,
    tagger: Arc<dyn Tagger>,
    downloads: Downloads,
    retry: RetryPolicy,
    sink: LogSink,
}

impl Pipeline {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        playback: Arc<dyn PlaybackState>,
        tagger: Arc<dyn Tagger>,
        downloads: Downloads,
        sink: LogSink,
    ) -> Self {
        Self {
            catalog,
            playback,
            tagger,
            downloads,
            retry: RetryPolicy::once(),
            sink,
        }
    }

    /// Overrides the download retry budget.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn downloads(&self) -> &Downloads {
        &self.downloads
    }

    /// Runs the full pipeline for one request.
    pub async fn acquire(&self, request: TrackRequest) -> Result<AcquiredTrack, AcquireError> {
        let meta = self.resolve(&request).await?;
        tracing::debug!(track = %meta.id, ?request, "track resolved");

        let part = self.download(&meta.id).await?;
        let cover = self.cover(&meta).await;
        let tagged = self.tag(part.path(), &meta, cover.as_deref()).await;

        let path = part
            .commit()
            .await
            .map_err(|e| AcquireError::Download(format!("finalize: {e}")))?;

        Ok(AcquiredTrack {
            path,
            caption: meta.caption(),
            tagging_ok: tagged && cover.is_some(),
            meta,
        })
    }

    /// Resolves the account's current track without downloading it.
    pub async fn now_playing(&self) -> Result<Option<PlayingTrack>, AcquireError> {
        let state = self
            .playback
            .current()
            .await
            .map_err(|e| AcquireError::Resolution(format!("playback state: {e}")))?;
        let Some(state) = state.filter(|s| !s.track_id.is_empty()) else {
            return Ok(None);
        };
        let meta = self
            .catalog
            .track(&state.track_id)
            .await
            .map_err(|e| AcquireError::Resolution(e.to_string()))?;
        Ok(Some(PlayingTrack {
            duration_ms: if state.duration_ms > 0 {
                state.duration_ms
            } else {
                meta.duration_ms.unwrap_or_default()
            },
            progress_ms: state.progress_ms,
            paused: state.paused,
            meta,
        }))
    }

    async fn resolve(&self, request: &TrackRequest) -> Result<TrackMeta, AcquireError> {
        match request {
            TrackRequest::Url(link) => {
                let id = track_id(link)
                    .ok_or_else(|| AcquireError::Resolution(format!("not a track link: {link}")))?;
                self.catalog
                    .track(id)
                    .await
                    .map_err(|e| AcquireError::Resolution(e.to_string()))
            }
            TrackRequest::Search(query) => {
                if query.trim().is_empty() {
                    return Err(AcquireError::Resolution("empty search query".into()));
                }
                let mut results = self
                    .catalog
                    .search(query, SEARCH_LIMIT)
                    .await
                    .map_err(|e| AcquireError::Resolution(e.to_string()))?;
                match rank(query, &results) {
                    Some(best) => Ok(results.swap_remove(best)),
                    None => Err(AcquireError::Resolution(format!("nothing found for \"{query}\""))),
                }
            }
            TrackRequest::CurrentlyPlaying => match self.now_playing().await? {
                Some(playing) => Ok(playing.meta),
                None => Err(AcquireError::NoActiveTrack),
            },
        }
    }

    async fn download(&self, track_id: &str) -> Result<PartFile, AcquireError> {
        let mut retry = 0;
        loop {
            match self.downloads.fetch(self.catalog.as_ref(), track_id).await {
                Ok(part) => return Ok(part),
                Err(e) if e.is_retryable() => match self.retry.delay(retry) {
                    Some(delay) => {
                        tracing::warn!(track = track_id, error = %e, ?delay, "download failed, retrying");
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn cover(&self, meta: &TrackMeta) -> Option<Vec<u8>> {
        match self.catalog.cover(meta).await {
            Ok(cover) => cover,
            Err(e) => {
                tracing::info!(track = %meta.id, error = %e, "no cover art");
                None
            }
        }
    }

    async fn tag(&self, path: &Path, meta: &TrackMeta, cover: Option<&[u8]>) -> bool {
        match self.tagger.tag(path, meta, cover).await {
            Ok(()) => true,
            Err(e) => {
                self.sink
                    .warn(format!("Tagging failed for {}: {e}", meta.caption()));
                false
            }
        }
    }
}
