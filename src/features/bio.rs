//! Now-playing bio: text planning and the user-bio store.
//!
//! Bios written by the controller carry [`BIO_KEY`]; any bio without it
//! belongs to the user and is remembered so it can be restored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::pipeline::PlayingTrack;

/// Marker of controller-managed bios. Never part of a user bio.
pub const BIO_KEY: &str = "🎶";

/// Longest bio the controller writes, in chars.
pub const BIO_LIMIT: usize = 140 - 2;

/// What one sync tick should do with the bio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BioPlan {
    /// Write a now-playing bio.
    Show(String),
    /// Put the user's bio back.
    Restore(String),
    /// Nothing to change.
    Keep,
    /// Playing, but even the shortest template is too long.
    NoFit,
}

pub fn is_managed(bio: &str) -> bool {
    bio.contains(BIO_KEY)
}

/// `M:SS`.
pub fn clock(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", (secs / 60) % 60, secs % 60)
}

/// First template that fits [`BIO_LIMIT`], most detailed first.
pub fn now_playing_bio(track: &PlayingTrack) -> Option<String> {
    let title = &track.meta.title;
    let artists = track.meta.artists_line();
    let progress = clock(track.progress_ms);
    let duration = clock(track.duration_ms);

    [
        format!("{BIO_KEY} Now Playing: {title} - {artists} {progress}/{duration}"),
        format!("{BIO_KEY} Now Playing: {title} - {artists}"),
        format!("{BIO_KEY} : {title} - {artists}"),
        format!("{BIO_KEY} Now Playing: {title}"),
        format!("{BIO_KEY} : {title}"),
    ]
    .into_iter()
    .find(|candidate| candidate.chars().count() <= BIO_LIMIT)
}

/// Decides the next bio from what is shown now and what is playing.
pub fn plan(current: &str, playing: Option<&PlayingTrack>, user_bio: &str) -> BioPlan {
    match playing.filter(|t| !t.paused) {
        Some(track) => match now_playing_bio(track) {
            Some(bio) if bio == current => BioPlan::Keep,
            Some(bio) => BioPlan::Show(bio),
            None => BioPlan::NoFit,
        },
        None if is_managed(current) && current != user_bio => BioPlan::Restore(user_bio.to_string()),
        None => BioPlan::Keep,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct BioRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bot_bio: Option<String>,
}

/// JSON file remembering the user's own bio and the last one written.
#[derive(Debug)]
pub struct BioStore {
    path: PathBuf,
    fallback: String,
    record: Mutex<Option<BioRecord>>,
}

impl BioStore {
    /// `fallback` is the user bio assumed before one was ever observed.
    pub fn new(path: impl Into<PathBuf>, fallback: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fallback: fallback.into(),
            record: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn user_bio(&self) -> String {
        self.read()
            .await
            .user_bio
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub async fn bot_bio(&self) -> Option<String> {
        self.read().await.bot_bio
    }

    pub async fn set_user_bio(&self, bio: &str) -> std::io::Result<()> {
        self.update(|r| r.user_bio = Some(bio.to_string())).await
    }

    pub async fn set_bot_bio(&self, bio: &str) -> std::io::Result<()> {
        self.update(|r| r.bot_bio = Some(bio.to_string())).await
    }

    async fn read(&self) -> BioRecord {
        let mut cached = self.record.lock().await;
        if let Some(record) = cached.as_ref() {
            return record.clone();
        }
        let record = self.load().await;
        *cached = Some(record.clone());
        record
    }

    async fn update(&self, change: impl FnOnce(&mut BioRecord)) -> std::io::Result<()> {
        let mut cached = self.record.lock().await;
        let mut record = match cached.take() {
            Some(record) => record,
            None => self.load().await,
        };
        change(&mut record);
        let saved = self.save(&record).await;
        *cached = Some(record);
        saved
    }

    async fn load(&self) -> BioRecord {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt bio store");
                BioRecord::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BioRecord::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read bio store");
                BioRecord::default()
            }
        }
    }

    async fn save(&self, record: &BioRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(record).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}
