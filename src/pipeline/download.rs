//! # Downloads area.
//!
//! Every download gets its own name, `<track-id>-<uuid>.mp3`, and is written
//! to `<name>.part` first. A [`PartFile`] removes the partial file when it
//! is dropped uncommitted, so an error or a cancelled request leaves nothing
//! behind. [`PartFile::commit`] renames the finished file into place.
//!
//! Name uniqueness is the only coordination between concurrent requests.
//! A stream that delivers nothing for [`STALL_TIMEOUT`] is abandoned.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::catalog::{Catalog, CatalogError};
use crate::error::AcquireError;

/// Longest wait for the next chunk of audio.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory that holds in-flight downloads.
#[derive(Debug, Clone)]
pub struct Downloads {
    dir: PathBuf,
    stall: Duration,
}

impl Downloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stall: STALL_TIMEOUT,
        }
    }

    pub fn with_stall_timeout(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves a fresh, collision-free name for `track_id`.
    pub fn reserve(&self, track_id: &str) -> PartFile {
        let id: String = track_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(32)
            .collect();
        let id = if id.is_empty() { "track".to_string() } else { id };
        let target = self.dir.join(format!("{id}-{}.mp3", uuid::Uuid::new_v4()));
        let mut part = target.clone().into_os_string();
        part.push(".part");
        PartFile {
            part: PathBuf::from(part),
            target,
            committed: false,
        }
    }

    /// Streams the track's audio into a new part file.
    pub async fn fetch(&self, catalog: &dyn Catalog, track_id: &str) -> Result<PartFile, AcquireError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AcquireError::Download(format!("downloads dir: {e}")))?;

        let mut stream = catalog.open_stream(track_id).await.map_err(|e| match e {
            CatalogError::NotFound(what) => AcquireError::Resolution(what),
            other => AcquireError::Download(other.to_string()),
        })?;

        let part = self.reserve(track_id);
        let mut file = tokio::fs::File::create(part.path())
            .await
            .map_err(|e| AcquireError::Download(format!("create {}: {e}", part.path().display())))?;

        let mut written = 0usize;
        loop {
            let next = tokio::time::timeout(self.stall, stream.next())
                .await
                .map_err(|_| {
                    AcquireError::Download(format!("audio stream stalled for {:?}", self.stall))
                })?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| AcquireError::Download(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| AcquireError::Download(format!("write: {e}")))?;
            written += chunk.len();
        }
        file.flush()
            .await
            .map_err(|e| AcquireError::Download(format!("flush: {e}")))?;

        if written == 0 {
            return Err(AcquireError::Download("empty audio stream".into()));
        }
        tracing::debug!(path = %part.path().display(), bytes = written, "audio downloaded");
        Ok(part)
    }
}

/// A partially written download. Removed on drop unless committed.
#[derive(Debug)]
pub struct PartFile {
    part: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartFile {
    /// Where bytes are written until commit.
    pub fn path(&self) -> &Path {
        &self.part
    }

    /// Final location after commit.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Renames the part file into its final name.
    pub async fn commit(mut self) -> std::io::Result<PathBuf> {
        tokio::fs::rename(&self.part, &self.target).await?;
        self.committed = true;
        Ok(std::mem::take(&mut self.target))
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.part) {
            Ok(()) => tracing::debug!(path = %self.part.display(), "partial download removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.part.display(), error = %e, "cannot remove partial download"),
        }
    }
}
