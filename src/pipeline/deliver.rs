//! # Upload and cleanup.
//!
//! [`Courier::deliver`] consumes an [`AcquiredTrack`], uploads it and removes
//! the file exactly once whatever the upload did. The file is claimed by a
//! guard before the first await, so a cancelled or panicking delivery still
//! removes it when the guard drops.

use std::path::{Path, PathBuf};

use crate::error::DeliverError;
use crate::logsink::LogSink;
use crate::messenger::{ChatId, MessageId, SendOptions};
use crate::session::SessionRegistry;

use super::AcquiredTrack;

const UPLOADING: &str = "⬆️ Uploading…";

/// Where a track goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    pub chat: ChatId,
    pub reply_to: Option<MessageId>,
}

impl Destination {
    pub fn reply(chat: ChatId, message: MessageId) -> Self {
        Self {
            chat,
            reply_to: Some(message),
        }
    }
}

/// Sends acquired tracks and disposes of their files.
#[derive(Clone)]
pub struct Courier {
    sessions: SessionRegistry,
    sink: LogSink,
}

impl Courier {
    pub fn new(sessions: SessionRegistry, sink: LogSink) -> Self {
        Self { sessions, sink }
    }

    /// Uploads `track` to `dest`; the local file is gone when this returns.
    ///
    /// Failures are logged at error here; callers only reply.
    pub async fn deliver(&self, track: AcquiredTrack, dest: Destination) -> Result<(), DeliverError> {
        let file = ClaimedFile::new(track.path().to_path_buf());
        let result = self.upload(&track, dest).await;
        file.release().await;

        match &result {
            Ok(()) => self.sink.info(format!("Sent {}", headline(&track))),
            Err(e) => self
                .sink
                .error(format!("Upload of {} failed: {e}", headline(&track))),
        }
        result
    }

    async fn upload(&self, track: &AcquiredTrack, dest: Destination) -> Result<(), DeliverError> {
        let session = self.sessions.get().await?;
        let client = session.client();
        let opts = SendOptions {
            reply_to: dest.reply_to,
            ..SendOptions::default()
        };

        let progress = match client.send_text(dest.chat, UPLOADING, opts).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::debug!(error = %e, "progress message not sent");
                None
            }
        };

        let sent = client
            .send_audio(dest.chat, track.path(), track.caption(), opts)
            .await;

        if let Some(id) = progress {
            if let Err(e) = client.delete_message(dest.chat, id).await {
                tracing::debug!(error = %e, "progress message not deleted");
            }
        }

        sent.map(|_| ())
            .map_err(|e| DeliverError::Upload(e.to_string()))
    }
}

fn headline(track: &AcquiredTrack) -> &str {
    track.caption().lines().next().unwrap_or_default()
}

/// Removes its file once: explicitly via `release`, or on drop.
struct ClaimedFile {
    path: PathBuf,
    released: bool,
}

impl ClaimedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            report_removal(&self.path, e);
        }
    }
}

impl Drop for ClaimedFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                report_removal(&self.path, e);
            }
        }
    }
}

fn report_removal(path: &Path, e: std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        tracing::warn!(path = %path.display(), error = %e, "cannot remove delivered file");
    }
}
