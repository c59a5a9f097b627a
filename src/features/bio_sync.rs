//! # `bio_sync`: mirror the playing track into the profile bio.
//!
//! ```text
//! every interval:
//!   now_playing() ─► bio() ─► remember user bio ─► plan ─► set_bio() ─► store bot bio
//!                                                   │
//!                         not playing + managed bio ┴─► restore user bio
//! cleanup: restore user bio if a managed bio is still shown
//! ```
//!
//! Tick failures are reported and the loop goes on. Flood control pauses the
//! loop for the advised delay. Only a revoked session ends the feature.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::bio::{BioPlan, BioStore, is_managed, plan};
use crate::error::{AuthError, TaskError};
use crate::logsink::LogSink;
use crate::messenger::{Messenger, MessengerError};
use crate::pipeline::Pipeline;
use crate::session::SessionRegistry;
use crate::tasks::Task;

pub const BIO_SYNC: &str = "bio_sync";

pub struct BioSync {
    sessions: SessionRegistry,
    pipeline: Arc<Pipeline>,
    store: BioStore,
    interval: Duration,
    sink: LogSink,
    /// Bio change notices.
    changes: LogSink,
}

impl BioSync {
    pub fn new(
        sessions: SessionRegistry,
        pipeline: Arc<Pipeline>,
        store: BioStore,
        interval: Duration,
        sink: LogSink,
    ) -> Self {
        Self {
            sessions,
            pipeline,
            store,
            interval,
            changes: sink.clone(),
            sink,
        }
    }

    /// Sends bio change notices to their own sink (e.g. another topic).
    pub fn with_change_log(mut self, changes: LogSink) -> Self {
        self.changes = changes;
        self
    }

    /// One sync step. `Ok(Some(d))` asks the loop to wait `d` before the next one.
    async fn tick(&self) -> Result<Option<Duration>, TaskError> {
        let session = match self.sessions.get().await {
            Ok(session) => session,
            Err(AuthError::Unavailable(reason)) => {
                self.sink.error(format!("Session unavailable, bio sync skipped: {reason}"));
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let client = session.client();

        let playing = match self.pipeline.now_playing().await {
            Ok(playing) => playing,
            Err(e) => {
                self.sink.error(format!("Error getting current track info: {e}"));
                return Ok(None);
            }
        };

        let current = match client.bio().await {
            Ok(bio) => bio,
            Err(e) => return self.client_failure("read bio", e).await,
        };
        if !current.is_empty() && !is_managed(&current) {
            if let Err(e) = self.store.set_user_bio(&current).await {
                tracing::warn!(error = %e, "user bio not persisted");
            }
        }
        let user_bio = self.store.user_bio().await;

        match plan(&current, playing.as_ref(), &user_bio) {
            BioPlan::Keep => Ok(None),
            BioPlan::NoFit => {
                self.sink
                    .warn("No bio format fits within the character limit");
                Ok(None)
            }
            BioPlan::Show(bio) => {
                if let Err(e) = client.set_bio(&bio).await {
                    return self.client_failure("update bio", e).await;
                }
                if let Err(e) = self.store.set_bot_bio(&bio).await {
                    tracing::warn!(error = %e, "bot bio not persisted");
                }
                self.changes.info(format!("Bio updated: {bio}"));
                Ok(None)
            }
            BioPlan::Restore(bio) => {
                if let Err(e) = client.set_bio(&bio).await {
                    return self.client_failure("restore bio", e).await;
                }
                self.changes.info(format!("Restored user bio: {bio}"));
                Ok(None)
            }
        }
    }

    async fn client_failure(
        &self,
        what: &str,
        e: MessengerError,
    ) -> Result<Option<Duration>, TaskError> {
        match e {
            MessengerError::RateLimited { retry_after } => {
                self.sink.error(format!(
                    "Flood wait on {what}: {}s",
                    retry_after.as_secs()
                ));
                Ok(Some(retry_after))
            }
            MessengerError::Unauthorized(reason) => {
                self.sessions.invalidate().await;
                Err(TaskError::Fatal {
                    error: format!("{what}: unauthorized: {reason}"),
                })
            }
            other => {
                self.sink.error(format!("Error on {what}: {other}"));
                Ok(None)
            }
        }
    }

    async fn restore(&self, client: &dyn Messenger) -> Result<(), MessengerError> {
        let current = client.bio().await?;
        if !is_managed(&current) {
            return Ok(());
        }
        let user_bio = self.store.user_bio().await;
        client.set_bio(&user_bio).await?;
        self.changes.info(format!("Restored user bio: {user_bio}"));
        Ok(())
    }
}

#[async_trait]
impl Task for BioSync {
    fn name(&self) -> &str {
        BIO_SYNC
    }

    async fn init(&self) -> Result<(), TaskError> {
        self.sessions.get().await?;
        Ok(())
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        loop {
            let step = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(TaskError::Canceled),
                step = self.tick() => step?,
            };
            let wait = step.unwrap_or(self.interval);

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(TaskError::Canceled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn cleanup(&self) {
        let session = match self.sessions.get().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "bio left as is, no session");
                return;
            }
        };
        if let Err(e) = self.restore(session.client()).await {
            self.sink.error(format!("Could not restore user bio: {e}"));
        }
    }
}
