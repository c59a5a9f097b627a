//! # Remote log sink.
//!
//! [`LogSink::log`] is fire-and-forget: it enqueues a [`LogEvent`] on a
//! bounded queue and returns. A single worker drains the queue and posts each
//! event to the log chat through the shared session. Delivery failures and
//! queue overflow are reported locally through `tracing` and otherwise
//! swallowed; events are sent once and never retried.
//!
//! ```text
//!   feature / router / pipeline ── log() ──► [bounded queue] ──► worker ──► Messenger::send_text
//!                                   │
//!                                   └─► tracing (local copy)
//! ```
//!
//! Each clone can be pinned to a forum topic with [`LogSink::topic`], so every
//! component posts into its own thread of the log chat.

use std::fmt;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::messenger::{ChatId, SendOptions, escape_markdown};
use crate::session::SessionRegistry;

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Info => "ℹ️",
            Severity::Warn => "⚠️",
            Severity::Error => "❌",
            Severity::Critical => "🆘",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One log line bound for the remote destination.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub at: SystemTime,
    /// Forum topic inside the log chat.
    pub thread: Option<i64>,
}

impl LogEvent {
    /// Text as posted to the log chat. Only the level tag is markup.
    pub fn render(&self) -> String {
        format!(
            "{} *[{}]* - {}",
            self.severity.emoji(),
            self.severity.label(),
            escape_markdown(&self.message)
        )
    }
}

/// Non-blocking handle for remote logging.
#[derive(Clone, Debug)]
pub struct LogSink {
    tx: Option<mpsc::Sender<LogEvent>>,
    thread: Option<i64>,
}

impl LogSink {
    /// A sink that only logs locally.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            thread: None,
        }
    }

    /// A sink feeding a caller-owned receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LogEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Some(tx),
                thread: None,
            },
            rx,
        )
    }

    /// Starts the delivery worker posting into `chat`.
    pub fn spawn(sessions: SessionRegistry, chat: ChatId, capacity: usize) -> (Self, SinkWorker) {
        let (sink, rx) = Self::channel(capacity);
        let cancel = CancellationToken::new();
        let join = tokio::spawn(deliver_loop(rx, sessions, chat, cancel.clone()));
        (sink, SinkWorker { cancel, join })
    }

    /// Clone of this sink that posts into `thread` (`None` keeps the chat root).
    pub fn topic(&self, thread: Option<i64>) -> Self {
        Self {
            tx: self.tx.clone(),
            thread,
        }
    }

    /// Enqueues a log line. Never blocks, never fails.
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Info => tracing::info!(target: "tunevisor::remote", "{message}"),
            Severity::Warn => tracing::warn!(target: "tunevisor::remote", "{message}"),
            Severity::Error | Severity::Critical => {
                tracing::error!(target: "tunevisor::remote", severity = %severity, "{message}")
            }
        }

        let Some(tx) = &self.tx else {
            return;
        };
        let event = LogEvent {
            severity,
            message,
            at: SystemTime::now(),
            thread: self.thread,
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("remote log queue full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("remote log worker gone, event dropped");
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Severity::Critical, message);
    }
}

/// Owner handle of the delivery worker.
pub struct SinkWorker {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SinkWorker {
    /// Flushes what is already queued, bounded by `grace`, then stops.
    pub async fn shutdown(mut self, grace: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(grace, &mut self.join).await.is_err() {
            tracing::warn!(?grace, "remote log flush timed out");
            self.join.abort();
        }
    }
}

async fn deliver_loop(
    mut rx: mpsc::Receiver<LogEvent>,
    sessions: SessionRegistry,
    chat: ChatId,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => post(&sessions, chat, &event).await,
                None => return,
            },
        }
    }
    while let Ok(event) = rx.try_recv() {
        post(&sessions, chat, &event).await;
    }
}

async fn post(sessions: &SessionRegistry, chat: ChatId, event: &LogEvent) {
    let session = match sessions.get().await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "remote log skipped: no session");
            return;
        }
    };
    let opts = SendOptions {
        thread: event.thread,
        markdown: true,
        ..SendOptions::default()
    };
    if let Err(e) = session.client().send_text(chat, &event.render(), opts).await {
        tracing::warn!(error = %e, "remote log delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Credentials;
    use crate::testkit::{FakeAuthenticator, Sent};
    use std::sync::Arc;

    fn sessions(auth: &Arc<FakeAuthenticator>) -> SessionRegistry {
        SessionRegistry::new(Credentials::new("1:t"), auth.clone(), None)
    }

    #[test]
    fn render_uses_emoji_and_label() {
        let ev = LogEvent {
            severity: Severity::Warn,
            message: "cooldown".into(),
            at: SystemTime::now(),
            thread: None,
        };
        assert_eq!(ev.render(), "⚠️ *[WARNING]* - cooldown");
    }

    #[test]
    fn render_escapes_message_markup() {
        let ev = LogEvent {
            severity: Severity::Info,
            message: "Feature bio_sync started".into(),
            at: SystemTime::now(),
            thread: None,
        };
        let text = ev.render();
        assert_eq!(text, "ℹ️ *[INFO]* - Feature bio\\_sync started");
        let bare = text
            .char_indices()
            .filter(|&(i, c)| c == '_' && !text[..i].ends_with('\\'))
            .count();
        assert_eq!(bare, 0);

        let ev = LogEvent {
            message: "Bio updated: *NSYNC – [Live]".into(),
            ..ev
        };
        assert_eq!(ev.render(), "ℹ️ *[INFO]* - Bio updated: \\*NSYNC – \\[Live]");
    }

    #[tokio::test]
    async fn overflow_drops_instead_of_blocking() {
        let (sink, mut rx) = LogSink::channel(1);
        sink.info("first");
        sink.info("second");

        assert_eq!(rx.recv().await.unwrap().message, "first");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn topic_clones_carry_their_thread() {
        let (sink, mut rx) = LogSink::channel(4);
        sink.topic(Some(42)).error("boom");

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.thread, Some(42));
        assert_eq!(ev.severity, Severity::Error);
    }

    #[test]
    fn disabled_sink_accepts_everything() {
        LogSink::disabled().critical("nobody listens");
    }

    #[tokio::test]
    async fn worker_posts_to_log_chat_and_flushes_on_shutdown() {
        let auth = FakeAuthenticator::arc();
        let (sink, worker) = LogSink::spawn(sessions(&auth), -100, 8);

        sink.topic(Some(5)).info("hello");
        sink.warn("careful");
        worker.shutdown(Duration::from_secs(5)).await;

        let sent = auth.messenger().sent();
        assert_eq!(
            sent,
            vec![
                Sent::Text {
                    chat: -100,
                    text: "ℹ️ *[INFO]* - hello".into(),
                    opts: SendOptions {
                        thread: Some(5),
                        markdown: true,
                        reply_to: None
                    },
                },
                Sent::Text {
                    chat: -100,
                    text: "⚠️ *[WARNING]* - careful".into(),
                    opts: SendOptions {
                        thread: None,
                        markdown: true,
                        reply_to: None
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn delivery_failures_are_swallowed() {
        let auth = FakeAuthenticator::arc();
        auth.messenger().fail_sends(true);
        let (sink, worker) = LogSink::spawn(sessions(&auth), 1, 8);

        sink.error("lost");
        sink.info("also lost");
        worker.shutdown(Duration::from_secs(5)).await;

        assert!(auth.messenger().sent().is_empty());
    }
}
