//! # Inbound event router.
//!
//! Long-polls the messenger and runs every message through three independent
//! matchers concurrently:
//!
//! ```text
//! next_updates ─► message ─┬─► command  (owner, private)  ─► supervisor / pipeline ─► reply
//!                          ├─► track link (not a command) ─► acquire ─► deliver
//!                          └─► trigger phrase (incoming, private) ─► TriggerHub ─► listener
//! ```
//!
//! ## Rules
//! - Each message is handled in its own task; a slow download never delays
//!   polling or other messages.
//! - Every command gets exactly one reply (`dl` adds a "searching" notice).
//! - Poll failures back off; a revoked session is re-established, and only an
//!   authentication failure ends [`EventRouter::run`].
//! - On shutdown in-flight handlers get `drain_grace`, then are aborted;
//!   their files are removed by the delivery guard.

mod commands;
mod triggers;

pub use commands::{Command, HELP, SEARCH_SHOWN, escape_markdown, render_search, render_status};
pub use triggers::{TriggerGuard, TriggerHub, TriggerListener};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::{StartOutcome, StopOutcome, Supervisor};
use crate::error::{AuthError, SupervisorError};
use crate::features::{AUTO_REPLY, BIO_SYNC};
use crate::logsink::LogSink;
use crate::messenger::{InboundMessage, MessengerError, SendOptions};
use crate::pipeline::{
    Courier, Destination, Pipeline, SEARCH_LIMIT, TrackRequest, find_track_link,
};
use crate::policies::BackoffPolicy;
use crate::session::SessionRegistry;

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Long-poll timeout handed to the messenger.
    pub poll_timeout: Duration,
    /// How long in-flight handlers may finish after shutdown was requested.
    pub drain_grace: Duration,
    /// Delay schedule after failed polls.
    pub poll_backoff: BackoffPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(25),
            drain_grace: Duration::from_secs(10),
            poll_backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(60),
                ..BackoffPolicy::default()
            },
        }
    }
}

pub struct EventRouter {
    cfg: RouterConfig,
    sessions: SessionRegistry,
    supervisor: Arc<Supervisor>,
    pipeline: Arc<Pipeline>,
    courier: Courier,
    hub: Arc<TriggerHub>,
    sink: LogSink,
}

impl EventRouter {
    pub fn new(
        cfg: RouterConfig,
        sessions: SessionRegistry,
        supervisor: Arc<Supervisor>,
        pipeline: Arc<Pipeline>,
        courier: Courier,
        hub: Arc<TriggerHub>,
        sink: LogSink,
    ) -> Self {
        Self {
            cfg,
            sessions,
            supervisor,
            pipeline,
            courier,
            hub,
            sink,
        }
    }

    /// Polls and dispatches until `ctx` is cancelled.
    pub async fn run(self: Arc<Self>, ctx: CancellationToken) -> Result<(), AuthError> {
        let mut offset = 0i64;
        let mut failures = 0u32;
        let mut inflight = JoinSet::new();

        let result = loop {
            reap(&mut inflight);

            let session = tokio::select! {
                biased;
                _ = ctx.cancelled() => break Ok(()),
                session = self.sessions.get() => session,
            };
            let polled = match session {
                Ok(session) => tokio::select! {
                    biased;
                    _ = ctx.cancelled() => break Ok(()),
                    polled = session.client().next_updates(offset, self.cfg.poll_timeout) => polled,
                },
                Err(AuthError::Unavailable(reason)) => Err(MessengerError::Transport(reason)),
                Err(e) => break Err(e),
            };

            let pause = match polled {
                Ok(updates) => {
                    failures = 0;
                    for update in updates {
                        offset = offset.max(update.id + 1);
                        if let Some(msg) = update.message {
                            let this = Arc::clone(&self);
                            inflight.spawn(async move { this.handle(msg).await });
                        }
                    }
                    continue;
                }
                Err(MessengerError::RateLimited { retry_after }) => retry_after,
                Err(e) => {
                    if matches!(e, MessengerError::Unauthorized(_)) {
                        self.sessions.invalidate().await;
                    }
                    let pause = self.cfg.poll_backoff.next(failures);
                    failures = failures.saturating_add(1);
                    tracing::warn!(error = %e, ?pause, failures, "polling failed");
                    pause
                }
            };
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break Ok(()),
                _ = tokio::time::sleep(pause) => {}
            }
        };

        self.drain(inflight).await;
        result
    }

    /// Runs all matchers for one message.
    pub async fn handle(&self, msg: InboundMessage) {
        let command = (msg.outgoing && msg.private)
            .then(|| Command::parse(&msg.text))
            .flatten();
        let link = (command.is_none())
            .then(|| find_track_link(&msg.text))
            .flatten();
        let trigger = msg.private && !msg.outgoing;

        tokio::join!(
            async {
                if let Some(cmd) = command {
                    self.on_command(&msg, cmd).await;
                }
            },
            async {
                if let Some(link) = link {
                    self.fetch_and_send(&msg, TrackRequest::Url(link.to_string()))
                        .await;
                }
            },
            async {
                if trigger {
                    self.hub.dispatch(&msg).await;
                }
            },
        );
    }

    async fn on_command(&self, msg: &InboundMessage, cmd: Command) {
        tracing::info!(command = ?cmd, chat = msg.chat_id, "command received");
        match cmd {
            Command::StartAutoReply => self.start_feature(msg, AUTO_REPLY, "Magic heart").await,
            Command::StopAutoReply => self.stop_feature(msg, AUTO_REPLY, "Magic heart").await,
            Command::StartYmSync => self.start_feature(msg, BIO_SYNC, "Yandex sync").await,
            Command::StopYmSync => self.stop_feature(msg, BIO_SYNC, "Yandex sync").await,
            Command::StopAll => {
                let stopped = self.supervisor.stop_all().await;
                let text = if stopped.is_empty() {
                    "Nothing was running".to_string()
                } else {
                    format!("All features stopped ({})", stopped.len())
                };
                self.reply(msg, &text).await;
            }
            Command::Status => {
                let status = self.supervisor.status().await;
                self.reply(msg, &render_status(&status)).await;
            }
            Command::Help => self.reply(msg, HELP).await,
            Command::Search(query) if query.is_empty() => {
                self.reply(msg, "Usage: /search <query>").await;
            }
            Command::Search(query) => {
                let text = match self.pipeline.catalog().search(&query, SEARCH_LIMIT).await {
                    Ok(hits) => render_search(&query, &hits),
                    Err(e) => {
                        self.sink.error(format!("Search for {query} failed: {e}"));
                        format!("❌ Search failed: {}", escape_markdown(&e.to_string()))
                    }
                };
                self.reply(msg, &text).await;
            }
            Command::Dl(None) => {
                self.fetch_and_send(msg, TrackRequest::CurrentlyPlaying).await;
            }
            Command::Dl(Some(arg)) => {
                self.reply(msg, &format!("🔍 Searching for: {}", escape_markdown(&arg)))
                    .await;
                self.fetch_and_send(msg, TrackRequest::from_text(&arg)).await;
            }
        }
    }

    async fn start_feature(&self, msg: &InboundMessage, name: &str, label: &str) {
        let text = match self.supervisor.start(name).await {
            Ok(StartOutcome::Started) => format!("{label} started"),
            Ok(StartOutcome::AlreadyRunning) => format!("{label} is already running"),
            Err(e) => format!("❌ {}", escape_markdown(&e.to_string())),
        };
        self.reply(msg, &text).await;
    }

    async fn stop_feature(&self, msg: &InboundMessage, name: &str, label: &str) {
        let text = match self.supervisor.stop(name).await {
            Ok(StopOutcome::Stopped) => format!("{label} stopped"),
            Ok(StopOutcome::Terminated) => format!("{label} stopped (terminated after grace period)"),
            Err(SupervisorError::NotRunning(_)) => format!("{label} is not running"),
            Err(e) => format!("❌ {}", escape_markdown(&e.to_string())),
        };
        self.reply(msg, &text).await;
    }

    /// Acquire, then deliver as a reply. Each failure is logged once and answered once.
    async fn fetch_and_send(&self, msg: &InboundMessage, request: TrackRequest) {
        let track = match self.pipeline.acquire(request).await {
            Ok(track) => track,
            Err(e) => {
                self.sink.error(format!("Track request failed: {e}"));
                self.reply(msg, &format!("❌ {}", escape_markdown(&e.to_string())))
                    .await;
                return;
            }
        };
        tracing::info!(track = %track.meta().id, tagged = track.tagging_ok(), "track acquired");

        let dest = Destination::reply(msg.chat_id, msg.message_id);
        if let Err(e) = self.courier.deliver(track, dest).await {
            self.reply(msg, &format!("❌ Upload failed: {}", escape_markdown(&e.to_string())))
                .await;
        }
    }

    async fn reply(&self, msg: &InboundMessage, text: &str) {
        let opts = SendOptions {
            reply_to: Some(msg.message_id),
            markdown: true,
            ..SendOptions::default()
        };
        let sent = match self.sessions.get().await {
            Ok(session) => session
                .client()
                .send_text(msg.chat_id, text, opts)
                .await
                .map(drop)
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            tracing::warn!(chat = msg.chat_id, error = %e, "reply not sent");
        }
    }

    async fn drain(&self, mut inflight: JoinSet<()>) {
        if inflight.is_empty() {
            return;
        }
        tracing::info!(handlers = inflight.len(), "waiting for in-flight handlers");
        let drained = tokio::time::timeout(self.cfg.drain_grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(handlers = inflight.len(), "handlers overran, aborting");
            inflight.abort_all();
            while inflight.join_next().await.is_some() {}
        }
    }
}

fn reap(inflight: &mut JoinSet<()>) {
    while let Some(done) = inflight.try_join_next() {
        if let Err(e) = done {
            if e.is_panic() {
                tracing::error!(error = %e, "message handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeatureState, SupervisorBuilder, SupervisorConfig};
    use crate::error::TaskError;
    use crate::features::{Animator, AutoReply};
    use crate::features::animation::{DEFAULT_COOLDOWN, Timing};
    use crate::pipeline::{CatalogError, Downloads};
    use crate::session::Credentials;
    use crate::tasks::TaskFn;
    use crate::testkit::{
        FakeAuthenticator, FakeCatalog, FakeMessenger, FakePlayback, FakeTagger, Sent,
        dir_entries, incoming, outgoing,
    };

    struct Rig {
        router: Arc<EventRouter>,
        messenger: Arc<FakeMessenger>,
        catalog: Arc<FakeCatalog>,
        playback: Arc<FakePlayback>,
        supervisor: Arc<Supervisor>,
        downloads: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let auth = FakeAuthenticator::arc();
        let messenger = auth.messenger();
        let sessions = SessionRegistry::new(Credentials::new("token"), auth, None);
        let sink = LogSink::disabled();

        let catalog = Arc::new(FakeCatalog::with_track("42", "Title", "Artist"));
        let playback = Arc::new(FakePlayback::idle());
        let downloads = dir.path().join("downloads");
        let pipeline = Arc::new(Pipeline::new(
            catalog.clone(),
            playback.clone(),
            Arc::new(FakeTagger::default()),
            Downloads::new(&downloads),
            sink.clone(),
        ));

        let hub = Arc::new(TriggerHub::new(["magic", "ily"]));
        let animator = Animator::with_timing(
            sessions.clone(),
            sink.clone(),
            Timing::default(),
            DEFAULT_COOLDOWN,
        );
        let idle = TaskFn::arc(BIO_SYNC, |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Ok::<_, TaskError>(())
        });
        let supervisor = SupervisorBuilder::new(SupervisorConfig::default())
            .with_feature(Arc::new(AutoReply::new(sessions.clone(), hub.clone(), animator)))
            .with_feature(idle)
            .build();

        let router = Arc::new(EventRouter::new(
            RouterConfig::default(),
            sessions.clone(),
            supervisor.clone(),
            pipeline,
            Courier::new(sessions, sink.clone()),
            hub,
            sink,
        ));
        Rig {
            router,
            messenger,
            catalog,
            playback,
            supervisor,
            downloads,
            _dir: dir,
        }
    }

    fn audio_captions(messenger: &FakeMessenger) -> Vec<String> {
        messenger
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Audio { caption, existed: true, .. } => Some(caption),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn start_and_stop_commands_reply_once_each() {
        let rig = rig();

        rig.router.handle(outgoing(5, 1, "/start_ym_sync")).await;
        rig.router.handle(outgoing(5, 2, "/start_ym_sync")).await;
        assert_eq!(rig.supervisor.state(BIO_SYNC).await, Some(FeatureState::Running));

        rig.router.handle(outgoing(5, 3, "stop_ym_sync")).await;
        rig.router.handle(outgoing(5, 4, "/stop_ym_sync")).await;

        assert_eq!(
            rig.messenger.texts(5),
            vec![
                "Yandex sync started",
                "Yandex sync is already running",
                "Yandex sync stopped",
                "Yandex sync is not running",
            ]
        );
    }

    #[tokio::test]
    async fn status_and_help() {
        let rig = rig();
        rig.router.handle(outgoing(5, 1, "/status")).await;
        rig.router.handle(outgoing(5, 2, "/start_auto_reply")).await;
        rig.router.handle(outgoing(5, 3, "/status")).await;
        rig.router.handle(outgoing(5, 4, "/help")).await;

        let texts = rig.messenger.texts(5);
        assert_eq!(texts[0], "No features are currently running");
        assert!(texts[2].contains("✅ auto\\_reply - running"));
        assert!(texts[2].contains("⏹ bio\\_sync - stopped"));
        assert_eq!(texts[3], HELP);
    }

    #[tokio::test]
    async fn commands_from_others_are_ignored() {
        let rig = rig();
        rig.router.handle(incoming(5, 1, 5, "/start_ym_sync")).await;
        assert_eq!(rig.supervisor.state(BIO_SYNC).await, Some(FeatureState::Stopped));
        assert!(rig.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn link_is_downloaded_sent_and_removed() {
        let rig = rig();
        rig.router
            .handle(incoming(9, 77, 9, "listen https://music.yandex.ru/album/1/track/42"))
            .await;

        assert_eq!(audio_captions(&rig.messenger), vec!["Artist – Title"]);
        assert!(dir_entries(&rig.downloads).is_empty());
    }

    #[tokio::test]
    async fn dl_with_query_searches_then_delivers_once() {
        let rig = rig();
        rig.router
            .handle(outgoing(5, 1, "/dl https://music.yandex.ru/track/42"))
            .await;

        assert_eq!(
            rig.messenger.texts(5)[0],
            "🔍 Searching for: https://music.yandex.ru/track/42"
        );
        assert_eq!(audio_captions(&rig.messenger).len(), 1);
        assert!(dir_entries(&rig.downloads).is_empty());
    }

    #[tokio::test]
    async fn dl_without_playback_replies_with_error() {
        let rig = rig();
        rig.router.handle(outgoing(5, 1, "/dl")).await;

        assert_eq!(rig.messenger.texts(5), vec!["❌ nothing is playing right now"]);
        assert!(dir_entries(&rig.downloads).is_empty());

        rig.playback.play("42", 1_000, 180_000);
        rig.router.handle(outgoing(5, 2, "/dl")).await;
        assert_eq!(audio_captions(&rig.messenger), vec!["Artist – Title"]);
    }

    #[tokio::test]
    async fn search_lists_hits() {
        let rig = rig();
        rig.catalog.add_track("43", "Other", "Someone");
        rig.catalog.set_search(&["42", "43"]);

        rig.router.handle(outgoing(5, 1, "/search title")).await;
        let texts = rig.messenger.texts(5);
        assert!(texts[0].contains("1. *Title*"));
        assert!(texts[0].contains("2. *Other*"));
    }

    #[tokio::test]
    async fn search_failure_reply_is_escaped() {
        let rig = rig();
        rig.catalog
            .fail_search(CatalogError::Unavailable("region_locked *beta*".into()));

        rig.router.handle(outgoing(5, 1, "/search title")).await;
        assert_eq!(
            rig.messenger.texts(5),
            vec!["❌ Search failed: unavailable: region\\_locked \\*beta\\*".to_string()]
        );
    }

    #[tokio::test]
    async fn upload_failure_is_answered_and_file_removed() {
        let rig = rig();
        rig.messenger.fail_uploads(true);
        rig.router
            .handle(incoming(9, 77, 9, "https://music.yandex.ru/track/42"))
            .await;

        let texts = rig.messenger.texts(9);
        assert!(texts.last().unwrap().starts_with("❌ Upload failed"));
        assert!(dir_entries(&rig.downloads).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_reaches_auto_reply_only_while_running() {
        let rig = rig();
        rig.router.handle(incoming(7, 70, 7, "magic")).await;
        assert!(rig.messenger.sent().is_empty());

        rig.router.handle(outgoing(5, 1, "/start_auto_reply")).await;
        rig.router.handle(incoming(7, 71, 7, "Magic")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let replied = rig.messenger.sent().into_iter().any(|s| {
            matches!(s, Sent::Text { chat: 7, opts, .. } if opts.reply_to == Some(71))
        });
        assert!(replied);
    }

    #[tokio::test]
    async fn run_polls_until_cancelled() {
        let rig = rig();
        let ctx = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&rig.router).run(ctx.clone()));

        rig.messenger.push_message(outgoing(5, 1, "/status"));
        tokio::time::timeout(Duration::from_secs(2), async {
            while rig.messenger.texts(5).is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.cancel();
        assert_eq!(handle.await.unwrap(), Ok(()));
    }
}
