//! # Process wiring.
//!
//! ```text
//! Config ─► Collaborators ─► App::new ─► SessionRegistry, LogSink worker,
//!                                        Pipeline, Supervisor{auto_reply, bio_sync},
//!                                        EventRouter
//! App::run: login (fatal) ─► router until shutdown ─► stop features ─► flush log
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clients::{Id3Tagger, TelegramAuthenticator, YandexMusic, Ynison};
use crate::config::Config;
use crate::core::{SupervisorBuilder, SupervisorConfig, Supervisor};
use crate::error::{AuthError, ConfigError};
use crate::features::{Animator, AutoReply, BioStore, BioSync};
use crate::logsink::{LogSink, SinkWorker};
use crate::pipeline::{Catalog, Courier, Downloads, Pipeline, PlaybackState, Tagger};
use crate::router::{EventRouter, RouterConfig, TriggerHub};
use crate::session::{Authenticator, Credentials, SessionRegistry, SessionStore};
use crate::subscribers::{LogWriter, RemoteLogForwarder, Subscribe};

const LOG_QUEUE: usize = 256;
const LOG_FLUSH: Duration = Duration::from_secs(5);

/// The external services the controller talks to.
pub struct Collaborators {
    pub auth: Arc<dyn Authenticator>,
    pub catalog: Arc<dyn Catalog>,
    pub playback: Arc<dyn PlaybackState>,
    pub tagger: Arc<dyn Tagger>,
}

impl Collaborators {
    /// Telegram Bot API, Yandex Music, Ynison and ID3 tagging.
    pub fn production(cfg: &Config) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tunevisor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http client",
                reason: e.to_string(),
            })?;
        let token = cfg.yandex_music_auth_token.clone();
        Ok(Self {
            auth: Arc::new(TelegramAuthenticator::new(
                http.clone(),
                cfg.telegram_api.clone(),
                cfg.owner_chat_id,
            )),
            catalog: Arc::new(YandexMusic::new(http.clone(), cfg.yandex_api.clone(), token.clone())),
            playback: Arc::new(Ynison::new(http, format!("{}/", cfg.yandex_api), token)),
            tagger: Arc::new(Id3Tagger),
        })
    }
}

pub struct App {
    sessions: SessionRegistry,
    supervisor: Arc<Supervisor>,
    router: Arc<EventRouter>,
    sink: LogSink,
    sink_worker: SinkWorker,
}

impl App {
    /// Builds every component. Must be called inside a tokio runtime.
    pub fn new(cfg: &Config, parts: Collaborators) -> Self {
        let store = cfg.session_path().map(SessionStore::new);
        let sessions = SessionRegistry::new(Credentials::new(cfg.bot_token.clone()), parts.auth, store);
        let (sink, sink_worker) = LogSink::spawn(sessions.clone(), cfg.log_chat(), LOG_QUEUE);
        let music = sink.topic(cfg.music_topic());

        let pipeline = Arc::new(Pipeline::new(
            parts.catalog,
            parts.playback,
            parts.tagger,
            Downloads::new(&cfg.download_dir),
            music.clone(),
        ));
        let hub = Arc::new(TriggerHub::new(&cfg.magic_phrases));

        let animation_log = sink.topic(cfg.auto_reply_topic());
        let auto_reply = AutoReply::new(
            sessions.clone(),
            Arc::clone(&hub),
            Animator::new(sessions.clone(), animation_log),
        );
        let bio_sync = BioSync::new(
            sessions.clone(),
            Arc::clone(&pipeline),
            BioStore::new(&cfg.bio_store_file, cfg.initial_bio.clone()),
            cfg.bio_sync_interval(),
            sink.topic(cfg.ym_topic()),
        )
        .with_change_log(sink.topic(cfg.bio_topic()));

        let subscribers: Vec<Arc<dyn Subscribe>> = vec![
            Arc::new(LogWriter),
            Arc::new(RemoteLogForwarder::new(sink.clone())),
        ];
        let supervisor = SupervisorBuilder::new(SupervisorConfig {
            grace: cfg.stop_grace(),
            ..SupervisorConfig::default()
        })
        .with_subscribers(subscribers)
        .with_feature(Arc::new(auto_reply))
        .with_feature(Arc::new(bio_sync))
        .build();

        let router = Arc::new(EventRouter::new(
            RouterConfig {
                drain_grace: cfg.stop_grace(),
                ..RouterConfig::default()
            },
            sessions.clone(),
            Arc::clone(&supervisor),
            Arc::clone(&pipeline),
            Courier::new(sessions.clone(), music.clone()),
            hub,
            music,
        ));

        Self {
            sessions,
            supervisor,
            router,
            sink,
            sink_worker,
        }
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Logs in, serves until `shutdown` resolves (or the session is lost for
    /// good), then stops every feature and flushes the remote log.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), AuthError> {
        let session = match self.sessions.get().await {
            Ok(session) => session,
            Err(e) => {
                self.sink_worker.shutdown(Duration::ZERO).await;
                return Err(e);
            }
        };
        let who = session
            .identity()
            .username
            .clone()
            .unwrap_or_else(|| session.identity().user_id.to_string());
        tracing::info!(account = %who, "logged in");
        self.sink.info(format!("Controller started as {who}"));
        drop(session);

        let ctx = CancellationToken::new();
        let mut router = tokio::spawn(Arc::clone(&self.router).run(ctx.clone()));

        let result = tokio::select! {
            _ = shutdown => {
                ctx.cancel();
                join_router(&mut router).await
            }
            res = &mut router => flatten(res),
        };
        if let Err(e) = &result {
            self.sink.critical(format!("Session lost: {e}"));
        }

        self.supervisor.shutdown().await;
        self.sink.info("Controller stopped");
        self.sink_worker.shutdown(LOG_FLUSH).await;
        result
    }
}

async fn join_router(
    router: &mut tokio::task::JoinHandle<Result<(), AuthError>>,
) -> Result<(), AuthError> {
    flatten(router.await)
}

fn flatten(res: Result<Result<(), AuthError>, tokio::task::JoinError>) -> Result<(), AuthError> {
    match res {
        Ok(inner) => inner,
        Err(e) => {
            tracing::error!(error = %e, "router task failed");
            Ok(())
        }
    }
}
