//! In-memory fakes for the external collaborators (test builds only).

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::error::AuthError;
use crate::messenger::{
    ChatId, Identity, InboundMessage, MessageId, Messenger, MessengerError, SendOptions, Update,
};
use crate::pipeline::{
    AudioStream, Catalog, CatalogError, NowPlaying, PlaybackState, TagError, Tagger, TrackMeta,
};
use crate::session::{Authenticator, Credentials};

/// Sorted file names in `dir` (empty when the dir does not exist).
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ---------------------------
// Messenger
// ---------------------------

/// Every side effect the fake messenger observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat: ChatId,
        text: String,
        opts: SendOptions,
    },
    Edit {
        chat: ChatId,
        message: MessageId,
        text: String,
    },
    Delete {
        chat: ChatId,
        message: MessageId,
    },
    Audio {
        chat: ChatId,
        caption: String,
        opts: SendOptions,
        /// The file was on disk at upload time.
        existed: bool,
    },
    Reaction {
        chat: ChatId,
        message: MessageId,
        emoji: String,
    },
    Bio(String),
}

#[derive(Default)]
pub struct FakeMessenger {
    log: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    bio: Mutex<String>,
    updates: Mutex<VecDeque<Update>>,
    next_update: AtomicI64,
    bio_rate_limit: Mutex<Option<Duration>>,
    fail_sends: AtomicBool,
    fail_uploads: AtomicBool,
    stall_uploads: AtomicBool,
    revoked: AtomicBool,
}

impl FakeMessenger {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.log.lock().unwrap().clone()
    }

    /// Texts of all edits applied to `message`, in order.
    pub fn edits(&self, chat: ChatId, message: MessageId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Edit { chat: c, message: m, text } if c == chat && m == message => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Texts of plain messages sent to `chat`.
    pub fn texts(&self, chat: ChatId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { chat: c, text, .. } if c == chat => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn current_bio(&self) -> String {
        self.bio.lock().unwrap().clone()
    }

    pub fn put_bio(&self, bio: &str) {
        *self.bio.lock().unwrap() = bio.to_string();
    }

    pub fn push_message(&self, message: InboundMessage) {
        let id = self.next_update.fetch_add(1, Ordering::SeqCst) + 1;
        let mut queue = self.updates.lock().unwrap();
        queue.push_back(Update {
            id,
            message: Some(message),
        });
    }

    pub fn fail_sends(&self, on: bool) {
        self.fail_sends.store(on, Ordering::SeqCst);
    }

    pub fn fail_uploads(&self, on: bool) {
        self.fail_uploads.store(on, Ordering::SeqCst);
    }

    pub fn stall_uploads(&self, on: bool) {
        self.stall_uploads.store(on, Ordering::SeqCst);
    }

    /// Next `set_bio` answers with flood control.
    pub fn rate_limit_bio(&self, retry_after: Duration) {
        *self.bio_rate_limit.lock().unwrap() = Some(retry_after);
    }

    /// Every call fails as unauthorized from now on.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    fn record(&self, sent: Sent) {
        self.log.lock().unwrap().push(sent);
    }

    fn id(&self) -> MessageId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1000
    }

    fn check(&self) -> Result<(), MessengerError> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(MessengerError::Unauthorized("revoked".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn me(&self) -> Result<Identity, MessengerError> {
        self.check()?;
        Ok(FakeAuthenticator::default_identity())
    }

    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError> {
        self.check()?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MessengerError::Transport("send refused".into()));
        }
        self.record(Sent::Text {
            chat,
            text: text.to_string(),
            opts,
        });
        Ok(self.id())
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), MessengerError> {
        self.check()?;
        self.record(Sent::Edit {
            chat,
            message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> Result<(), MessengerError> {
        self.check()?;
        self.record(Sent::Delete { chat, message });
        Ok(())
    }

    async fn send_audio(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError> {
        self.check()?;
        if self.stall_uploads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(MessengerError::Api {
                code: 413,
                description: "Request Entity Too Large".into(),
            });
        }
        self.record(Sent::Audio {
            chat,
            caption: caption.to_string(),
            opts,
            existed: path.exists(),
        });
        Ok(self.id())
    }

    async fn react(
        &self,
        chat: ChatId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), MessengerError> {
        self.check()?;
        self.record(Sent::Reaction {
            chat,
            message,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn set_bio(&self, text: &str) -> Result<(), MessengerError> {
        self.check()?;
        if let Some(retry_after) = self.bio_rate_limit.lock().unwrap().take() {
            return Err(MessengerError::RateLimited { retry_after });
        }
        *self.bio.lock().unwrap() = text.to_string();
        self.record(Sent::Bio(text.to_string()));
        Ok(())
    }

    async fn bio(&self) -> Result<String, MessengerError> {
        self.check()?;
        Ok(self.current_bio())
    }

    async fn next_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, MessengerError> {
        self.check()?;
        let batch: Vec<Update> = {
            let mut queue = self.updates.lock().unwrap();
            queue.retain(|u| u.id >= offset);
            queue.drain(..).collect()
        };
        if batch.is_empty() {
            tokio::time::sleep(timeout.min(Duration::from_millis(20))).await;
        }
        Ok(batch)
    }
}

// ---------------------------
// Authenticator
// ---------------------------

pub struct FakeAuthenticator {
    messenger: Arc<FakeMessenger>,
    logins: AtomicUsize,
    delay: Mutex<Duration>,
    failure: Mutex<Option<AuthError>>,
}

impl FakeAuthenticator {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self {
            messenger: FakeMessenger::arc(),
            logins: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
        })
    }

    pub fn default_identity() -> Identity {
        Identity {
            user_id: 1000,
            username: Some("owner".into()),
        }
    }

    pub fn identity(&self) -> Identity {
        Self::default_identity()
    }

    pub fn messenger(&self) -> Arc<FakeMessenger> {
        Arc::clone(&self.messenger)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn reject(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(AuthError::Rejected(reason.to_string()));
    }

    /// Logins fail as if the platform were unreachable.
    pub fn outage(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(AuthError::Unavailable(reason.to_string()));
    }

    pub fn accept(&self) {
        *self.failure.lock().unwrap() = None;
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, _credentials: &Credentials) -> Result<Identity, AuthError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.failure.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.identity())
    }

    fn connect(&self, _credentials: &Credentials) -> Arc<dyn Messenger> {
        self.messenger()
    }
}

// ---------------------------
// Catalog / playback / tagging
// ---------------------------

pub struct FakeCatalog {
    tracks: Mutex<BTreeMap<String, TrackMeta>>,
    search: Mutex<Option<Vec<String>>>,
    cover: Mutex<Option<Vec<u8>>>,
    search_error: Mutex<Option<CatalogError>>,
    broken_streams: AtomicU32,
    streams_opened: AtomicU32,
    stall_streams: AtomicBool,
    gate: Mutex<Option<Arc<tokio::sync::Barrier>>>,
}

impl FakeCatalog {
    const AUDIO: &'static [u8] = b"ID3fake-mp3-frames-0123456789";

    pub fn with_track(id: &str, title: &str, artist: &str) -> Self {
        let catalog = Self {
            tracks: Mutex::new(BTreeMap::new()),
            search: Mutex::new(None),
            cover: Mutex::new(Some(vec![0xFF, 0xD8, 0xFF, 0xE0])),
            search_error: Mutex::new(None),
            broken_streams: AtomicU32::new(0),
            streams_opened: AtomicU32::new(0),
            stall_streams: AtomicBool::new(false),
            gate: Mutex::new(None),
        };
        catalog.add_track(id, title, artist);
        catalog
    }

    pub fn add_track(&self, id: &str, title: &str, artist: &str) {
        self.tracks.lock().unwrap().insert(
            id.to_string(),
            TrackMeta {
                id: id.to_string(),
                title: title.to_string(),
                artists: vec![artist.to_string()],
                album: None,
                cover_uri: Some(format!("covers/{id}/%%")),
                duration_ms: Some(180_000),
            },
        );
    }

    /// Search answers with these ids, in order.
    pub fn set_search(&self, ids: &[&str]) {
        *self.search.lock().unwrap() = Some(ids.iter().map(|s| s.to_string()).collect());
    }

    /// Every search fails with `error`.
    pub fn fail_search(&self, error: CatalogError) {
        *self.search_error.lock().unwrap() = Some(error);
    }

    pub fn set_cover(&self, cover: Option<Vec<u8>>) {
        *self.cover.lock().unwrap() = cover;
    }

    /// The next `n` streams fail after their first chunk.
    pub fn break_streams(&self, n: u32) {
        self.broken_streams.store(n, Ordering::SeqCst);
    }

    /// Streams never deliver anything after their first chunk.
    pub fn stall_streams(&self, on: bool) {
        self.stall_streams.store(on, Ordering::SeqCst);
    }

    /// Streams wait on the returned barrier between their first and second
    /// chunk; it opens once `n` parties (streams and the test) arrive.
    pub fn gate_streams(&self, n: usize) -> Arc<tokio::sync::Barrier> {
        let gate = Arc::new(tokio::sync::Barrier::new(n));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn streams_opened(&self) -> u32 {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub fn audio(&self) -> Vec<u8> {
        Self::AUDIO.to_vec()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMeta>, CatalogError> {
        if let Some(e) = self.search_error.lock().unwrap().clone() {
            return Err(e);
        }
        let tracks = self.tracks.lock().unwrap();
        let hits: Vec<TrackMeta> = match &*self.search.lock().unwrap() {
            Some(ids) => ids.iter().filter_map(|id| tracks.get(id).cloned()).collect(),
            None => {
                let q = query.to_lowercase();
                tracks
                    .values()
                    .filter(|t| q.contains(&t.title.to_lowercase()))
                    .cloned()
                    .collect()
            }
        };
        Ok(hits.into_iter().take(limit).collect())
    }

    async fn track(&self, id: &str) -> Result<TrackMeta, CatalogError> {
        self.tracks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("track {id}")))
    }

    async fn open_stream(&self, id: &str) -> Result<AudioStream, CatalogError> {
        if !self.tracks.lock().unwrap().contains_key(id) {
            return Err(CatalogError::NotFound(format!("track {id}")));
        }
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let (head, tail) = Self::AUDIO.split_at(8);
        let broken = self
            .broken_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let second = if broken {
            Err(CatalogError::Transport("connection reset".into()))
        } else {
            Ok(Bytes::from_static(tail))
        };
        let gate = self.gate.lock().unwrap().clone();
        let stall = self.stall_streams.load(Ordering::SeqCst);
        let rest = futures::stream::once(async move {
            if let Some(gate) = gate {
                gate.wait().await;
            }
            if stall {
                futures::future::pending::<()>().await;
            }
            second
        });
        Ok(futures::stream::once(async move { Ok(Bytes::from_static(head)) })
            .chain(rest)
            .boxed())
    }

    async fn cover(&self, _meta: &TrackMeta) -> Result<Option<Vec<u8>>, CatalogError> {
        Ok(self.cover.lock().unwrap().clone())
    }
}

pub struct FakePlayback {
    state: Mutex<Result<Option<NowPlaying>, CatalogError>>,
}

impl FakePlayback {
    pub fn idle() -> Self {
        Self {
            state: Mutex::new(Ok(None)),
        }
    }

    pub fn play(&self, track_id: &str, progress_ms: u64, duration_ms: u64) {
        *self.state.lock().unwrap() = Ok(Some(NowPlaying {
            track_id: track_id.to_string(),
            progress_ms,
            duration_ms,
            paused: false,
        }));
    }

    pub fn stop(&self) {
        *self.state.lock().unwrap() = Ok(None);
    }

    pub fn fail(&self, error: CatalogError) {
        *self.state.lock().unwrap() = Err(error);
    }
}

#[async_trait]
impl PlaybackState for FakePlayback {
    async fn current(&self) -> Result<Option<NowPlaying>, CatalogError> {
        self.state.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeTagger {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTagger {
    pub fn fail(&self, on: bool) {
        self.fail.store(on, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tagger for FakeTagger {
    async fn tag(&self, path: &Path, _meta: &TrackMeta, _cover: Option<&[u8]>) -> Result<(), TagError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TagError("unsupported container".into()));
        }
        if !path.exists() {
            return Err(TagError(format!("{} missing", path.display())));
        }
        Ok(())
    }
}

/// Inbound private message from someone else.
pub fn incoming(chat: ChatId, message: MessageId, sender: i64, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: chat,
        message_id: message,
        sender_id: sender,
        text: text.to_string(),
        outgoing: false,
        private: true,
    }
}

/// Private message written by the owner.
pub fn outgoing(chat: ChatId, message: MessageId, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: chat,
        message_id: message,
        sender_id: FakeAuthenticator::default_identity().user_id,
        text: text.to_string(),
        outgoing: true,
        private: true,
    }
}
