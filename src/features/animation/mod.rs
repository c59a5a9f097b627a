//! # Heart animation responder.
//!
//! Plays the [`frames`] script in reply to a trigger message.
//!
//! ```text
//! trigger(msg) ─► cooldown(sender)? ──busy──► ignored (warn)
//!                      │ free
//!                      ▼
//!              slot(chat) busy? ──yes──► cancel old run
//!                      │
//!                      ▼
//!              spawn run ─► reply ─► edit … edit ─► react on origin ─► free slot + cooldown
//! ```
//!
//! ## Rules
//! - One run per chat; a newer accepted trigger replaces the running one.
//! - A sender whose previous run is still going is ignored for `cooldown`
//!   after that trigger.
//! - [`Animator::cancel_all`] stops every run and waits for them.

pub mod frames;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::logsink::LogSink;
use crate::messenger::{ChatId, InboundMessage, MessageId, MessengerError, SendOptions};
use crate::router::TriggerListener;
use crate::session::SessionRegistry;

pub use frames::Timing;

/// Per-sender cooldown between triggers.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

/// What happened to a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    /// Started after cancelling the chat's running animation.
    Replaced,
    /// Same sender triggered again too soon.
    CoolingDown,
}

struct Slot {
    run: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct State {
    next_run: u64,
    slots: HashMap<ChatId, Slot>,
    /// sender → (run, triggered at)
    cooldowns: HashMap<i64, (u64, Instant)>,
    runs: JoinSet<()>,
}

struct Shared {
    sessions: SessionRegistry,
    sink: LogSink,
    timing: Timing,
    cooldown: Duration,
    state: Mutex<State>,
}

/// Cheap-to-clone handle to the responder.
#[derive(Clone)]
pub struct Animator {
    shared: Arc<Shared>,
}

impl Animator {
    pub fn new(sessions: SessionRegistry, sink: LogSink) -> Self {
        Self::with_timing(sessions, sink, Timing::default(), DEFAULT_COOLDOWN)
    }

    pub fn with_timing(
        sessions: SessionRegistry,
        sink: LogSink,
        timing: Timing,
        cooldown: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                sessions,
                sink,
                timing,
                cooldown,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Admits `msg` and starts its animation in the background.
    pub async fn trigger(&self, msg: &InboundMessage) -> Admission {
        let mut state = self.shared.state.lock().await;
        while state.runs.try_join_next().is_some() {}

        if let Some((_, at)) = state.cooldowns.get(&msg.sender_id) {
            if at.elapsed() < self.shared.cooldown {
                self.shared.sink.warn(format!(
                    "Ignoring abuse message from user ID [{id}](tg://openmessage?user_id={id})",
                    id = msg.sender_id
                ));
                return Admission::CoolingDown;
            }
        }

        state.next_run += 1;
        let run = state.next_run;
        let cancel = CancellationToken::new();

        let admission = match state.slots.insert(
            msg.chat_id,
            Slot {
                run,
                cancel: cancel.clone(),
            },
        ) {
            Some(old) => {
                old.cancel.cancel();
                Admission::Replaced
            }
            None => Admission::Started,
        };
        state.cooldowns.insert(msg.sender_id, (run, Instant::now()));

        self.shared.sink.info(format!(
            "Triggering magic heart for user ID [{id}](tg://openmessage?user_id={id})",
            id = msg.sender_id
        ));
        let shared = Arc::clone(&self.shared);
        let msg = msg.clone();
        state.runs.spawn(async move { shared.run(run, msg, cancel).await });
        admission
    }

    /// Cancels every animation and waits until all are gone.
    pub async fn cancel_all(&self) {
        let mut runs = {
            let mut state = self.shared.state.lock().await;
            for slot in state.slots.values() {
                slot.cancel.cancel();
            }
            state.slots.clear();
            state.cooldowns.clear();
            std::mem::take(&mut state.runs)
        };
        while runs.join_next().await.is_some() {}
    }

    /// Animations currently playing.
    pub async fn in_flight(&self) -> usize {
        self.shared.state.lock().await.slots.len()
    }
}

impl Shared {
    async fn run(self: Arc<Self>, run: u64, msg: InboundMessage, cancel: CancellationToken) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            played = self.play(&msg) => Some(played),
        };

        match outcome {
            None => tracing::debug!(chat = msg.chat_id, run, "animation replaced"),
            Some(Ok(())) => self.sink.info(format!(
                "✅ Completed magic heart sequence for user ID [{id}](tg://openmessage?user_id={id})",
                id = msg.sender_id
            )),
            Some(Err(e)) => self.sink.error(format!("Magic heart animation failed: {e}")),
        }

        let mut state = self.state.lock().await;
        if state.slots.get(&msg.chat_id).is_some_and(|s| s.run == run) {
            state.slots.remove(&msg.chat_id);
        }
        if state
            .cooldowns
            .get(&msg.sender_id)
            .is_some_and(|(r, _)| *r == run)
        {
            state.cooldowns.remove(&msg.sender_id);
        }
    }

    async fn play(&self, origin: &InboundMessage) -> Result<(), MessengerError> {
        let session = self
            .sessions
            .get()
            .await
            .map_err(|e| MessengerError::Unauthorized(e.to_string()))?;
        let client = session.client();
        let script = frames::script(&self.timing, &mut rand::rng());

        let mut canvas: Option<MessageId> = None;
        for (n, phase) in script.iter().enumerate() {
            for frame in &phase.frames {
                match canvas {
                    None => {
                        let id = client
                            .send_text(
                                origin.chat_id,
                                &frame.text,
                                SendOptions::reply_to(origin.message_id),
                            )
                            .await?;
                        canvas = Some(id);
                    }
                    Some(id) => client.edit_text(origin.chat_id, id, &frame.text).await?,
                }
                tokio::time::sleep(frame.hold).await;
            }
            tracing::debug!(chat = origin.chat_id, phase = phase.name, step = n, "animation phase done");
        }

        if let Err(e) = client
            .react(origin.chat_id, origin.message_id, frames::FINAL_REACTION)
            .await
        {
            self.sink.error(format!("Error sending emoji reaction: {e}"));
        }
        Ok(())
    }
}

#[async_trait]
impl TriggerListener for Animator {
    async fn on_trigger(&self, msg: &InboundMessage) {
        self.trigger(msg).await;
    }
}
