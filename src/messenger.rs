//! # Messaging platform seam.
//!
//! [`Messenger`] is everything the controller needs from the chat platform:
//! sending and editing messages, uploading audio, reactions, the profile bio
//! and a long-poll for inbound messages. The production adapter lives in
//! [`clients::telegram`](crate::clients::telegram); tests use an in-memory fake.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Chat identifier.
pub type ChatId = i64;
/// Message identifier, unique within a chat.
pub type MessageId = i64;

/// Account behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub username: Option<String>,
}

/// Optional knobs for outgoing messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Reply to this message.
    pub reply_to: Option<MessageId>,
    /// Forum topic (thread) to post into.
    pub thread: Option<i64>,
    /// Render the text as Markdown.
    pub markdown: bool,
}

impl SendOptions {
    pub fn reply_to(message: MessageId) -> Self {
        Self {
            reply_to: Some(message),
            ..Self::default()
        }
    }
}

/// Escapes the characters legacy Markdown treats as entity delimiters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A message observed by the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender_id: i64,
    pub text: String,
    /// Written by the account owner.
    pub outgoing: bool,
    /// One-to-one conversation.
    pub private: bool,
}

/// One long-poll result.
#[derive(Debug, Clone)]
pub struct Update {
    pub id: i64,
    pub message: Option<InboundMessage>,
}

/// Messaging platform failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessengerError {
    /// Network or protocol failure.
    #[error("transport: {0}")]
    Transport(String),

    /// The platform answered with an error.
    #[error("api error {code}: {description}")]
    Api { code: i64, description: String },

    /// Flood control; retry after the advised delay.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Credentials are no longer accepted.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Local file could not be read.
    #[error("io: {0}")]
    Io(String),
}

impl MessengerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            MessengerError::Transport(_) => "messenger_transport",
            MessengerError::Api { .. } => "messenger_api",
            MessengerError::RateLimited { .. } => "messenger_rate_limited",
            MessengerError::Unauthorized(_) => "messenger_unauthorized",
            MessengerError::Io(_) => "messenger_io",
        }
    }
}

/// Chat platform operations used by the controller.
#[async_trait]
pub trait Messenger: Send + Sync + 'static {
    /// Account the handle is logged in as.
    async fn me(&self) -> Result<Identity, MessengerError>;

    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError>;

    /// Replaces the text of a message. Editing to identical text succeeds.
    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), MessengerError>;

    async fn delete_message(&self, chat: ChatId, message: MessageId)
    -> Result<(), MessengerError>;

    /// Uploads a local audio file with a caption.
    async fn send_audio(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError>;

    async fn react(
        &self,
        chat: ChatId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), MessengerError>;

    /// Replaces the profile bio.
    async fn set_bio(&self, text: &str) -> Result<(), MessengerError>;

    /// Current profile bio (empty when unset).
    async fn bio(&self) -> Result<String, MessengerError>;

    /// Long-polls for updates with `id >= offset`.
    async fn next_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, MessengerError>;
}
