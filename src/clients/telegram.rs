//! Telegram Bot API adapter.
//!
//! Every call is a POST to `{api}/bot{token}/{method}` answered with the
//! `{ok, result | error_code, description, parameters}` envelope. The profile
//! bio maps to the bot's short description.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::AuthError;
use crate::messenger::{
    ChatId, Identity, InboundMessage, MessageId, Messenger, MessengerError, SendOptions, Update,
};
use crate::session::{Authenticator, Credentials};

pub const DEFAULT_API: &str = "https://api.telegram.org";

/// Extra time on top of a long-poll before the HTTP request gives up.
const POLL_SLACK: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
    parameters: Option<ErrorParameters>,
}

#[derive(Debug, Deserialize)]
struct ErrorParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
    caption: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct ShortDescription {
    short_description: String,
}

/// Turns a decoded envelope into the result or a typed error.
fn unwrap_envelope<T>(env: Envelope<T>) -> Result<T, MessengerError> {
    if env.ok {
        return env
            .result
            .ok_or_else(|| MessengerError::Transport("response without result".into()));
    }
    let code = env.error_code.unwrap_or_default();
    let description = env.description.unwrap_or_default();
    Err(match code {
        401 | 404 => MessengerError::Unauthorized(description),
        429 => MessengerError::RateLimited {
            retry_after: Duration::from_secs(
                env.parameters
                    .and_then(|p| p.retry_after)
                    .unwrap_or(1),
            ),
        },
        _ => MessengerError::Api { code, description },
    })
}

fn is_not_modified(err: &MessengerError) -> bool {
    matches!(err, MessengerError::Api { code: 400, description } if description.contains("message is not modified"))
}

/// Keeps text messages (and captioned media); `outgoing` means written by `owner`.
fn to_update(raw: RawUpdate, owner: i64) -> Update {
    let message = raw.message.and_then(|m| {
        let text = m.text.or(m.caption)?;
        let sender_id = m.from.map(|u| u.id).unwrap_or(m.chat.id);
        Some(InboundMessage {
            chat_id: m.chat.id,
            message_id: m.message_id,
            sender_id,
            text,
            outgoing: sender_id == owner,
            private: m.chat.kind == "private",
        })
    });
    Update {
        id: raw.update_id,
        message,
    }
}

fn reply_parameters(opts: &SendOptions) -> Option<Value> {
    opts.reply_to.map(|id| {
        json!({
            "message_id": id,
            "allow_sending_without_reply": true,
        })
    })
}

fn transport(e: reqwest::Error) -> MessengerError {
    MessengerError::Transport(e.to_string())
}

/// Bot API handle for one token.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    owner: i64,
}

impl TelegramClient {
    /// `owner` is the user whose messages count as outgoing.
    pub fn new(http: reqwest::Client, api: &str, token: &str, owner: i64) -> Self {
        Self {
            http,
            base: format!("{}/bot{token}", api.trim_end_matches('/')),
            owner,
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, MessengerError> {
        let resp = self
            .http
            .post(format!("{}/{method}", self.base))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        let env: Envelope<T> = resp.json().await.map_err(transport)?;
        unwrap_envelope(env)
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn me(&self) -> Result<Identity, MessengerError> {
        let user: User = self.call("getMe", &json!({}), REQUEST_TIMEOUT).await?;
        Ok(Identity {
            user_id: user.id,
            username: user.username,
        })
    }

    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError> {
        let mut body = json!({ "chat_id": chat, "text": text });
        if let Some(reply) = reply_parameters(&opts) {
            body["reply_parameters"] = reply;
        }
        if let Some(thread) = opts.thread {
            body["message_thread_id"] = json!(thread);
        }
        if opts.markdown {
            body["parse_mode"] = json!("Markdown");
        }
        let sent: Message = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
        Ok(sent.message_id)
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
    ) -> Result<(), MessengerError> {
        let body = json!({ "chat_id": chat, "message_id": message, "text": text });
        match self.call::<Value>("editMessageText", &body, REQUEST_TIMEOUT).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> Result<(), MessengerError> {
        let body = json!({ "chat_id": chat, "message_id": message });
        self.call::<bool>("deleteMessage", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    async fn send_audio(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
        opts: SendOptions,
    ) -> Result<MessageId, MessengerError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| MessengerError::Io(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "track.mp3".to_string());
        let audio = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(transport)?;

        let mut form = multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_string())
            .part("audio", audio);
        if let Some(reply) = reply_parameters(&opts) {
            form = form.text("reply_parameters", reply.to_string());
        }
        if let Some(thread) = opts.thread {
            form = form.text("message_thread_id", thread.to_string());
        }

        let resp = self
            .http
            .post(format!("{}/sendAudio", self.base))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let env: Envelope<Message> = resp.json().await.map_err(transport)?;
        unwrap_envelope(env).map(|m| m.message_id)
    }

    async fn react(
        &self,
        chat: ChatId,
        message: MessageId,
        emoji: &str,
    ) -> Result<(), MessengerError> {
        let body = json!({
            "chat_id": chat,
            "message_id": message,
            "reaction": [{ "type": "emoji", "emoji": emoji }],
        });
        self.call::<bool>("setMessageReaction", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    async fn set_bio(&self, text: &str) -> Result<(), MessengerError> {
        let body = json!({ "short_description": text });
        self.call::<bool>("setMyShortDescription", &body, REQUEST_TIMEOUT)
            .await
            .map(drop)
    }

    async fn bio(&self) -> Result<String, MessengerError> {
        let desc: ShortDescription = self
            .call("getMyShortDescription", &json!({}), REQUEST_TIMEOUT)
            .await?;
        Ok(desc.short_description)
    }

    async fn next_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, MessengerError> {
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        let raw: Vec<RawUpdate> = self.call("getUpdates", &body, timeout + POLL_SLACK).await?;
        Ok(raw.into_iter().map(|u| to_update(u, self.owner)).collect())
    }
}

/// Logs in with a bot token via `getMe`.
pub struct TelegramAuthenticator {
    http: reqwest::Client,
    api: String,
    owner: i64,
}

impl TelegramAuthenticator {
    pub fn new(http: reqwest::Client, api: impl Into<String>, owner: i64) -> Self {
        Self {
            http,
            api: api.into(),
            owner,
        }
    }

    fn client(&self, credentials: &Credentials) -> TelegramClient {
        TelegramClient::new(self.http.clone(), &self.api, credentials.token(), self.owner)
    }
}

#[async_trait]
impl Authenticator for TelegramAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        if credentials.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        self.client(credentials).me().await.map_err(|e| match e {
            MessengerError::Unauthorized(reason) => AuthError::Rejected(reason),
            other => AuthError::Unavailable(other.to_string()),
        })
    }

    fn connect(&self, credentials: &Credentials) -> Arc<dyn Messenger> {
        Arc::new(self.client(credentials))
    }
}
