//! Ynison playback-state adapter.
//!
//! One query per call: ask the API for the Ynison host, open the state socket
//! with the device descriptor in the subprotocol header, send one
//! `getCurrentState` request and read the first text reply.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use crate::pipeline::{CatalogError, NowPlaying, PlaybackState};

const STATE_PATH: &str = "ynison_state.YnisonStateService/PutYnisonState";
const ORIGIN: &str = "http://music.yandex.ru";
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

fn device_protocol() -> String {
    let descriptor = json!({
        "method": "subscribe",
        "jsonrpc": "2.0",
        "id": "1",
        "params": {
            "context": "default",
            "contextItem": "",
            "device": {
                "deviceId": "web",
                "deviceType": "web",
                "timestamp": 0,
                "appName": "ymusic",
                "appVersion": "0.0.0",
                "packageName": "ru.yandex.music"
            }
        }
    });
    format!("Bearer, v2, {descriptor}")
}

/// Reads the player snapshot out of a state reply. No track means `None`.
fn parse_state(reply: &Value) -> Option<NowPlaying> {
    let result = reply.get("result")?;
    let track_id = match result.get("trackId")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let ms = |key: &str| result.get(key).and_then(Value::as_u64).unwrap_or_default();
    Some(NowPlaying {
        track_id,
        progress_ms: ms("progressMs"),
        duration_ms: ms("durationMs"),
        paused: !result
            .get("isPlaying")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn transport(e: impl std::fmt::Display) -> CatalogError {
    CatalogError::Transport(e.to_string())
}

pub struct Ynison {
    http: reqwest::Client,
    api: String,
    token: String,
}

impl Ynison {
    /// `api` is the music API base that hands out the Ynison host.
    pub fn new(http: reqwest::Client, api: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api: api.into(),
            token: token.into(),
        }
    }

    async fn host(&self) -> Result<String, CatalogError> {
        let resp = self
            .http
            .get(&self.api)
            .header("Authorization", format!("OAuth {}", self.token))
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(CatalogError::Unavailable(format!("ynison host: {status}")));
        }
        if !status.is_success() {
            return Err(CatalogError::Transport(format!("ynison host: http {status}")));
        }
        let body: Value = resp.json().await.map_err(transport)?;
        body.pointer("/result/host")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CatalogError::Transport("ynison host missing in reply".into()))
    }
}

#[async_trait]
impl PlaybackState for Ynison {
    async fn current(&self) -> Result<Option<NowPlaying>, CatalogError> {
        let host = self.host().await?;

        let mut request = format!("wss://{host}/{STATE_PATH}")
            .into_client_request()
            .map_err(transport)?;
        let headers = request.headers_mut();
        headers.insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_str(&device_protocol()).map_err(transport)?,
        );
        headers.insert("Origin", HeaderValue::from_static(ORIGIN));
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("OAuth {}", self.token)).map_err(transport)?,
        );

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(transport)?;
        let (mut write, mut read) = stream.split();

        let query = json!({
            "method": "getCurrentState",
            "jsonrpc": "2.0",
            "id": "1",
            "params": {}
        });
        write
            .send(Message::Text(query.to_string()))
            .await
            .map_err(transport)?;

        let reply = tokio::time::timeout(REPLY_TIMEOUT, async {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(text),
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(CatalogError::Transport("ynison socket closed".into()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(transport(e)),
                }
            }
        })
        .await
        .map_err(|_| CatalogError::Transport("ynison reply timed out".into()))??;

        if let Err(e) = write.close().await {
            tracing::debug!(error = %e, "ynison socket close failed");
        }

        let value: Value = serde_json::from_str(&reply).map_err(transport)?;
        Ok(parse_state(&value))
    }
}
