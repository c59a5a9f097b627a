//! Yandex Music REST adapter.
//!
//! Stream resolution is two hops: `download-info` lists the encodings, the
//! chosen entry points at a small XML document whose fields are signed into
//! the final file URL.

use async_trait::async_trait;
use futures::StreamExt;
use md5::{Digest, Md5};
use serde_json::Value;

use crate::pipeline::{AudioStream, Catalog, CatalogError, TrackMeta};

pub const DEFAULT_API: &str = "https://api.music.yandex.net";

const SIGN_SALT: &str = "XGRlBW9FXlekgbPrRHuSiA";
const COVER_SIZE: &str = "400x400";

/// One entry of `download-info`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Encoding {
    codec: String,
    bitrate: u64,
    info_url: String,
}

/// Fields of the download-info XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DownloadInfo {
    host: String,
    path: String,
    ts: String,
    s: String,
}

impl DownloadInfo {
    fn parse(xml: &str) -> Option<Self> {
        Some(Self {
            host: xml_field(xml, "host")?,
            path: xml_field(xml, "path")?,
            ts: xml_field(xml, "ts")?,
            s: xml_field(xml, "s")?,
        })
    }

    fn file_url(&self) -> String {
        let path = self.path.strip_prefix('/').unwrap_or(&self.path);
        let sign = hex::encode(Md5::digest(format!("{SIGN_SALT}{path}{}", self.s)));
        format!("https://{}/get-mp3/{sign}/{}/{path}", self.host, self.ts)
    }
}

fn xml_field(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let len = xml[start..].find(&close)?;
    Some(xml[start..start + len].trim().to_string())
}

/// Highest-bitrate mp3 encoding.
fn best_mp3(encodings: &[Encoding]) -> Option<&Encoding> {
    encodings
        .iter()
        .filter(|e| e.codec == "mp3")
        .max_by_key(|e| e.bitrate)
}

fn parse_encodings(result: &Value) -> Vec<Encoding> {
    result
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|e| {
                    Some(Encoding {
                        codec: e.get("codec")?.as_str()?.to_string(),
                        bitrate: e.get("bitrateInKbps")?.as_u64()?,
                        info_url: e.get("downloadInfoUrl")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Track ids come as numbers or strings.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_track(v: &Value) -> Option<TrackMeta> {
    let str_of = |key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    Some(TrackMeta {
        id: id_string(v.get("id")?)?,
        title: str_of("title")?,
        artists: v
            .get("artists")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(|x| x.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        album: v
            .get("albums")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|a| a.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
        cover_uri: str_of("coverUri"),
        duration_ms: v.get("durationMs").and_then(Value::as_u64),
    })
}

fn cover_url(uri: &str) -> String {
    format!("https://{}", uri.replace("%%", COVER_SIZE))
}

fn transport(e: reqwest::Error) -> CatalogError {
    CatalogError::Transport(e.to_string())
}

fn status_error(status: reqwest::StatusCode, what: &str) -> CatalogError {
    match status.as_u16() {
        404 => CatalogError::NotFound(what.to_string()),
        401 | 403 => CatalogError::Unavailable(format!("{what}: access denied ({status})")),
        _ => CatalogError::Transport(format!("{what}: http {status}")),
    }
}

/// Catalog client authenticated with an OAuth token.
#[derive(Clone)]
pub struct YandexMusic {
    http: reqwest::Client,
    api: String,
    token: String,
}

impl YandexMusic {
    pub fn new(http: reqwest::Client, api: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            api: api.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get_json(&self, url: &str, what: &str) -> Result<Value, CatalogError> {
        let resp = self
            .http
            .get(url)
            .header("Authorization", format!("OAuth {}", self.token))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), what));
        }
        let mut body: Value = resp.json().await.map_err(transport)?;
        Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn file_url(&self, id: &str) -> Result<String, CatalogError> {
        let what = format!("track {id}");
        let result = self
            .get_json(&format!("{}/tracks/{id}/download-info", self.api), &what)
            .await?;
        let encodings = parse_encodings(&result);
        let best = best_mp3(&encodings)
            .ok_or_else(|| CatalogError::Unavailable(format!("{what}: no mp3 stream")))?;
        tracing::debug!(track = id, bitrate = best.bitrate, "stream selected");

        let resp = self
            .http
            .get(&best.info_url)
            .header("Authorization", format!("OAuth {}", self.token))
            .send()
            .await
            .map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), &what));
        }
        let xml = resp.text().await.map_err(transport)?;
        DownloadInfo::parse(&xml)
            .map(|info| info.file_url())
            .ok_or_else(|| CatalogError::Transport(format!("{what}: malformed download info")))
    }
}

#[async_trait]
impl Catalog for YandexMusic {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackMeta>, CatalogError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.api),
            &[("text", query), ("type", "track"), ("page", "0")],
        )
        .map_err(|e| CatalogError::Transport(e.to_string()))?;
        let result = self.get_json(url.as_str(), "search").await?;
        Ok(result
            .pointer("/tracks/results")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().filter_map(parse_track).take(limit).collect())
            .unwrap_or_default())
    }

    async fn track(&self, id: &str) -> Result<TrackMeta, CatalogError> {
        let what = format!("track {id}");
        let result = self
            .get_json(&format!("{}/tracks/{id}", self.api), &what)
            .await?;
        result
            .as_array()
            .and_then(|a| a.first())
            .and_then(parse_track)
            .ok_or(CatalogError::NotFound(what))
    }

    async fn open_stream(&self, id: &str) -> Result<AudioStream, CatalogError> {
        let url = self.file_url(id).await?;
        let resp = self.http.get(&url).send().await.map_err(transport)?;
        if !resp.status().is_success() {
            return Err(status_error(resp.status(), &format!("track {id}")));
        }
        Ok(resp.bytes_stream().map(|chunk| chunk.map_err(transport)).boxed())
    }

    async fn cover(&self, meta: &TrackMeta) -> Result<Option<Vec<u8>>, CatalogError> {
        let Some(uri) = meta.cover_uri.as_deref() else {
            return Ok(None);
        };
        let resp = self.http.get(cover_url(uri)).send().await.map_err(transport)?;
        match resp.status().as_u16() {
            404 => Ok(None),
            _ if resp.status().is_success() => {
                Ok(Some(resp.bytes().await.map_err(transport)?.to_vec()))
            }
            _ => Err(status_error(resp.status(), "cover")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tracks_parse_with_numeric_or_string_ids() {
        let t = parse_track(&json!({
            "id": 42,
            "title": "Song",
            "artists": [{"name": "A"}, {"name": "B"}],
            "albums": [{"id": 1, "title": "LP"}],
            "coverUri": "avatars.yandex.net/get-music-content/x/%%",
            "durationMs": 215000
        }))
        .unwrap();
        assert_eq!(t.id, "42");
        assert_eq!(t.artists_line(), "A, B");
        assert_eq!(t.album.as_deref(), Some("LP"));
        assert_eq!(t.duration_ms, Some(215_000));

        let bare = parse_track(&json!({"id": "7", "title": "Only"})).unwrap();
        assert!(bare.artists.is_empty() && bare.album.is_none());
        assert!(parse_track(&json!({"title": "no id"})).is_none());
    }

    #[test]
    fn highest_mp3_bitrate_wins() {
        let encodings = parse_encodings(&json!([
            {"codec": "mp3", "bitrateInKbps": 192, "downloadInfoUrl": "u192"},
            {"codec": "aac", "bitrateInKbps": 320, "downloadInfoUrl": "aac"},
            {"codec": "mp3", "bitrateInKbps": 320, "downloadInfoUrl": "u320"},
            {"codec": "mp3", "bitrateInKbps": 128, "downloadInfoUrl": "u128"}
        ]));
        assert_eq!(best_mp3(&encodings).map(|e| e.info_url.as_str()), Some("u320"));
        assert_eq!(best_mp3(&encodings[1..2]), None);
    }

    #[test]
    fn download_info_is_signed() {
        let xml = "<?xml version=\"1.0\"?><download-info><host>s1.storage.example</host>\
                   <path>/rmusic/abc</path><ts>0005f1</ts><region>-1</region><s>secret</s></download-info>";
        let info = DownloadInfo::parse(xml).unwrap();
        let expected = hex::encode(Md5::digest(format!("{SIGN_SALT}rmusic/abcsecret")));
        assert_eq!(
            info.file_url(),
            format!("https://s1.storage.example/get-mp3/{expected}/0005f1/rmusic/abc")
        );
        assert!(DownloadInfo::parse("<download-info></download-info>").is_none());
    }

    #[test]
    fn cover_uses_fixed_size() {
        assert_eq!(
            cover_url("avatars.yandex.net/get-music-content/x/%%"),
            "https://avatars.yandex.net/get-music-content/x/400x400"
        );
    }
}
