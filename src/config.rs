//! # Application configuration.
//!
//! Values come from an optional TOML file (path in `TUNEVISOR_CONFIG`) and are
//! then overridden by environment variables of the same name in upper case.
//!
//! ```toml
//! bot_token = "123:abc"
//! owner_chat_id = 42
//! magic_phrases = ["magic", "ily"]
//! bio_sync_interval_secs = 30
//! ```
//!
//! ## Sentinel values
//! - `log_chat_id = 0` → log to the owner chat
//! - `*_thread = 0` → no forum topic
//! - `session_file = ""` → sessions are not persisted

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Env var holding the TOML file path.
pub const CONFIG_PATH_ENV: &str = "TUNEVISOR_CONFIG";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot API token (required).
    pub bot_token: String,
    /// Owner's user/chat id; their private messages are commands (required).
    pub owner_chat_id: i64,
    /// Destination chat of the remote log.
    pub log_chat_id: i64,
    /// OAuth token for the music service (required).
    pub yandex_music_auth_token: String,
    pub download_dir: PathBuf,
    pub session_file: PathBuf,
    pub bio_store_file: PathBuf,
    /// User bio assumed before one was observed.
    pub initial_bio: String,
    pub auto_reply_thread: i64,
    pub ym_thread: i64,
    pub bio_thread: i64,
    pub music_thread: i64,
    /// Whole-message trigger phrases of the heart animation.
    pub magic_phrases: Vec<String>,
    pub bio_sync_interval_secs: u64,
    /// How long a feature may take to stop before it is terminated.
    pub stop_grace_secs: u64,
    pub telegram_api: String,
    pub yandex_api: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            owner_chat_id: 0,
            log_chat_id: 0,
            yandex_music_auth_token: String::new(),
            download_dir: PathBuf::from("downloads"),
            session_file: PathBuf::from("tunevisor.session.json"),
            bio_store_file: PathBuf::from("bio_store.json"),
            initial_bio: String::new(),
            auto_reply_thread: 0,
            ym_thread: 0,
            bio_thread: 0,
            music_thread: 0,
            magic_phrases: vec!["magic".into(), "ily".into()],
            bio_sync_interval_secs: 30,
            stop_grace_secs: 5,
            telegram_api: crate::clients::telegram::DEFAULT_API.to_string(),
            yandex_api: crate::clients::yandex::DEFAULT_API.to_string(),
        }
    }
}

fn thread(id: i64) -> Option<i64> {
    (id != 0).then_some(id)
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })
}

impl Config {
    /// File (if `TUNEVISOR_CONFIG` is set) plus process environment, validated.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        let cfg = base.with_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file_err = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::File { reason, .. } => file_err(reason),
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::File {
            path: "<inline>".into(),
            reason: e.to_string(),
        })
    }

    /// Applies every variable `lookup` knows about on top of `self`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        macro_rules! text {
            ($key:literal => $field:expr) => {
                if let Some(v) = lookup($key) {
                    $field = v;
                }
            };
        }
        macro_rules! number {
            ($key:literal => $field:expr) => {
                if let Some(v) = lookup($key) {
                    $field = parse($key, &v)?;
                }
            };
        }

        text!("BOT_TOKEN" => self.bot_token);
        number!("OWNER_CHAT_ID" => self.owner_chat_id);
        number!("LOG_CHAT_ID" => self.log_chat_id);
        text!("YANDEX_MUSIC_AUTH_TOKEN" => self.yandex_music_auth_token);
        if let Some(v) = lookup("DOWNLOAD_DIR") {
            self.download_dir = v.into();
        }
        if let Some(v) = lookup("SESSION_FILE") {
            self.session_file = v.into();
        }
        if let Some(v) = lookup("BIO_STORE_FILE") {
            self.bio_store_file = v.into();
        }
        text!("INITIAL_BIO" => self.initial_bio);
        number!("AUTO_REPLY_THREAD" => self.auto_reply_thread);
        number!("YM_THREAD" => self.ym_thread);
        number!("BIO_THREAD" => self.bio_thread);
        number!("MUSIC_THREAD" => self.music_thread);
        if let Some(v) = lookup("MAGIC_PHRASES") {
            self.magic_phrases = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        number!("BIO_SYNC_INTERVAL_SECS" => self.bio_sync_interval_secs);
        number!("STOP_GRACE_SECS" => self.stop_grace_secs);
        Ok(self)
    }

    /// Reports the first missing required value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("BOT_TOKEN"));
        }
        if self.owner_chat_id == 0 {
            return Err(ConfigError::Missing("OWNER_CHAT_ID"));
        }
        if self.yandex_music_auth_token.trim().is_empty() {
            return Err(ConfigError::Missing("YANDEX_MUSIC_AUTH_TOKEN"));
        }
        if self.bio_sync_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "BIO_SYNC_INTERVAL_SECS",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn log_chat(&self) -> i64 {
        if self.log_chat_id == 0 {
            self.owner_chat_id
        } else {
            self.log_chat_id
        }
    }

    pub fn session_path(&self) -> Option<&Path> {
        (!self.session_file.as_os_str().is_empty()).then_some(self.session_file.as_path())
    }

    pub fn bio_sync_interval(&self) -> Duration {
        Duration::from_secs(self.bio_sync_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn auto_reply_topic(&self) -> Option<i64> {
        thread(self.auto_reply_thread)
    }

    pub fn ym_topic(&self) -> Option<i64> {
        thread(self.ym_thread)
    }

    pub fn bio_topic(&self) -> Option<i64> {
        thread(self.bio_thread)
    }

    pub fn music_topic(&self) -> Option<i64> {
        thread(self.music_thread)
    }
}
