//! Owner commands: parsing and reply texts.

use std::collections::BTreeMap;

use crate::core::{FeatureState, FeatureStatus};
pub use crate::messenger::escape_markdown;
use crate::pipeline::TrackMeta;

/// Results listed by `search`.
pub const SEARCH_SHOWN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartAutoReply,
    StopAutoReply,
    StartYmSync,
    StopYmSync,
    StopAll,
    Status,
    Help,
    Search(String),
    /// `None` downloads whatever is playing.
    Dl(Option<String>),
}

impl Command {
    /// Parses `text`; `None` when it is not a command.
    ///
    /// The leading `/` and a `@botname` suffix are optional, the command word
    /// is case-insensitive, arguments keep their case.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('/').unwrap_or(text);
        let (word, rest) = match text.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (text, ""),
        };
        let word = word.split('@').next().unwrap_or(word).to_lowercase();

        let bare = |cmd: Command| rest.is_empty().then_some(cmd);
        match word.as_str() {
            "start_auto_reply" => bare(Command::StartAutoReply),
            "stop_auto_reply" => bare(Command::StopAutoReply),
            "start_ym_sync" => bare(Command::StartYmSync),
            "stop_ym_sync" => bare(Command::StopYmSync),
            "stop_all" => bare(Command::StopAll),
            "status" => bare(Command::Status),
            "help" => bare(Command::Help),
            "search" => Some(Command::Search(rest.to_string())),
            "dl" => Some(Command::Dl((!rest.is_empty()).then(|| rest.to_string()))),
            _ => None,
        }
    }
}

pub const HELP: &str = "\
*Available Commands:*
    • `/dl` - Download the track playing on Yandex Music
    • `/dl <query|link>` - Download a track by search or link
    • `/search <query>` - Search Yandex Music
    • You can also send Yandex Music track or album links directly.

*Start:*
    • `/start_auto_reply` - Start magic heart
    • `/start_ym_sync` - Start Yandex Music bio sync

*Stop:*
    • `/stop_auto_reply` - Stop magic heart
    • `/stop_ym_sync` - Stop Yandex Music bio sync
    • `/stop_all` - Stop all features

*Info:*
    • `/status` - Show feature status
    • `/help` - Show this help message";

/// One line per feature, or a notice when nothing is active.
pub fn render_status(status: &BTreeMap<String, FeatureStatus>) -> String {
    let anything = status
        .values()
        .any(|s| s.state.is_active() || s.state == FeatureState::Crashed);
    if !anything {
        return "No features are currently running".to_string();
    }

    let mut lines = vec!["*Features:*".to_string()];
    for (name, s) in status {
        let name = escape_markdown(name);
        lines.push(match s.state {
            FeatureState::Running => format!("✅ {name} - running"),
            FeatureState::Starting | FeatureState::Stopping => format!("⏳ {name} - {}", s.state),
            FeatureState::Crashed => format!(
                "💥 {name} - crashed: {}",
                escape_markdown(s.last_error.as_deref().unwrap_or("unknown error"))
            ),
            FeatureState::Stopped => format!("⏹ {name} - stopped"),
        });
    }
    lines.join("\n")
}

/// Numbered list of search hits.
pub fn render_search(query: &str, hits: &[TrackMeta]) -> String {
    if hits.is_empty() {
        return format!("❌ Nothing found for: {}", escape_markdown(query));
    }
    let mut out = format!("🔍 Results for: {}\n", escape_markdown(query));
    for (i, t) in hits.iter().take(SEARCH_SHOWN).enumerate() {
        out.push_str(&format!(
            "\n{}. *{}*\n   👤 {}\n   💿 {}\n   🆔 `{}`",
            i + 1,
            escape_markdown(&t.title),
            escape_markdown(&t.artists_line()),
            escape_markdown(t.album.as_deref().unwrap_or("Unknown")),
            t.id
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_slash() {
        assert_eq!(Command::parse("/status"), Some(Command::Status));
        assert_eq!(Command::parse("STATUS"), Some(Command::Status));
        assert_eq!(Command::parse("/help@tunebot"), Some(Command::Help));
        assert_eq!(Command::parse(" stop_all "), Some(Command::StopAll));
        assert_eq!(Command::parse("/start_ym_sync"), Some(Command::StartYmSync));
    }

    #[test]
    fn arguments_keep_case() {
        assert_eq!(
            Command::parse("/search Daft Punk  One More Time"),
            Some(Command::Search("Daft Punk  One More Time".into()))
        );
        assert_eq!(Command::parse("dl"), Some(Command::Dl(None)));
        assert_eq!(
            Command::parse("/DL https://music.yandex.ru/track/42"),
            Some(Command::Dl(Some("https://music.yandex.ru/track/42".into())))
        );
    }

    #[test]
    fn ordinary_messages_are_not_commands() {
        assert_eq!(Command::parse("hello there"), None);
        assert_eq!(Command::parse("status update for you"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn status_lists_every_feature() {
        let mut status = BTreeMap::new();
        status.insert("auto_reply".to_string(), FeatureStatus::default());
        assert_eq!(render_status(&status), "No features are currently running");

        status.insert(
            "bio_sync".to_string(),
            FeatureStatus {
                state: FeatureState::Crashed,
                started_at: None,
                last_error: Some("auth revoked".into()),
            },
        );
        assert_eq!(
            render_status(&status),
            "*Features:*\n⏹ auto\\_reply - stopped\n💥 bio\\_sync - crashed: auth revoked"
        );
    }

    #[test]
    fn search_shows_at_most_five() {
        let hits: Vec<TrackMeta> = (0..8)
            .map(|i| TrackMeta {
                id: i.to_string(),
                title: format!("Song {i}"),
                artists: vec!["Band".into()],
                ..TrackMeta::default()
            })
            .collect();
        let text = render_search("song", &hits);
        assert!(text.contains("5. *Song 4*"));
        assert!(!text.contains("Song 5"));
        assert_eq!(render_search("zzz", &[]), "❌ Nothing found for: zzz");
    }

    #[test]
    fn markdown_delimiters_are_escaped() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), "a\\_b\\*c\\`d\\[e]");
    }
}
