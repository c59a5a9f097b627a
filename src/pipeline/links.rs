//! Track link recognition.
//!
//! Recognized forms:
//! - `https://music.yandex.ru/track/<id>`
//! - `https://music.yandex.ru/album/<album>/track/<id>`
//! - any `http(s)://<host>/track/<id>`
//!
//! The scheme is optional as long as the host is a dotted name, so a bare
//! `music.yandex.ru/track/<id>` is a link too.

use std::sync::LazyLock;

use regex::Regex;

static TRACK_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:[\w-]+\.)+[A-Za-z]{2,}(?::\d+)?(?:/album/\d+)?/track/(\d+)\S*")
        .ok()
});

/// First track link in `text`, if any.
pub fn find_track_link(text: &str) -> Option<&str> {
    TRACK_LINK.as_ref()?.find(text).map(|m| m.as_str())
}

/// Numeric track id carried by a link.
pub fn track_id(link: &str) -> Option<&str> {
    TRACK_LINK
        .as_ref()?
        .captures(link)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
