//! # Production adapters for the external collaborators.
//!
//! | Seam | Adapter |
//! |------|---------|
//! | [`Messenger`](crate::messenger::Messenger), [`Authenticator`](crate::session::Authenticator) | [`TelegramClient`], [`TelegramAuthenticator`] |
//! | [`Catalog`](crate::pipeline::Catalog) | [`YandexMusic`] |
//! | [`PlaybackState`](crate::pipeline::PlaybackState) | [`Ynison`] |
//! | [`Tagger`](crate::pipeline::Tagger) | [`Id3Tagger`] |

pub mod tagger;
pub mod telegram;
pub mod yandex;
pub mod ynison;

pub use tagger::Id3Tagger;
pub use telegram::{TelegramAuthenticator, TelegramClient};
pub use yandex::YandexMusic;
pub use ynison::Ynison;
