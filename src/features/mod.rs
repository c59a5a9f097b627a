//! Supervised features.
//!
//! - [`BioSync`] (`bio_sync`): now-playing profile bio
//! - [`AutoReply`] (`auto_reply`): heart animation on trigger phrases

pub mod animation;
mod auto_reply;
mod bio;
mod bio_sync;

pub use animation::{Admission, Animator};
pub use auto_reply::{AUTO_REPLY, AutoReply};
pub use bio::{BIO_KEY, BIO_LIMIT, BioPlan, BioStore, clock, is_managed, now_playing_bio, plan};
pub use bio_sync::{BIO_SYNC, BioSync};
