//! # Event subscribers.
//!
//! ```text
//! Bus ──► listener ──► SubscriberSet ──┬──► LogWriter          (tracing)
//!                                      └──► RemoteLogForwarder (log chat)
//! ```

mod log;
mod remote;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use remote::RemoteLogForwarder;
pub use set::SubscriberSet;
pub(crate) use set::panic_message;
pub use subscribe::Subscribe;
