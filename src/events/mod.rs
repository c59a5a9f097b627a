//! # Supervisor events.
//!
//! - [`Event`] / [`EventKind`]: what happened to which feature
//! - [`Bus`]: broadcast channel the supervisor publishes on

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
