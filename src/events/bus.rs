//! # Broadcast bus for supervisor events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. The supervisor publishes every
//! lifecycle transition here; a single listener forwards events into the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet).
//!
//! ```text
//!   start()/stop() ──┐
//!   unit exit      ──┼──► Bus ──► listener ──► SubscriberSet ──► LogWriter, RemoteLogForwarder
//!   shutdown       ──┘
//! ```
//!
//! Publishing never blocks. Events sent while nobody listens are lost, and a
//! receiver that falls behind by more than `capacity` sees `Lagged(n)`.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
