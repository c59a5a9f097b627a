//! # Non-blocking fan-out to subscribers.
//!
//! ```text
//!    emit(&Event)
//!        ├──► [queue S1] ─► worker S1 ─► on_event()
//!        └──► [queue SN] ─► worker SN ─► on_event()
//! ```
//!
//! - `emit` never awaits.
//! - Order is FIFO per subscriber, unspecified across subscribers.
//! - A panicking `on_event` is caught; the worker keeps going and a
//!   `SubscriberPanicked` event is published.
//! - Overflow drops the event for that subscriber and publishes
//!   `SubscriberOverflow`, except for subscriber-health events themselves,
//!   which are only traced so a stuck subscriber cannot feed itself.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use super::Subscribe;
use crate::events::{Bus, Event};

struct Channel {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Per-subscriber queues and workers.
pub struct SubscriberSet {
    channels: Vec<Channel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let bus = bus.clone();

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let handled = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref()))
                        .catch_unwind()
                        .await;
                    if let Err(panic) = handled {
                        let info = panic_message(panic.as_ref());
                        tracing::error!(subscriber = name, panic = %info, "subscriber panicked");
                        if !ev.is_subscriber_health() {
                            bus.publish(Event::subscriber_panicked(name, info));
                        }
                    }
                }
            }));
            channels.push(Channel { name, tx });
        }

        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Hands `event` to every subscriber queue without waiting.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for ch in &self.channels {
            let reason = match ch.tx.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(subscriber = ch.name, reason, kind = ?event.kind, "subscriber dropped event");
            if !event.is_subscriber_health() {
                self.bus.publish(Event::subscriber_overflow(ch.name, reason));
            }
        }
    }

    /// Closes all queues and waits for workers to drain.
    pub async fn shutdown(self) {
        drop(self.channels);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
