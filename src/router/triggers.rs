//! Trigger phrases and their (optional) listener.
//!
//! The hub holds at most one listener at a time. [`TriggerHub::register`]
//! returns a [`TriggerGuard`]; dropping the guard deregisters the listener,
//! unless a newer registration has replaced it meanwhile.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::messenger::InboundMessage;

/// Receives messages whose text is a trigger phrase.
#[async_trait]
pub trait TriggerListener: Send + Sync + 'static {
    /// Must return quickly; long work belongs in a spawned task.
    async fn on_trigger(&self, msg: &InboundMessage);
}

#[derive(Clone)]
struct Registered {
    id: u64,
    listener: Arc<dyn TriggerListener>,
}

type Current = watch::Sender<Option<Registered>>;

pub struct TriggerHub {
    phrases: Vec<String>,
    current: Arc<Current>,
    next_id: AtomicU64,
}

impl TriggerHub {
    /// Phrases are compared trimmed and case-insensitively; blanks are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (current, _) = watch::channel(None);
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            current: Arc::new(current),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// The whole text is one of the phrases.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.phrases.iter().any(|p| *p == text)
    }

    /// Installs `listener`, replacing any previous one.
    #[must_use = "the listener is removed when the guard drops"]
    pub fn register(&self, listener: Arc<dyn TriggerListener>) -> TriggerGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.current.send_replace(Some(Registered { id, listener }));
        TriggerGuard {
            id,
            current: Arc::clone(&self.current),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Hands a matching message to the listener; `true` if one took it.
    pub async fn dispatch(&self, msg: &InboundMessage) -> bool {
        if !self.matches(&msg.text) {
            return false;
        }
        let listener = self.current.borrow().as_ref().map(|r| Arc::clone(&r.listener));
        match listener {
            Some(listener) => {
                listener.on_trigger(msg).await;
                true
            }
            None => {
                tracing::debug!(chat = msg.chat_id, "trigger phrase ignored, nobody listening");
                false
            }
        }
    }
}

/// Keeps a listener registered.
pub struct TriggerGuard {
    id: u64,
    current: Arc<Current>,
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|r| r.id == self.id) {
                *current = None;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::incoming;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Count(AtomicUsize);

    #[async_trait]
    impl TriggerListener for Count {
        async fn on_trigger(&self, _msg: &InboundMessage) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn whole_text_must_match() {
        let hub = TriggerHub::new(["magic", " ILY ", ""]);
        assert_eq!(hub.phrases(), ["magic", "ily"]);
        assert!(hub.matches("  Magic\n"));
        assert!(hub.matches("ily"));
        assert!(!hub.matches("magical"));
        assert!(!hub.matches("some magic words"));
    }

    #[tokio::test]
    async fn guard_controls_registration() {
        let hub = TriggerHub::new(["magic"]);
        let count = Arc::new(Count::default());
        let msg = incoming(1, 1, 1, "magic");

        let guard = hub.register(count.clone());
        assert!(hub.dispatch(&msg).await);
        assert!(!hub.dispatch(&incoming(1, 2, 1, "hello")).await);
        drop(guard);

        assert!(!hub.is_listening());
        assert!(!hub.dispatch(&msg).await);
        assert_eq!(count.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_guard_keeps_newer_listener() {
        let hub = TriggerHub::new(["magic"]);
        let old = hub.register(Arc::new(Count::default()));
        let _new = hub.register(Arc::new(Count::default()));

        drop(old);
        assert!(hub.is_listening());
    }
}
