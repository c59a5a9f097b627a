//! # Subscriber contract.
//!
//! Each [`Subscribe`] implementation gets its own worker and bounded queue
//! inside the [`SubscriberSet`](super::SubscriberSet). A slow subscriber only
//! delays itself; on overflow its events are dropped.

use async_trait::async_trait;

use crate::events::Event;

/// Handler for supervisor events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in overflow and panic reports.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        256
    }
}
