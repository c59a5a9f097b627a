//! # Local event log.
//!
//! [`LogWriter`] renders supervisor events through `tracing`:
//!
//! ```text
//! INFO  feature=bio_sync event=running
//! ERROR feature=bio_sync event=crashed reason="fatal error: credentials rejected"
//! WARN  feature=auto_reply event=grace-exceeded grace_ms=5000
//! ```

use async_trait::async_trait;

use super::Subscribe;
use crate::events::{Event, EventKind};

/// `tracing` renderer for supervisor events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let feature = e.feature.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let tag = e.kind.tag();

        match e.kind {
            EventKind::FeatureCrashed
            | EventKind::FeatureLaunchFailed
            | EventKind::SubscriberPanicked => {
                tracing::error!(feature, event = tag, reason, seq = e.seq);
            }
            EventKind::GraceExceeded | EventKind::SubscriberOverflow => {
                tracing::warn!(feature, event = tag, reason, grace_ms = e.grace_ms, seq = e.seq);
            }
            EventKind::FeatureRunning | EventKind::FeatureStopped | EventKind::ShutdownRequested => {
                tracing::info!(feature, event = tag, seq = e.seq);
            }
            EventKind::FeatureStarting | EventKind::FeatureStopping => {
                tracing::debug!(feature, event = tag, seq = e.seq);
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
