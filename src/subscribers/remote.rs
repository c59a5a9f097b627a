//! Forwards feature lifecycle milestones to the remote log sink.

use async_trait::async_trait;

use super::Subscribe;
use crate::events::{Event, EventKind};
use crate::logsink::LogSink;

/// Posts start, stop and crash notices to the log chat.
pub struct RemoteLogForwarder {
    sink: LogSink,
}

impl RemoteLogForwarder {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Subscribe for RemoteLogForwarder {
    async fn on_event(&self, e: &Event) {
        let feature = e.feature.as_deref().unwrap_or("?");
        let reason = e.reason.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::FeatureRunning => self.sink.info(format!("Feature {feature} started")),
            EventKind::FeatureStopped => self.sink.info(format!("Feature {feature} stopped")),
            EventKind::FeatureCrashed => {
                self.sink.error(format!("Feature {feature} crashed: {reason}"))
            }
            EventKind::FeatureLaunchFailed => {
                self.sink.error(format!("Feature {feature} failed to start: {reason}"))
            }
            EventKind::GraceExceeded => self
                .sink
                .warn(format!("Feature {feature} ignored stop and was terminated")),
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "remote-log"
    }
}
