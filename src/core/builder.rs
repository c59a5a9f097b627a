use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::SupervisorConfig;
use super::supervisor::Supervisor;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::TaskRef;

/// Builder for a [`Supervisor`] with a fixed set of features.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    features: BTreeMap<String, TaskRef>,
}

impl SupervisorBuilder {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            features: BTreeMap::new(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets its own worker and bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Registers a feature under its task name. A later registration with the
    /// same name replaces the earlier one.
    pub fn with_feature(mut self, task: TaskRef) -> Self {
        self.features.insert(task.name().to_string(), task);
        self
    }

    /// Builds the supervisor and starts forwarding its events to subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let runtime = CancellationToken::new();

        let sup = Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            subs,
            self.features,
            runtime,
        ));
        sup.spawn_listener();
        sup
    }
}
