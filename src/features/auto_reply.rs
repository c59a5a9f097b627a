//! # `auto_reply`: answer trigger phrases with the heart animation.
//!
//! While running, the feature is the trigger hub's listener. Stopping it (or
//! a crash, or forced termination) deregisters the listener and cancels every
//! animation in flight.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::animation::Animator;
use crate::error::TaskError;
use crate::router::{TriggerGuard, TriggerHub};
use crate::session::SessionRegistry;
use crate::tasks::Task;

pub const AUTO_REPLY: &str = "auto_reply";

pub struct AutoReply {
    sessions: SessionRegistry,
    hub: Arc<TriggerHub>,
    animator: Animator,
    guard: Mutex<Option<TriggerGuard>>,
}

impl AutoReply {
    pub fn new(sessions: SessionRegistry, hub: Arc<TriggerHub>, animator: Animator) -> Self {
        Self {
            sessions,
            hub,
            animator,
            guard: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Task for AutoReply {
    fn name(&self) -> &str {
        AUTO_REPLY
    }

    async fn init(&self) -> Result<(), TaskError> {
        self.sessions.get().await?;
        let guard = self.hub.register(Arc::new(self.animator.clone()));
        *self.guard.lock().await = Some(guard);
        Ok(())
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        ctx.cancelled().await;
        Ok(())
    }

    async fn cleanup(&self) {
        self.guard.lock().await.take();
        self.animator.cancel_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeatureState, SupervisorBuilder, SupervisorConfig};
    use crate::features::animation::{DEFAULT_COOLDOWN, Timing};
    use crate::logsink::LogSink;
    use crate::session::Credentials;
    use crate::testkit::{FakeAuthenticator, incoming};
    use std::time::Duration;

    fn rig() -> (Arc<TriggerHub>, Arc<AutoReply>, Animator) {
        let auth = FakeAuthenticator::arc();
        let sessions = SessionRegistry::new(Credentials::new("token"), auth, None);
        let hub = Arc::new(TriggerHub::new(["magic", "ily"]));
        let timing = Timing {
            frame: Duration::from_secs(1),
            ..Timing::default()
        };
        let animator = Animator::with_timing(
            sessions.clone(),
            LogSink::disabled(),
            timing,
            DEFAULT_COOLDOWN,
        );
        let feature = Arc::new(AutoReply::new(sessions, hub.clone(), animator.clone()));
        (hub, feature, animator)
    }

    #[tokio::test(start_paused = true)]
    async fn listens_only_while_running() {
        let (hub, feature, animator) = rig();
        let sup = SupervisorBuilder::new(SupervisorConfig::default())
            .with_feature(feature)
            .build();
        let msg = incoming(7, 70, 7, "Magic");

        assert!(!hub.dispatch(&msg).await);

        sup.start(AUTO_REPLY).await.unwrap();
        assert!(hub.dispatch(&msg).await);
        assert_eq!(animator.in_flight().await, 1);

        sup.stop(AUTO_REPLY).await.unwrap();
        assert_eq!(sup.state(AUTO_REPLY).await, Some(FeatureState::Stopped));
        assert_eq!(animator.in_flight().await, 0);
        assert!(!hub.dispatch(&incoming(8, 80, 8, "ily")).await);
    }

    #[tokio::test]
    async fn missing_session_fails_the_launch() {
        let auth = FakeAuthenticator::arc();
        auth.reject("bad token");
        let sessions = SessionRegistry::new(Credentials::new("token"), auth, None);
        let hub = Arc::new(TriggerHub::new(["magic"]));
        let animator = Animator::new(sessions.clone(), LogSink::disabled());
        let sup = SupervisorBuilder::new(SupervisorConfig::default())
            .with_feature(Arc::new(AutoReply::new(sessions, hub.clone(), animator)))
            .build();

        assert!(sup.start(AUTO_REPLY).await.is_err());
        assert!(!hub.is_listening());
    }
}
