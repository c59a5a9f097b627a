//! # Lifecycle events published by the feature supervisor.
//!
//! [`EventKind`] covers three groups:
//! - **Feature lifecycle**: starting, running, stopping, stopped, crashed, launch failures
//! - **Shutdown**: shutdown requested, forced termination after grace
//! - **Subscriber health**: overflow and panics inside subscriber workers
//!
//! Every [`Event`] carries a process-wide monotonic `seq`, so consumers can
//! restore the publish order when deliveries interleave.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tunevisor::events::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::FeatureCrashed)
//!     .with_feature("bio_sync")
//!     .with_reason("auth revoked");
//!
//! assert_eq!(ev.kind, EventKind::FeatureCrashed);
//! assert_eq!(ev.feature.as_deref(), Some("bio_sync"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked while handling an event.
    ///
    /// Sets `feature` (subscriber name) and `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// A unit ignored cancellation past the grace period and was terminated.
    ///
    /// Sets `feature` and `grace_ms`.
    GraceExceeded,

    // === Feature lifecycle ===
    /// `start` accepted; the unit is initializing.
    FeatureStarting,

    /// The unit finished initializing and is running.
    FeatureRunning,

    /// The unit failed during initialization; the feature stays stopped.
    ///
    /// Sets `feature` and `reason`.
    FeatureLaunchFailed,

    /// `stop` accepted; cancellation was requested.
    FeatureStopping,

    /// The unit is gone and the feature is stopped.
    FeatureStopped,

    /// The unit returned an error or panicked while running.
    ///
    /// Sets `feature` and `reason`.
    FeatureCrashed,
}

impl EventKind {
    /// Short lowercase tag used by log renderers.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::GraceExceeded => "grace-exceeded",
            EventKind::FeatureStarting => "starting",
            EventKind::FeatureRunning => "running",
            EventKind::FeatureLaunchFailed => "launch-failed",
            EventKind::FeatureStopping => "stopping",
            EventKind::FeatureStopped => "stopped",
            EventKind::FeatureCrashed => "crashed",
        }
    }
}

/// Supervisor event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Feature (or subscriber) name, if applicable.
    pub feature: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details).
    pub reason: Option<Arc<str>>,
    /// Grace period that applied, in milliseconds.
    pub grace_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            feature: None,
            reason: None,
            grace_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a feature name.
    #[inline]
    pub fn with_feature(mut self, feature: impl Into<Arc<str>>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Attaches the grace period (stored as milliseconds).
    #[inline]
    pub fn with_grace(mut self, d: Duration) -> Self {
        self.grace_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_feature(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_feature(subscriber)
            .with_reason(info)
    }

    /// True for events produced by subscriber workers themselves.
    #[inline]
    pub fn is_subscriber_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
