//! # Feature supervisor: start, stop and status of named features.
//!
//! The [`Supervisor`] owns a fixed set of features (registered through the
//! [`SupervisorBuilder`](super::SupervisorBuilder)), the event bus and the
//! subscriber fan-out. Each started feature runs as one isolated execution
//! unit: a tokio task with its own [`CancellationToken`] derived from the
//! supervisor's runtime token.
//!
//! ## Architecture
//! ```text
//! start(name) ─► op lock(name) ─► table: starting ─► spawn unit ──► init()
//!                                                        │            │
//!                         table: running ◄── ready(Ok) ──┘            │
//!                         go ─────────────────────────────────────► run(ctx)
//!
//! stop(name)  ─► op lock(name) ─► table: stopping ─► cancel ctx ─► join ≤ grace
//!                                                     └─ timeout ─► kill ─► join ≤ cleanup_grace ─► abort
//!                                 table: stopped ◄────────────────────────┘
//!
//! unit exits on its own ─► settle(): running → crashed (error/panic) | stopped (clean)
//!
//! every transition ─► Bus ─► listener ─► SubscriberSet ─► LogWriter, RemoteLogForwarder, ...
//! ```
//!
//! ## Rules
//! - At most one unit per feature; `start` on a starting/running feature is
//!   a no-op returning [`StartOutcome::AlreadyRunning`].
//! - `start`/`stop` on the same feature are serialized; different features
//!   never block each other.
//! - `running` is only entered after a successful `init`.
//! - A unit's crash changes only its own entry; the supervisor and other
//!   features are unaffected.
//! - `status()` is a read-only snapshot and may be called concurrently with
//!   anything.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::SupervisorConfig;
use super::state::{FeatureState, FeatureStatus};
use super::unit::{self, Exit};
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::tasks::TaskRef;

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The feature already had a unit; nothing changed.
    AlreadyRunning,
}

/// Result of a successful `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The unit honoured cancellation within the grace period.
    Stopped,
    /// The unit had to be terminated.
    Terminated,
}

struct Unit {
    join: JoinHandle<()>,
    cancel: CancellationToken,
    kill: CancellationToken,
}

#[derive(Default)]
struct Entry {
    status: FeatureStatus,
    generation: u64,
    unit: Option<Unit>,
}

/// State shared with execution units.
struct Shared {
    table: RwLock<HashMap<String, Entry>>,
    bus: Bus,
}

impl Shared {
    /// Records the exit of a unit that ended without `stop`.
    async fn settle(&self, name: &str, generation: u64, exit: Exit) {
        let mut table = self.table.write().await;
        let Some(entry) = table.get_mut(name) else {
            return;
        };
        if entry.generation != generation || entry.status.state != FeatureState::Running {
            return;
        }
        entry.unit = None;
        entry.status.started_at = None;

        let event = match exit {
            Exit::Failed(reason) => {
                entry.status.state = FeatureState::Crashed;
                entry.status.last_error = Some(reason.clone());
                Event::new(EventKind::FeatureCrashed).with_reason(reason)
            }
            Exit::Finished | Exit::Canceled | Exit::Terminated => {
                entry.status.state = FeatureState::Stopped;
                Event::new(EventKind::FeatureStopped)
            }
        };
        drop(table);
        self.bus.publish(event.with_feature(name));
    }
}

/// One `start` in progress. Runs under the feature's op lock.
struct Launch {
    name: String,
    task: TaskRef,
    shared: Arc<Shared>,
    cfg: SupervisorConfig,
    ctx: CancellationToken,
}

impl Launch {
    async fn run(self) -> Result<StartOutcome, SupervisorError> {
        let Launch {
            name,
            task,
            shared,
            cfg,
            ctx,
        } = self;
        let generation = {
            let mut table = shared.table.write().await;
            let entry = table.entry(name.clone()).or_default();
            if matches!(
                entry.status.state,
                FeatureState::Starting | FeatureState::Running
            ) {
                return Ok(StartOutcome::AlreadyRunning);
            }
            entry.status = FeatureStatus {
                state: FeatureState::Starting,
                started_at: None,
                last_error: None,
            };
            entry.generation += 1;
            entry.generation
        };
        shared
            .bus
            .publish(Event::new(EventKind::FeatureStarting).with_feature(name.as_str()));

        let kill = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (go_tx, go_rx) = oneshot::channel();

        let mut join = {
            let (task, ctx, kill) = (Arc::clone(&task), ctx.clone(), kill.clone());
            let shared = Arc::clone(&shared);
            let name = name.clone();
            tokio::spawn(async move {
                if let Some(exit) = unit::drive(&task, ctx, kill, ready_tx, go_rx).await {
                    shared.settle(&name, generation, exit).await;
                }
            })
        };

        let ready = match cfg.launch_limit() {
            Some(limit) => tokio::time::timeout(limit, ready_rx)
                .await
                .unwrap_or_else(|_| Ok(Err(format!("init did not finish within {limit:?}")))),
            None => ready_rx.await,
        };
        let failure = match ready {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some("execution unit exited during init".to_string()),
        };

        if let Some(reason) = failure {
            kill.cancel();
            if tokio::time::timeout(cfg.cleanup_grace, &mut join)
                .await
                .is_err()
            {
                join.abort();
            }
            {
                let mut table = shared.table.write().await;
                let entry = table.entry(name.clone()).or_default();
                entry.status.state = FeatureState::Stopped;
                entry.status.last_error = Some(reason.clone());
            }
            shared.bus.publish(
                Event::new(EventKind::FeatureLaunchFailed)
                    .with_feature(name.as_str())
                    .with_reason(reason.as_str()),
            );
            return Err(SupervisorError::Launch {
                feature: name,
                reason,
            });
        }

        {
            let mut table = shared.table.write().await;
            let entry = table.entry(name.clone()).or_default();
            entry.status.state = FeatureState::Running;
            entry.status.started_at = Some(SystemTime::now());
            entry.unit = Some(Unit {
                join,
                cancel: ctx,
                kill,
            });
        }
        shared
            .bus
            .publish(Event::new(EventKind::FeatureRunning).with_feature(name.as_str()));
        let _ = go_tx.send(());
        Ok(StartOutcome::Started)
    }
}

/// Starts, stops and reports named features.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    features: BTreeMap<String, TaskRef>,
    ops: HashMap<String, Arc<Mutex<()>>>,
    shared: Arc<Shared>,
    runtime: CancellationToken,
}

impl Supervisor {
    pub(super) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        features: BTreeMap<String, TaskRef>,
        runtime: CancellationToken,
    ) -> Self {
        let ops = features
            .keys()
            .map(|name| (name.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            cfg,
            shared: Arc::new(Shared {
                table: RwLock::new(HashMap::new()),
                bus: bus.clone(),
            }),
            bus,
            subs,
            features,
            ops,
            runtime,
        }
    }

    /// Forwards bus events into the subscriber set until the runtime token is cancelled.
    pub(super) fn spawn_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.runtime.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "event listener lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Registered feature names, sorted.
    pub fn features(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    /// Launches the feature's execution unit.
    ///
    /// Returns once `init` succeeded and the feature is `running`. An `init`
    /// error, panic or timeout fails with [`SupervisorError::Launch`] and
    /// leaves the feature `stopped`. The launch runs detached: dropping the
    /// returned future does not interrupt it.
    pub async fn start(&self, name: &str) -> Result<StartOutcome, SupervisorError> {
        let (task, op) = self.lookup(name)?;
        let launch = Launch {
            name: name.to_string(),
            task,
            shared: Arc::clone(&self.shared),
            cfg: self.cfg.clone(),
            ctx: self.runtime.child_token(),
        };
        let handle = tokio::spawn(async move {
            let _op = op.lock_owned().await;
            launch.run().await
        });
        match handle.await {
            Ok(res) => res,
            Err(e) => Err(SupervisorError::Launch {
                feature: name.to_string(),
                reason: format!("launch aborted: {e}"),
            }),
        }
    }

    /// Stops the feature: cooperative cancellation, then termination after grace.
    ///
    /// The unit's cleanup runs in both cases. A stopped or crashed feature
    /// yields [`SupervisorError::NotRunning`]; a crashed one is reset to
    /// `stopped` on the way.
    pub async fn stop(&self, name: &str) -> Result<StopOutcome, SupervisorError> {
        let (_, op) = self.lookup(name)?;
        let _op = op.lock().await;

        let unit = {
            let mut table = self.shared.table.write().await;
            let entry = table.entry(name.to_string()).or_default();
            match entry.status.state {
                FeatureState::Running => {
                    entry.status.state = FeatureState::Stopping;
                    entry.unit.take()
                }
                FeatureState::Crashed => {
                    entry.status.state = FeatureState::Stopped;
                    return Err(SupervisorError::NotRunning(name.to_string()));
                }
                _ => return Err(SupervisorError::NotRunning(name.to_string())),
            }
        };
        self.publish(EventKind::FeatureStopping, name);

        let forced = match unit {
            Some(unit) => self.terminate(name, unit).await,
            None => false,
        };

        {
            let mut table = self.shared.table.write().await;
            let entry = table.entry(name.to_string()).or_default();
            entry.status.state = FeatureState::Stopped;
            entry.status.started_at = None;
        }
        self.publish(EventKind::FeatureStopped, name);

        Ok(if forced {
            StopOutcome::Terminated
        } else {
            StopOutcome::Stopped
        })
    }

    /// Stops every running feature concurrently.
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        let running: Vec<String> = self
            .status()
            .await
            .into_iter()
            .filter(|(_, s)| s.state == FeatureState::Running)
            .map(|(name, _)| name)
            .collect();

        let stops = running.into_iter().map(|name| async move {
            let res = self.stop(&name).await;
            (name, res)
        });
        futures::future::join_all(stops)
            .await
            .into_iter()
            .filter_map(|(name, res)| res.ok().map(|outcome| (name, outcome)))
            .collect()
    }

    /// Stops everything and detaches the event listener.
    pub async fn shutdown(&self) {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.stop_all().await;
        self.runtime.cancel();
    }

    /// Snapshot of every registered feature.
    pub async fn status(&self) -> BTreeMap<String, FeatureStatus> {
        let table = self.shared.table.read().await;
        self.features
            .keys()
            .map(|name| {
                let status = table
                    .get(name)
                    .map(|e| e.status.clone())
                    .unwrap_or_default();
                (name.clone(), status)
            })
            .collect()
    }

    /// State of one feature.
    pub async fn state(&self, name: &str) -> Option<FeatureState> {
        if !self.features.contains_key(name) {
            return None;
        }
        let table = self.shared.table.read().await;
        Some(table.get(name).map(|e| e.status.state).unwrap_or_default())
    }

    /// Number of live execution units.
    pub async fn active_units(&self) -> usize {
        let table = self.shared.table.read().await;
        table
            .values()
            .filter(|e| e.unit.as_ref().is_some_and(|u| !u.join.is_finished()))
            .count()
    }

    fn lookup(&self, name: &str) -> Result<(TaskRef, Arc<Mutex<()>>), SupervisorError> {
        match (self.features.get(name), self.ops.get(name)) {
            (Some(task), Some(op)) => Ok((Arc::clone(task), Arc::clone(op))),
            _ => Err(SupervisorError::UnknownFeature(name.to_string())),
        }
    }

    /// Cancels the unit and waits; returns `true` when it had to be forced.
    async fn terminate(&self, name: &str, mut unit: Unit) -> bool {
        unit.cancel.cancel();
        if tokio::time::timeout(self.cfg.grace, &mut unit.join)
            .await
            .is_ok()
        {
            return false;
        }

        self.bus.publish(
            Event::new(EventKind::GraceExceeded)
                .with_feature(name)
                .with_grace(self.cfg.grace),
        );
        unit.kill.cancel();
        if tokio::time::timeout(self.cfg.cleanup_grace, &mut unit.join)
            .await
            .is_err()
        {
            tracing::error!(feature = name, "cleanup overran, aborting unit");
            unit.join.abort();
            let _ = (&mut unit.join).await;
        }
        true
    }

    fn publish(&self, kind: EventKind, name: &str) {
        self.bus.publish(Event::new(kind).with_feature(name));
    }
}
