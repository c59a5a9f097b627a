//! # One execution unit of a feature.
//!
//! [`drive`] takes a task through its phases inside the unit's tokio task:
//!
//! ```text
//! init() ─► ready(Ok|Err) ─► wait for go ─► run(ctx) ─► cleanup() ─► Some(Exit)
//!   │                          │              │
//!   │ kill / init error        │ go dropped   │ kill: run future dropped
//!   └──────────► cleanup() ─► None            └──► Exit::Terminated
//! ```
//!
//! ## Rules
//! - `cleanup` runs exactly once whenever `init` was entered.
//! - The launcher learns the init outcome through `ready` and commits the
//!   feature to `running` before sending `go`, so no exit can be observed
//!   for a unit that is not yet registered.
//! - Panics in any phase are caught and reported as text.
//! - `kill` drops the in-flight phase future; drop guards held by it run.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::subscribers::panic_message;
use crate::tasks::TaskRef;

/// How a running unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Exit {
    /// `run` returned `Ok` without being asked to stop.
    Finished,
    /// `run` honoured cancellation.
    Canceled,
    /// `run` returned an error or panicked.
    Failed(String),
    /// `run` ignored cancellation and was dropped.
    Terminated,
}

/// Drives `task` through init, run and cleanup.
///
/// Returns `None` when the launch did not complete.
pub(super) async fn drive(
    task: &TaskRef,
    ctx: CancellationToken,
    kill: CancellationToken,
    ready: oneshot::Sender<Result<(), String>>,
    go: oneshot::Receiver<()>,
) -> Option<Exit> {
    let init = tokio::select! {
        biased;
        _ = kill.cancelled() => Err("terminated during init".to_string()),
        res = AssertUnwindSafe(task.init()).catch_unwind() => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(format!("panicked: {}", panic_message(panic.as_ref()))),
        },
    };
    let launched = init.is_ok();
    if ready.send(init).is_err() || !launched || go.await.is_err() {
        cleanup(task).await;
        return None;
    }

    let exit = tokio::select! {
        biased;
        _ = kill.cancelled() => Exit::Terminated,
        res = AssertUnwindSafe(task.run(ctx.clone())).catch_unwind() => match res {
            Ok(Ok(())) if ctx.is_cancelled() => Exit::Canceled,
            Ok(Ok(())) => Exit::Finished,
            Ok(Err(TaskError::Canceled)) => Exit::Canceled,
            Ok(Err(e)) => Exit::Failed(e.to_string()),
            Err(panic) => Exit::Failed(format!("panicked: {}", panic_message(panic.as_ref()))),
        },
    };
    cleanup(task).await;
    Some(exit)
}

async fn cleanup(task: &TaskRef) {
    if let Err(panic) = AssertUnwindSafe(task.cleanup()).catch_unwind().await {
        tracing::error!(
            feature = task.name(),
            panic = %panic_message(panic.as_ref()),
            "cleanup panicked"
        );
    }
}
