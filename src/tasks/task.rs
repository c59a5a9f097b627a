//! # Feature behaviour run by the supervisor.
//!
//! A [`Task`] has three phases, all driven by one execution unit:
//!
//! ```text
//! init()    ── Err ──► start() fails with LaunchError, feature stays stopped
//!   │ Ok
//!   ▼
//! run(ctx)  ── returns when ctx is cancelled, on its own, or with an error (→ crashed)
//!   │
//!   ▼
//! cleanup() ── always, also after forced termination of run()
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// # Named, cancellable feature behaviour.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use tunevisor::{Task, TaskError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Task for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
///         ctx.cancelled().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Stable feature name; the supervisor's key.
    fn name(&self) -> &str;

    /// Prepares the feature. An error here aborts the start.
    async fn init(&self) -> Result<(), TaskError> {
        Ok(())
    }

    /// Runs until `ctx` is cancelled.
    ///
    /// Returning `Ok(())` or `Err(Canceled)` is a clean exit; any other error
    /// marks the feature crashed.
    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;

    /// Releases what `init`/`run` acquired. Runs after every `run`.
    async fn cleanup(&self) {}
}
