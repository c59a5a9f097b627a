//! # Closure-backed task.
//!
//! [`TaskFn`] turns `Fn(CancellationToken) -> Future` into a [`Task`] with no
//! init or cleanup. Each start builds a fresh future from the closure.
//!
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use tunevisor::{TaskFn, TaskRef, TaskError};
//!
//! let t: TaskRef = TaskFn::arc("idle", |ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Ok::<_, TaskError>(())
//! });
//! assert_eq!(t.name(), "idle");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::task::Task;
use crate::error::TaskError;

/// Function-backed task.
#[derive(Debug)]
pub struct TaskFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> TaskFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Same as [`TaskFn::new`], already shared.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Task for TaskFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
        (self.f)(ctx).await
    }
}
