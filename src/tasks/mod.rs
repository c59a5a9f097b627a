//! # Feature tasks.
//!
//! - [`Task`]: init / run / cleanup contract of a feature
//! - [`TaskFn`]: closure-backed task
//! - [`TaskRef`]: `Arc<dyn Task>`

mod task;
mod task_fn;

pub use task::{Task, TaskRef};
pub use task_fn::TaskFn;
