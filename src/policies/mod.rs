//! # Retry policies.
//!
//! - [`BackoffPolicy`]: delay schedule between attempts
//! - [`JitterPolicy`]: randomization of each delay
//! - [`RetryPolicy`]: bounded number of retries with a backoff

mod backoff;
mod jitter;

pub use backoff::{BackoffPolicy, RetryPolicy};
pub use jitter::JitterPolicy;
