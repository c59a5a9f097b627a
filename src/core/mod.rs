//! Feature supervision.
//!
//! - [`Supervisor`]: start, stop and status of named features
//! - [`SupervisorBuilder`]: registers features and subscribers
//! - [`SupervisorConfig`]: grace periods and bus sizing
//! - [`FeatureState`] / [`FeatureStatus`]: what `status()` reports
//! - [`wait_for_shutdown_signal`]: OS termination signals
//!
//! Internally each started feature runs as one execution unit (`unit`).

mod builder;
mod config;
mod shutdown;
mod state;
mod supervisor;
mod unit;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use shutdown::wait_for_shutdown_signal;
pub use state::{FeatureState, FeatureStatus};
pub use supervisor::{StartOutcome, StopOutcome, Supervisor};
