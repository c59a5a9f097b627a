//! # Supervisor settings.
//!
//! ## Sentinel values
//! - `grace = 0s` → no cooperative wait, stop terminates immediately
//! - `launch_timeout = 0s` → `init` may take as long as it needs

use std::time::Duration;

/// Settings for the [`Supervisor`](super::Supervisor).
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// How long `stop` waits for a unit to honour cancellation before
    /// terminating it.
    pub grace: Duration,

    /// How long a terminated unit gets to finish its cleanup before it is
    /// aborted outright.
    pub cleanup_grace: Duration,

    /// Upper bound for a feature's `init`.
    pub launch_timeout: Duration,

    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// `launch_timeout` as an `Option` (`None` = unbounded).
    #[inline]
    pub fn launch_limit(&self) -> Option<Duration> {
        (!self.launch_timeout.is_zero()).then_some(self.launch_timeout)
    }

    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// `grace = 5s`, `cleanup_grace = 5s`, `launch_timeout = 30s`, `bus_capacity = 1024`.
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(5),
            cleanup_grace: Duration::from_secs(5),
            launch_timeout: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}
