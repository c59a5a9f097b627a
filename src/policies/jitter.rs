//! # Jitter for retry delays.
//!
//! - [`JitterPolicy::None`] — exact delay
//! - [`JitterPolicy::Full`] — uniform in `[0, delay]`
//! - [`JitterPolicy::Equal`] — `delay/2 + uniform[0, delay/2]`

use std::time::Duration;

use rand::Rng;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the delay as computed.
    #[default]
    None,
    /// Anywhere between zero and the delay.
    Full,
    /// At least half of the delay, at most all of it.
    Equal,
}

impl JitterPolicy {
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}
