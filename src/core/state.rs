//! Per-feature state as reported by `status()`.

use std::fmt;
use std::time::SystemTime;

/// Lifecycle state of a feature.
///
/// ```text
/// stopped ──start──► starting ──init ok──► running ──stop──► stopping ──► stopped
///                       │                     │
///                       └─init err─► stopped  └─fault─► crashed ──start──► starting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl FeatureState {
    /// A unit exists (or is being created or torn down).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            FeatureState::Starting | FeatureState::Running | FeatureState::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureState::Stopped => "stopped",
            FeatureState::Starting => "starting",
            FeatureState::Running => "running",
            FeatureState::Stopping => "stopping",
            FeatureState::Crashed => "crashed",
        }
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureStatus {
    pub state: FeatureState,
    /// Set while running.
    pub started_at: Option<SystemTime>,
    /// Why the last run crashed or the last launch failed.
    pub last_error: Option<String>,
}
