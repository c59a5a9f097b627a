//! Error types used across the controller.
//!
//! One enum per concern:
//!
//! - [`ConfigError`] — startup configuration problems (fatal at startup only).
//! - [`AuthError`] — session creation failures (fatal, never retried).
//! - [`SupervisorError`] — feature start/stop rejections.
//! - [`AcquireError`] — track pipeline failures.
//! - [`DeliverError`] — upload failures (the file is removed regardless).
//! - [`TaskError`] — errors returned by feature execution units.
//!
//! Every enum exposes `as_label()` with a stable snake_case label for logs.

use std::time::Duration;

use thiserror::Error;

/// # Startup configuration errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value is absent (or empty).
    #[error("missing required config value `{0}`")]
    Missing(&'static str),

    /// A value is present but cannot be parsed.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Config key (env name).
        key: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The config file could not be read or parsed.
    #[error("config file {path}: {reason}")]
    File {
        /// Path of the file.
        path: String,
        /// Read or parse failure.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Missing(_) => "config_missing",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::File { .. } => "config_file",
        }
    }
}

/// # Session creation errors.
///
/// Fatal for any caller that cannot proceed without a session.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credentials were configured.
    #[error("credentials are missing")]
    MissingCredentials,

    /// The messaging platform refused the credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The platform could not be reached to verify the credentials.
    #[error("authentication unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "auth_missing_credentials",
            AuthError::Rejected(_) => "auth_rejected",
            AuthError::Unavailable(_) => "auth_unavailable",
        }
    }
}

/// # Feature supervisor errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// No feature with this name was registered.
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),

    /// `stop` was called on a feature that has no execution unit.
    #[error("feature `{0}` is not running")]
    NotRunning(String),

    /// The feature failed while initializing; it stays `stopped`.
    #[error("feature `{feature}` failed to launch: {reason}")]
    Launch {
        /// Feature name.
        feature: String,
        /// Initialization failure.
        reason: String,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::UnknownFeature(_) => "feature_unknown",
            SupervisorError::NotRunning(_) => "feature_not_running",
            SupervisorError::Launch { .. } => "feature_launch_failed",
        }
    }
}

/// # Track pipeline errors.
///
/// `Download` is the only retryable variant; a partially written file is
/// always removed before it is returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AcquireError {
    /// Playback state reports nothing playing.
    #[error("nothing is playing right now")]
    NoActiveTrack,

    /// The request could not be turned into a concrete track.
    #[error("could not resolve track: {0}")]
    Resolution(String),

    /// The audio stream could not be stored locally.
    #[error("download failed: {0}")]
    Download(String),
}

impl AcquireError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AcquireError::NoActiveTrack => "acquire_no_active_track",
            AcquireError::Resolution(_) => "acquire_resolution",
            AcquireError::Download(_) => "acquire_download",
        }
    }

    /// Indicates whether the pipeline may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AcquireError::Download(_))
    }
}

/// # Upload failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DeliverError {
    /// The session could not be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The messenger refused or failed the upload.
    #[error("upload failed: {0}")]
    Upload(String),
}

impl DeliverError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DeliverError::Auth(_) => "deliver_auth",
            DeliverError::Upload(_) => "deliver_upload",
        }
    }
}

/// # Errors produced by feature execution units.
///
/// Returning any of these from a running unit (other than `Canceled`)
/// moves the feature to `crashed`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// An operation exceeded its time budget.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The budget that was exceeded.
        timeout: Duration,
    },

    /// Non-recoverable error.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Failure that might succeed on a later start.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The unit observed cancellation and exited.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use tunevisor::TaskError;
    ///
    /// let err = TaskError::Fatal { error: "auth".into() };
    /// assert_eq!(err.as_label(), "task_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fatal { .. } => "task_fatal",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Indicates whether the error type is safe to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Fail { .. } | TaskError::Timeout { .. })
    }
}

impl From<AuthError> for TaskError {
    fn from(e: AuthError) -> Self {
        TaskError::Fatal {
            error: e.to_string(),
        }
    }
}
