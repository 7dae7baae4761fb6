//! Per-job status polling.
//!
//! A [`JobPoller`] runs at most one loop per job id. Each loop fetches the
//! job's status through the cache at a fixed interval, hands every result
//! to its subscribers, and ends on the first terminal record or when its
//! last subscriber detaches.

mod controller;
mod subscription;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::domain::{JobRecord, JobStatus};

pub use controller::JobPoller;
pub use subscription::PollSubscription;

/// Default interval between two status checks of one job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of consecutive failures tolerated before an error is
/// reported as persistent.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Which tick errors end a polling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOnError {
    /// Keep polling through every error.
    Never,
    /// Stop once the job no longer exists.
    #[default]
    NotFound,
    /// Stop on the first error.
    Any,
}

impl StopOnError {
    pub fn should_stop(&self, error: &Error) -> bool {
        match self {
            Self::Never => false,
            Self::NotFound => error.is_not_found(),
            Self::Any => true,
        }
    }
}

impl FromStr for StopOnError {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "never" => Ok(Self::Never),
            "not_found" => Ok(Self::NotFound),
            "any" => Ok(Self::Any),
            _ => Err(Error::config(format!("unknown stop-on-error policy: {s}"))),
        }
    }
}

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub stop_on_error: StopOnError,
    pub max_consecutive_failures: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            stop_on_error: StopOnError::default(),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl PollerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: StopOnError) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }
}

/// A notification from a polling loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A freshly fetched record. A terminal record is the last event.
    Update(Arc<JobRecord>),
    /// A tick failed. The last known record stays in the cache.
    Error {
        error: Error,
        consecutive_failures: u32,
        /// More consecutive failures than the configured threshold.
        persistent: bool,
    },
}

impl PollEvent {
    pub fn record(&self) -> Option<&Arc<JobRecord>> {
        match self {
            Self::Update(job) => Some(job),
            Self::Error { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.record().is_some_and(|job| job.is_terminal())
    }
}

/// Lifecycle of the polling loop for one job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Never polled.
    Idle,
    Polling,
    Completed,
    Failed,
    Cancelled,
    /// Ended without a terminal record: every subscriber detached, or an
    /// error matched the stop policy.
    Stopped,
}

impl PollState {
    /// Final state for a terminal job status.
    pub fn for_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Completed => Self::Completed,
            JobStatus::Failed => Self::Failed,
            JobStatus::Cancelled => Self::Cancelled,
            JobStatus::Pending | JobStatus::Processing => Self::Polling,
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Idle | Self::Polling)
    }
}
