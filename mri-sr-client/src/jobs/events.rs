//! Job cache change events.
//!
//! Surfaces subscribe to these to re-render from the cache instead of
//! holding their own copies of job state.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::{JobId, JobRecord};

/// What an invalidation covered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidateTarget {
    /// One job's detail entry.
    Job(JobId),
    /// Every cached job list.
    Lists,
    /// Every job and list entry.
    All,
}

impl std::fmt::Display for InvalidateTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Job(id) => write!(f, "job {id}"),
            Self::Lists => f.write_str("job lists"),
            Self::All => f.write_str("all entries"),
        }
    }
}

/// A change to the job cache.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// A newer record for a job was stored.
    Updated(Arc<JobRecord>),
    /// Entries were marked stale.
    Invalidated(InvalidateTarget),
    /// The cache was torn down.
    Cleared,
}

impl JobEvent {
    pub fn description(&self) -> String {
        match self {
            Self::Updated(job) => format!("Job updated: {} ({})", job.id, job.status),
            Self::Invalidated(target) => format!("Invalidated {target}"),
            Self::Cleared => "Job cache cleared".to_string(),
        }
    }

    /// The job this event concerns, if it concerns a single job.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Updated(job) => Some(&job.id),
            Self::Invalidated(InvalidateTarget::Job(id)) => Some(id),
            _ => None,
        }
    }
}

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcaster for job cache events.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many receivers got it.
    pub fn publish(&self, event: JobEvent) -> usize {
        tracing::trace!("Publishing job event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
