//! Client core for an MRI super-resolution job service.
//!
//! - [`jobs`]: the job cache, cached queries and mutation triggers
//! - [`polling`]: per-job status polling until a terminal state
//! - [`viewer`]: resolution of a job's result files for display
//! - [`api`]: the job API seam and its HTTP implementation

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod polling;
pub mod viewer;

pub use config::ClientConfig;
pub use error::{Error, Result, StatusKind};

pub use job_outputs;
