//! Job records as reported by the job API.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use job_outputs::{OutputDescriptor, OutputSet};
use serde::{Deserialize, Deserializer, Serialize};

use super::time;
use crate::{Error, Result};

/// Maximum accepted length of a job id.
const MAX_JOB_ID_LEN: usize = 128;

/// Opaque, validated job identifier.
///
/// Ids are checked once, where they enter the client. The cache and the
/// poller only accept `JobId`, so a malformed id never reaches them or a
/// request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= MAX_JOB_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && id != "."
            && id != "..";

        if valid {
            Ok(Self(id))
        } else {
            Err(Error::InvalidJobId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(Error::validation(format!("unknown job status: {s}"))),
        }
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Preprocessing,
    Inference,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocessing => "preprocessing",
            Self::Inference => "inference",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preprocessing" => Ok(Self::Preprocessing),
            "inference" => Ok(Self::Inference),
            _ => Err(Error::validation(format!("unknown job type: {s}"))),
        }
    }
}

/// One processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    #[serde(default)]
    pub user_id: Option<String>,
    pub status: JobStatus,
    #[serde(default, rename = "type")]
    pub job_type: Option<JobType>,
    /// Percent complete, only meaningful while processing.
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    #[serde(default, alias = "error")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub lr_file_url: Option<String>,
    #[serde(default)]
    pub hr_file_url: Option<String>,
    #[serde(default, alias = "outputs")]
    pub output_files: Option<Vec<OutputDescriptor>>,
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,
    #[serde(with = "time::flexible")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "time::flexible")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "time::flexible_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "time::flexible_option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Failure reason, only reported for failed jobs.
    pub fn failure_reason(&self) -> Option<&str> {
        match self.status {
            JobStatus::Failed => self.error_message.as_deref(),
            _ => None,
        }
    }

    /// Metrics, only reported for completed jobs.
    pub fn completed_metrics(&self) -> Option<&BTreeMap<String, f64>> {
        match self.status {
            JobStatus::Completed => self.metrics.as_ref(),
            _ => None,
        }
    }

    /// The output sequence, with its variant decided from the first entry.
    pub fn output_set(&self) -> OutputSet {
        OutputSet::new(self.output_files.clone().unwrap_or_default())
    }

    /// Whether `self` is older than `other` according to the server clock.
    pub fn is_older_than(&self, other: &JobRecord) -> bool {
        self.updated_at < other.updated_at
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if value.is_nan() {
        return Ok(0);
    }
    Ok(value.clamp(0.0, 100.0).round() as u8)
}

/// One page of the job listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedJobs {
    pub items: Vec<JobRecord>,
    pub page: u32,
    pub pages: u32,
    pub total: u64,
}

/// Default page size of the job listing.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Filters and page of a job listing. Also the list cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    /// 1-based page number.
    pub page: u32,
    pub size: u32,
}

impl Default for JobListQuery {
    fn default() -> Self {
        Self {
            status: None,
            job_type: None,
            page: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl JobListQuery {
    pub fn page(page: u32) -> Self {
        Self {
            page: page.max(1),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.max(1);
        self
    }

    /// Query-string pairs for `GET /jobs`.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("size", self.size.max(1).to_string()),
        ];
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(job_type) = self.job_type {
            pairs.push(("type", job_type.as_str().to_string()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_outputs::OutputVariant;

    #[test]
    fn test_job_id_validation() {
        assert!(JobId::new("j1").is_ok());
        assert!(JobId::new("3f2b9c1e-8d4a-4e0b-9f61-0c1d2e3f4a5b").is_ok());
        assert!(JobId::new("").is_err());
        assert!(JobId::new("a/b").is_err());
        assert!(JobId::new("..").is_err());
        assert!(JobId::new("with space").is_err());
        assert!(JobId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_decode_full_record() {
        let json = r#"{
            "id": "j2",
            "user_id": "u1",
            "status": "completed",
            "type": "inference",
            "progress": 100,
            "output_files": [{"lr": "scan/a_lr.nii.gz", "hr": "scan/a_hr.nii.gz"}],
            "metrics": {"psnr": 31.2, "ssim": 0.91},
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:05:00.123456",
            "completed_at": "2025-03-01T10:05:00"
        }"#;

        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.id.as_str(), "j2");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.job_type, Some(JobType::Inference));
        assert_eq!(job.output_set().variant(), Some(OutputVariant::Paired));
        assert_eq!(job.completed_metrics().unwrap()["psnr"], 31.2);
        assert!(job.completed_at.is_some());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_decode_minimal_record() {
        let json = r#"{
            "id": "j1",
            "status": "failed",
            "error": "out of memory",
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:00:00Z"
        }"#;

        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.progress, 0);
        assert_eq!(job.failure_reason(), Some("out of memory"));
        assert!(job.output_set().is_empty());
    }

    #[test]
    fn test_progress_is_clamped() {
        let json = r#"{
            "id": "j1",
            "status": "processing",
            "progress": 140.4,
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:00:00Z"
        }"#;
        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let json = r#"{
            "id": "j1",
            "status": "exploded",
            "created_at": "2025-03-01T10:00:00Z",
            "updated_at": "2025-03-01T10:00:00Z"
        }"#;
        assert!(serde_json::from_str::<JobRecord>(json).is_err());
    }

    #[test]
    fn test_list_query_pairs() {
        let query = JobListQuery::page(2)
            .with_size(50)
            .with_status(JobStatus::Failed)
            .with_type(JobType::Preprocessing);
        let pairs = query.to_query_pairs();
        assert!(pairs.contains(&("page", "2".to_string())));
        assert!(pairs.contains(&("size", "50".to_string())));
        assert!(pairs.contains(&("status", "failed".to_string())));
        assert!(pairs.contains(&("type", "preprocessing".to_string())));
    }
}
