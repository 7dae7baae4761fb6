//! The job API seam.

use async_trait::async_trait;
use bytes::Bytes;
use job_outputs::ResourceLocator;

use super::models::{
    CancelResponse, FileListQuery, FileMetadata, InferenceRequest, InferenceResponse,
    RetryResponse, UploadResponse,
};
use crate::Result;
use crate::domain::{JobId, JobListQuery, JobRecord, PagedJobs, UploadFile};

/// Remote job, file and inference API.
///
/// Implementations map a missing job to [`Error::JobNotFound`] for the
/// job-scoped calls and every other failure to a network or HTTP error.
/// They never touch the job cache.
///
/// [`Error::JobNotFound`]: crate::Error::JobNotFound
#[async_trait]
pub trait JobApi: Send + Sync + 'static {
    /// `GET /jobs/{id}`
    async fn get_job(&self, id: &JobId) -> Result<JobRecord>;

    /// `GET /jobs/{id}/status`, the lighter variant used for polling.
    async fn get_job_status(&self, id: &JobId) -> Result<JobRecord>;

    /// `GET /jobs?page&size`
    async fn list_jobs(&self, query: &JobListQuery) -> Result<PagedJobs>;

    /// `POST /jobs/{id}/retry`
    async fn retry_job(&self, id: &JobId) -> Result<RetryResponse>;

    /// `POST /jobs/{id}/cancel`
    async fn cancel_job(&self, id: &JobId) -> Result<CancelResponse>;

    /// `POST /preprocess/upload` (multipart)
    async fn upload_files(&self, files: Vec<UploadFile>) -> Result<UploadResponse>;

    /// `POST /infer`
    async fn run_inference(&self, request: &InferenceRequest) -> Result<InferenceResponse>;

    /// `GET /files`
    async fn list_files(&self, query: &FileListQuery) -> Result<Vec<FileMetadata>>;

    /// Fetch the bytes behind a resolved locator.
    async fn download(&self, locator: &ResourceLocator) -> Result<Bytes>;
}
