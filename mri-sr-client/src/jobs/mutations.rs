//! Job mutations.
//!
//! Each operation calls the API and, only when that call succeeds,
//! invalidates the detail entry of the affected job and every job list.
//! A failed call leaves the cache untouched.

use tracing::{info, warn};

use super::events::InvalidateTarget;
use super::service::JobService;
use crate::Result;
use crate::api::{
    CancelResponse, InferenceRequest, InferenceResponse, JobApi, RetryResponse, UploadResponse,
};
use crate::domain::{JobId, UploadFile, validate_upload};

impl<A: JobApi> JobService<A> {
    /// Upload scan files, creating a preprocessing job.
    ///
    /// The files are validated first; an invalid upload sends nothing.
    pub async fn submit_upload(&self, files: Vec<UploadFile>) -> Result<UploadResponse> {
        validate_upload(&files)?;

        let count = files.len();
        let response = self.api.upload_files(files).await.inspect_err(|error| {
            warn!(files = count, error = %error, "Upload failed");
        })?;

        info!(job_id = %response.job_id, files = count, "Upload accepted");
        self.invalidate_job_and_lists(&response.job_id);
        Ok(response)
    }

    /// Retry a failed job.
    pub async fn retry_job(&self, id: &JobId) -> Result<RetryResponse> {
        let response = self.api.retry_job(id).await.inspect_err(|error| {
            warn!(job_id = %id, error = %error, "Retry failed");
        })?;

        info!(job_id = %id, new_job_id = %response.job_id, "Job retried");
        if response.job_id != *id {
            self.invalidate(InvalidateTarget::Job(response.job_id.clone()));
        }
        self.invalidate_job_and_lists(id);
        Ok(response)
    }

    /// Cancel a pending or processing job.
    pub async fn cancel_job(&self, id: &JobId) -> Result<CancelResponse> {
        let response = self.api.cancel_job(id).await.inspect_err(|error| {
            warn!(job_id = %id, error = %error, "Cancel failed");
        })?;

        info!(job_id = %id, "Job cancelled");
        self.invalidate_job_and_lists(id);
        Ok(response)
    }

    /// Start an inference run on an uploaded low-resolution file.
    pub async fn run_inference(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let response = self.api.run_inference(request).await.inspect_err(|error| {
            warn!(lr_file_id = %request.lr_file_id, error = %error, "Inference request failed");
        })?;

        info!(
            job_id = %response.inference_job_id,
            lr_file_id = %request.lr_file_id,
            "Inference started"
        );
        self.invalidate_job_and_lists(&response.inference_job_id);
        Ok(response)
    }

    fn invalidate_job_and_lists(&self, id: &JobId) {
        self.invalidate(InvalidateTarget::Job(id.clone()));
        self.invalidate(InvalidateTarget::Lists);
    }
}
