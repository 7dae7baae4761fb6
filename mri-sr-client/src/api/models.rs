//! Request and response bodies of the job API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::JobId;
use crate::domain::time;

/// Response of `POST /jobs/{id}/retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub message: String,
}

/// Response of `POST /jobs/{id}/cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    #[serde(default)]
    pub message: String,
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub file_type: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(with = "time::flexible")]
    pub created_at: DateTime<Utc>,
}

/// Response of `POST /preprocess/upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "files")]
    pub uploaded_files: Vec<FileMetadata>,
}

/// Optional model selection for an inference run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f32>,
}

/// Body of `POST /infer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub lr_file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config: Option<ModelConfig>,
}

impl InferenceRequest {
    pub fn new(lr_file_id: impl Into<String>) -> Self {
        Self {
            lr_file_id: lr_file_id.into(),
            model_config: None,
        }
    }

    pub fn with_model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = Some(config);
        self
    }
}

/// Response of `POST /infer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub inference_job_id: JobId,
    #[serde(default)]
    pub message: String,
}

/// Filters of `GET /files`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListQuery {
    pub job_id: Option<JobId>,
    pub limit: Option<u32>,
}

impl FileListQuery {
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(job_id) = &self.job_id {
            pairs.push(("job_id", job_id.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

/// Error body returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ApiErrorBody {
    /// Best human-readable message in the body.
    pub fn into_message(self) -> Option<String> {
        if let Some(message) = self.message.filter(|m| !m.is_empty()) {
            return Some(message);
        }
        match self.detail? {
            serde_json::Value::String(detail) => Some(detail),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_request_skips_empty_config() {
        let json = serde_json::to_string(&InferenceRequest::new("f-1")).unwrap();
        assert_eq!(json, r#"{"lr_file_id":"f-1"}"#);
    }

    #[test]
    fn test_error_body_message() {
        let body: ApiErrorBody = serde_json::from_str(r#"{"detail": "Job not retryable"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("Job not retryable"));

        let body: ApiErrorBody =
            serde_json::from_str(r#"{"message": "bad", "detail": "ignored"}"#).unwrap();
        assert_eq!(body.into_message().as_deref(), Some("bad"));
    }

    #[test]
    fn test_upload_response_decodes() {
        let json = r#"{
            "job_id": "j10",
            "message": "Files uploaded",
            "uploaded_files": [{
                "id": "f1", "filename": "a.nii", "file_path": "/data/a.nii",
                "file_size": 12, "file_type": "nii", "user_id": "u1",
                "created_at": "2025-03-01T10:00:00"
            }]
        }"#;
        let response: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.job_id.as_str(), "j10");
        assert_eq!(response.uploaded_files.len(), 1);
    }
}
