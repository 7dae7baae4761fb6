//! `reqwest` implementation of [`JobApi`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use job_outputs::ResourceLocator;
use reqwest::{Method, RequestBuilder, Response, StatusCode, multipart};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::auth::{StaticToken, TokenProvider};
use super::client::JobApi;
use super::models::{
    ApiErrorBody, CancelResponse, FileListQuery, FileMetadata, InferenceRequest,
    InferenceResponse, RetryResponse, UploadResponse,
};
use crate::config::ClientConfig;
use crate::domain::{JobId, JobListQuery, JobRecord, PagedJobs, UploadFile};
use crate::{Error, Result};

const USER_AGENT: &str = concat!("mri-sr-client/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Job API over HTTP.
#[derive(Clone)]
pub struct HttpJobApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    upload_timeout: Duration,
}

impl std::fmt::Debug for HttpJobApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpJobApi")
            .field("base_url", &self.base_url)
            .field("upload_timeout", &self.upload_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpJobApi {
    /// Build a client from `config`, using its access token.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        install_rustls_provider();

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            tokens: Arc::new(StaticToken::new(config.access_token.clone())),
            upload_timeout: config.upload_timeout(),
        })
    }

    /// Replace the credential source.
    pub fn with_token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.tokens.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send `builder`, mapping error statuses. `job` scopes a `404` to a job.
    async fn send(&self, builder: RequestBuilder, job: Option<&JobId>) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.bytes().await.unwrap_or_default();
        let message = serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .or_else(|| {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                (!text.is_empty()).then_some(text)
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string());

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.on_unauthorized();
        }

        if status == StatusCode::NOT_FOUND
            && let Some(job_id) = job
        {
            return Err(Error::job_not_found(job_id.as_str()));
        }

        warn!(status = status.as_u16(), error = %message, "API request failed");
        Err(Error::http(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        job: Option<&JobId>,
    ) -> Result<T> {
        let response = self.send(builder, job).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn get_job(&self, id: &JobId) -> Result<JobRecord> {
        let url = self.url(&format!("/jobs/{id}"));
        self.send_json(self.request(Method::GET, &url), Some(id))
            .await
    }

    async fn get_job_status(&self, id: &JobId) -> Result<JobRecord> {
        let url = self.url(&format!("/jobs/{id}/status"));
        self.send_json(self.request(Method::GET, &url), Some(id))
            .await
    }

    async fn list_jobs(&self, query: &JobListQuery) -> Result<PagedJobs> {
        let url = self.url("/jobs");
        let builder = self
            .request(Method::GET, &url)
            .query(&query.to_query_pairs());
        self.send_json(builder, None).await
    }

    async fn retry_job(&self, id: &JobId) -> Result<RetryResponse> {
        let url = self.url(&format!("/jobs/{id}/retry"));
        self.send_json(self.request(Method::POST, &url), Some(id))
            .await
    }

    async fn cancel_job(&self, id: &JobId) -> Result<CancelResponse> {
        let url = self.url(&format!("/jobs/{id}/cancel"));
        self.send_json(self.request(Method::POST, &url), Some(id))
            .await
    }

    async fn upload_files(&self, files: Vec<UploadFile>) -> Result<UploadResponse> {
        let count = files.len();
        let form = files.into_iter().fold(multipart::Form::new(), |form, file| {
            let part = multipart::Part::bytes(file.data.to_vec()).file_name(file.name);
            form.part("files", part)
        });

        debug!(files = count, "Uploading scan files");
        let url = self.url("/preprocess/upload");
        let builder = self
            .request(Method::POST, &url)
            .timeout(self.upload_timeout)
            .multipart(form);
        self.send_json(builder, None).await
    }

    async fn run_inference(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        let url = self.url("/infer");
        let builder = self.request(Method::POST, &url).json(request);
        self.send_json(builder, None).await
    }

    async fn list_files(&self, query: &FileListQuery) -> Result<Vec<FileMetadata>> {
        let url = self.url("/files");
        let builder = self
            .request(Method::GET, &url)
            .query(&query.to_query_pairs());
        self.send_json(builder, None).await
    }

    async fn download(&self, locator: &ResourceLocator) -> Result<Bytes> {
        // Credentials are only sent to the job service itself.
        let builder = if locator.is_service_relative() {
            self.request(Method::GET, &self.url(locator.as_str()))
        } else {
            self.client.get(locator.as_str())
        };
        let response = self.send(builder, None).await?;
        Ok(response.bytes().await?)
    }
}
