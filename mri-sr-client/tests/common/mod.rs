//! Shared test fixtures: a scripted in-memory job API.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;

use mri_sr_client::api::{
    CancelResponse, FileListQuery, FileMetadata, InferenceRequest, InferenceResponse, JobApi,
    RetryResponse, UploadResponse,
};
use mri_sr_client::domain::{JobId, JobListQuery, JobRecord, JobStatus, PagedJobs, UploadFile};
use mri_sr_client::job_outputs::ResourceLocator;
use mri_sr_client::{Error, Result};

pub fn id(value: &str) -> JobId {
    JobId::new(value).unwrap()
}

/// A job record whose `updated_at` is `minute` minutes after creation.
pub fn record(job_id: &str, status: JobStatus, progress: u8, minute: i64) -> JobRecord {
    let created = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
    serde_json::from_value(serde_json::json!({
        "id": job_id,
        "status": status.as_str(),
        "progress": progress,
        "created_at": created.to_rfc3339(),
        "updated_at": (created + ChronoDuration::minutes(minute)).to_rfc3339(),
    }))
    .unwrap()
}

pub fn page(items: Vec<JobRecord>) -> PagedJobs {
    let total = items.len() as u64;
    PagedJobs {
        items,
        page: 1,
        pages: 1,
        total,
    }
}

/// Responses for one endpoint. Pops in order; once drained the last
/// response repeats.
struct Script<T> {
    queue: VecDeque<Result<T>>,
    last: Option<Result<T>>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
        }
    }

    fn next(&mut self) -> Option<Result<T>> {
        if let Some(next) = self.queue.pop_front() {
            self.last = Some(next.clone());
            return Some(next);
        }
        self.last.clone()
    }
}

#[derive(Default)]
struct Counters {
    detail: Mutex<HashMap<JobId, usize>>,
    status: Mutex<HashMap<JobId, usize>>,
    list: AtomicUsize,
    retry: AtomicUsize,
    cancel: AtomicUsize,
    upload: AtomicUsize,
    infer: AtomicUsize,
}

/// In-memory [`JobApi`] with scripted job responses and call counters.
///
/// Detail and status reads of one job share a single script.
pub struct ScriptedApi {
    jobs: Mutex<HashMap<JobId, Script<JobRecord>>>,
    lists: Mutex<Script<PagedJobs>>,
    counters: Counters,
    latency: Mutex<Option<Duration>>,
    fail_mutations: AtomicBool,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            lists: Mutex::new(Script::new()),
            counters: Counters::default(),
            latency: Mutex::new(None),
            fail_mutations: AtomicBool::new(false),
        }
    }

    /// Queue responses for a job.
    pub fn push(&self, job_id: &str, responses: impl IntoIterator<Item = Result<JobRecord>>) {
        self.jobs
            .lock()
            .entry(id(job_id))
            .or_insert_with(Script::new)
            .queue
            .extend(responses);
    }

    pub fn push_list(&self, response: Result<PagedJobs>) {
        self.lists.lock().queue.push_back(response);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn detail_calls(&self, job_id: &str) -> usize {
        self.counters.detail.lock().get(&id(job_id)).copied().unwrap_or(0)
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.counters.status.lock().get(&id(job_id)).copied().unwrap_or(0)
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list.load(Ordering::SeqCst)
    }

    pub fn retry_calls(&self) -> usize {
        self.counters.retry.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.counters.cancel.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.counters.upload.load(Ordering::SeqCst)
    }

    pub fn infer_calls(&self) -> usize {
        self.counters.infer.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn next_job(&self, job_id: &JobId) -> Result<JobRecord> {
        self.delay().await;
        self.jobs
            .lock()
            .get_mut(job_id)
            .and_then(Script::next)
            .unwrap_or_else(|| Err(Error::job_not_found(job_id.as_str())))
    }

    fn mutation<T>(&self, counter: &AtomicUsize, ok: T) -> Result<T> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(Error::http(500, "Internal Server Error"));
        }
        Ok(ok)
    }
}

#[async_trait]
impl JobApi for ScriptedApi {
    async fn get_job(&self, id: &JobId) -> Result<JobRecord> {
        *self.counters.detail.lock().entry(id.clone()).or_default() += 1;
        self.next_job(id).await
    }

    async fn get_job_status(&self, id: &JobId) -> Result<JobRecord> {
        *self.counters.status.lock().entry(id.clone()).or_default() += 1;
        self.next_job(id).await
    }

    async fn list_jobs(&self, _query: &JobListQuery) -> Result<PagedJobs> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.lists
            .lock()
            .next()
            .unwrap_or_else(|| Ok(page(Vec::new())))
    }

    async fn retry_job(&self, id: &JobId) -> Result<RetryResponse> {
        self.mutation(
            &self.counters.retry,
            RetryResponse {
                job_id: id.clone(),
                message: "Job retry initiated".to_string(),
            },
        )
    }

    async fn cancel_job(&self, _id: &JobId) -> Result<CancelResponse> {
        self.mutation(
            &self.counters.cancel,
            CancelResponse {
                message: "Job cancelled".to_string(),
            },
        )
    }

    async fn upload_files(&self, _files: Vec<UploadFile>) -> Result<UploadResponse> {
        self.mutation(
            &self.counters.upload,
            UploadResponse {
                job_id: id("j-upload"),
                message: "Files uploaded successfully".to_string(),
                uploaded_files: Vec::new(),
            },
        )
    }

    async fn run_inference(&self, _request: &InferenceRequest) -> Result<InferenceResponse> {
        self.mutation(
            &self.counters.infer,
            InferenceResponse {
                inference_job_id: id("j-infer"),
                message: "Inference started".to_string(),
            },
        )
    }

    async fn list_files(&self, _query: &FileListQuery) -> Result<Vec<FileMetadata>> {
        Ok(Vec::new())
    }

    async fn download(&self, locator: &ResourceLocator) -> Result<Bytes> {
        Ok(Bytes::from(locator.as_str().to_string()))
    }
}
