//! Cached job queries.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::cache::{
    InFlightError, InFlightRequest, InFlightResult, JobCache, StoreKind, Stored,
};
use super::events::{InvalidateTarget, JobEvent, JobEventBroadcaster};
use crate::Result;
use crate::api::JobApi;
use crate::config::ClientConfig;
use crate::domain::{JobId, JobListQuery, JobRecord, PagedJobs};

/// Job reads through the cache.
///
/// The service is the only writer of the cache: reads store what they
/// fetch, and the mutation triggers invalidate what they affect. Surfaces
/// read through [`get`](Self::get), [`list`](Self::list) and
/// [`peek`](Self::peek) and learn about changes from
/// [`subscribe`](Self::subscribe).
pub struct JobService<A: JobApi> {
    pub(super) api: Arc<A>,
    cache: Arc<JobCache>,
    events: JobEventBroadcaster,
}

impl<A: JobApi> Clone for JobService<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            cache: self.cache.clone(),
            events: self.events.clone(),
        }
    }
}

impl<A: JobApi> JobService<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self::with_cache(api, JobCache::new())
    }

    pub fn with_cache(api: Arc<A>, cache: JobCache) -> Self {
        Self {
            api,
            cache: Arc::new(cache),
            events: JobEventBroadcaster::new(),
        }
    }

    /// A service whose staleness windows come from `config`.
    pub fn from_config(api: Arc<A>, config: &ClientConfig) -> Self {
        Self::with_cache(
            api,
            JobCache::with_ttl(config.detail_ttl(), config.list_ttl()),
        )
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn cache(&self) -> &JobCache {
        &self.cache
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    // ========== Reads ==========

    /// Get a job, fetching it unless the cached record is fresh.
    ///
    /// Concurrent calls for the same id share one request. On failure the
    /// cached entry is left as it was.
    pub async fn get(&self, id: &JobId) -> Result<Arc<JobRecord>> {
        loop {
            if let Some(job) = self.cache.fresh_job(id) {
                trace!(job_id = %id, "Cache hit");
                return Ok(job);
            }

            let (request, is_new) = self.cache.get_or_create_in_flight(id);
            if is_new {
                return self.fetch_as_owner(id, request).await;
            }

            trace!(job_id = %id, "Waiting for in-flight fetch");
            match self.cache.wait_for_in_flight(&request).await {
                Ok(job) => return Ok(job),
                Err(InFlightError::Failed(error)) => return Err(error),
                // Invalidated or abandoned; look again.
                Err(InFlightError::Superseded) => continue,
            }
        }
    }

    async fn fetch_as_owner(
        &self,
        id: &JobId,
        request: InFlightRequest,
    ) -> Result<Arc<JobRecord>> {
        let guard = InFlightGuard {
            cache: &self.cache,
            id,
            request: Some(request),
        };

        debug!(job_id = %id, "Fetching job");
        let ticket = self.cache.ticket();
        match self.api.get_job(id).await {
            Ok(record) => {
                let stored = self.cache.store_job(ticket, record);
                guard.finish(Ok(stored.record.clone()));
                self.announce(&stored);
                Ok(stored.record)
            }
            Err(error) => {
                warn!(job_id = %id, error = %error, "Failed to fetch job");
                guard.finish(Err(InFlightError::Failed(error.clone())));
                Err(error)
            }
        }
    }

    /// Fetch a job's status, bypassing freshness and deduplication.
    ///
    /// This is the polling read: every call is a network check.
    pub async fn refresh_status(&self, id: &JobId) -> Result<Arc<JobRecord>> {
        let ticket = self.cache.ticket();
        let record = self.api.get_job_status(id).await?;
        let stored = self.cache.store_job(ticket, record);
        self.announce(&stored);
        Ok(stored.record)
    }

    /// Invalidate a job and fetch it again.
    pub async fn refresh(&self, id: &JobId) -> Result<Arc<JobRecord>> {
        self.invalidate(InvalidateTarget::Job(id.clone()));
        self.get(id).await
    }

    /// Get a job list page, fetching it unless the cached page is fresh.
    ///
    /// Every job on a fetched page also refreshes its detail entry.
    pub async fn list(&self, query: &JobListQuery) -> Result<Arc<PagedJobs>> {
        if let Some(page) = self.cache.fresh_list(query) {
            trace!(page = query.page, "List cache hit");
            return Ok(page);
        }

        debug!(page = query.page, size = query.size, "Fetching job list");
        let ticket = self.cache.ticket();
        let page = self.api.list_jobs(query).await.inspect_err(|error| {
            warn!(page = query.page, error = %error, "Failed to fetch job list");
        })?;

        let (page, stored) = self.cache.store_list(ticket, query.clone(), page);
        for item in &stored {
            self.announce(item);
        }
        Ok(page)
    }

    /// The cached record regardless of freshness. Never fetches.
    pub fn peek(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        self.cache.peek_job(id)
    }

    // ========== Invalidation ==========

    /// Mark entries stale so the next read refetches them.
    pub fn invalidate(&self, target: InvalidateTarget) {
        match &target {
            InvalidateTarget::Job(id) => self.cache.invalidate_job(id),
            InvalidateTarget::Lists => self.cache.invalidate_lists(),
            InvalidateTarget::All => self.cache.invalidate_all(),
        }
        debug!("Invalidated {target}");
        self.events.publish(JobEvent::Invalidated(target));
    }

    /// Tear the cache down, e.g. on logout.
    pub fn clear(&self) {
        self.cache.clear();
        info!("Job cache cleared");
        self.events.publish(JobEvent::Cleared);
    }

    fn announce(&self, stored: &Stored) {
        if stored.kind == StoreKind::Accepted {
            self.events.publish(JobEvent::Updated(stored.record.clone()));
        }
    }
}

/// Abandons an owned in-flight fetch if it is dropped unfinished, so
/// waiters start over instead of waiting forever.
struct InFlightGuard<'a> {
    cache: &'a JobCache,
    id: &'a JobId,
    request: Option<InFlightRequest>,
}

impl InFlightGuard<'_> {
    fn finish(mut self, result: InFlightResult) {
        if let Some(request) = self.request.take() {
            self.cache.finish_in_flight(self.id, &request, result);
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.cache
                .finish_in_flight(self.id, &request, Err(InFlightError::Superseded));
        }
    }
}
