//! Job record cache.
//!
//! Holds job details and job list pages with a staleness window each, plus
//! in-flight markers so concurrent reads of one job share a single fetch.
//!
//! Invalidation marks entries stale instead of removing them, so the last
//! known-good record stays available through [`JobCache::peek_job`]. Every
//! fetch takes a [`FetchTicket`] before its request is sent. A result whose
//! ticket predates an invalidation covering it is never stored.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, OnceCell};
use tokio::time::Instant;
use tracing::debug;

use crate::Error;
use crate::domain::{JobId, JobListQuery, JobRecord, PagedJobs};

/// Default staleness window of a job detail entry.
pub const DEFAULT_DETAIL_TTL: Duration = Duration::from_secs(10);

/// Default staleness window of a job list entry.
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(30);

struct CacheEntry<T> {
    value: Arc<T>,
    fetched_at: Instant,
    stale: bool,
    /// Latest invalidation this value was fetched after. Tickets below it
    /// are superseded.
    floor: u64,
}

impl<T> CacheEntry<T> {
    fn new(value: Arc<T>) -> Self {
        Self::with_floor(value, 0)
    }

    fn with_floor(value: Arc<T>, floor: u64) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            stale: false,
            floor,
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.stale && self.fetched_at.elapsed() < ttl
    }
}

/// Ordering token taken when a fetch starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Why an in-flight fetch did not produce a record for its waiters.
#[derive(Debug, Clone)]
pub(crate) enum InFlightError {
    /// The fetch was invalidated or abandoned; waiters should start over.
    Superseded,
    Failed(Error),
}

pub(crate) type InFlightResult = std::result::Result<Arc<JobRecord>, InFlightError>;

pub(crate) struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

pub(crate) type InFlightRequest = Arc<InFlightState>;

/// How [`JobCache::store_job`] treated a fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The record replaced the cached one.
    Accepted,
    /// The cached record is newer; it was kept.
    Outdated,
    /// The entry was invalidated after the fetch started; nothing was stored.
    Superseded,
}

/// Result of storing a fetched record.
#[derive(Debug, Clone)]
pub struct Stored {
    /// The newest record known for the job.
    pub record: Arc<JobRecord>,
    pub kind: StoreKind,
}

/// Thread-safe job cache.
pub struct JobCache {
    jobs: DashMap<JobId, CacheEntry<JobRecord>>,
    lists: DashMap<JobListQuery, CacheEntry<PagedJobs>>,
    in_flight: DashMap<JobId, InFlightRequest>,
    /// Sequence number of the last invalidation of each job.
    invalidated: DashMap<JobId, u64>,
    lists_invalidated: AtomicU64,
    all_invalidated: AtomicU64,
    sequence: AtomicU64,
    detail_ttl: Duration,
    list_ttl: Duration,
}

impl JobCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_DETAIL_TTL, DEFAULT_LIST_TTL)
    }

    pub fn with_ttl(detail_ttl: Duration, list_ttl: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            lists: DashMap::new(),
            in_flight: DashMap::new(),
            invalidated: DashMap::new(),
            lists_invalidated: AtomicU64::new(0),
            all_invalidated: AtomicU64::new(0),
            sequence: AtomicU64::new(1),
            detail_ttl,
            list_ttl,
        }
    }

    pub fn detail_ttl(&self) -> Duration {
        self.detail_ttl
    }

    pub fn list_ttl(&self) -> Duration {
        self.list_ttl
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }

    /// Take a ticket for a fetch that is about to be sent.
    pub fn ticket(&self) -> FetchTicket {
        FetchTicket(self.next_sequence())
    }

    fn job_superseded(&self, id: &JobId, ticket: FetchTicket) -> bool {
        ticket.0 < self.all_invalidated.load(Ordering::Acquire)
            || self.invalidated.get(id).is_some_and(|seq| ticket.0 < *seq)
    }

    /// Move a job's invalidation into the entry about to be stored, so the
    /// map only holds invalidations no fetch has caught up with yet.
    fn take_invalidation(&self, id: &JobId) -> u64 {
        self.invalidated.remove(id).map_or(0, |(_, seq)| seq)
    }

    fn list_superseded(&self, ticket: FetchTicket) -> bool {
        ticket.0 < self.all_invalidated.load(Ordering::Acquire)
            || ticket.0 < self.lists_invalidated.load(Ordering::Acquire)
    }

    // ========== Job details ==========

    /// The cached record, if it is within its staleness window.
    pub fn fresh_job(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        let entry = self.jobs.get(id)?;
        entry
            .is_fresh(self.detail_ttl)
            .then(|| entry.value.clone())
    }

    /// The cached record regardless of freshness.
    pub fn peek_job(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        self.jobs.get(id).map(|entry| entry.value.clone())
    }

    /// The cached record if it is terminal and has not been invalidated.
    ///
    /// Terminal records never change, so the staleness window does not
    /// apply. An explicit invalidation (a retry, for example) does.
    pub fn settled_job(&self, id: &JobId) -> Option<Arc<JobRecord>> {
        let entry = self.jobs.get(id)?;
        (!entry.stale && entry.value.is_terminal()).then(|| entry.value.clone())
    }

    /// Store a fetched record.
    ///
    /// A record is discarded so an entry never regresses when it is older
    /// than the cached one (by `updated_at`), or when it is not terminal
    /// while the cached record is terminal and not invalidated. The cached
    /// record then counts as freshly confirmed.
    pub fn store_job(&self, ticket: FetchTicket, record: JobRecord) -> Stored {
        match self.jobs.entry(record.id.clone()) {
            Entry::Occupied(mut entry) => {
                if ticket.0 < entry.get().floor || self.job_superseded(&record.id, ticket) {
                    return Stored {
                        record: Arc::new(record),
                        kind: StoreKind::Superseded,
                    };
                }

                let floor = self.take_invalidation(&record.id).max(entry.get().floor);
                let current = entry.get();
                let reopened =
                    current.value.is_terminal() && !current.stale && !record.is_terminal();
                if reopened || record.is_older_than(&current.value) {
                    debug!(
                        job_id = %record.id,
                        status = %record.status,
                        "Discarding out-of-order job record"
                    );
                    let current = entry.get_mut();
                    current.fetched_at = Instant::now();
                    current.stale = false;
                    current.floor = floor;
                    return Stored {
                        record: current.value.clone(),
                        kind: StoreKind::Outdated,
                    };
                }

                let record = Arc::new(record);
                entry.insert(CacheEntry::with_floor(record.clone(), floor));
                Stored {
                    record,
                    kind: StoreKind::Accepted,
                }
            }
            Entry::Vacant(entry) => {
                let record = Arc::new(record);
                if self.job_superseded(&record.id, ticket) {
                    return Stored {
                        record,
                        kind: StoreKind::Superseded,
                    };
                }
                let floor = self.take_invalidation(&record.id);
                entry.insert(CacheEntry::with_floor(record.clone(), floor));
                Stored {
                    record,
                    kind: StoreKind::Accepted,
                }
            }
        }
    }

    // ========== Job lists ==========

    pub fn fresh_list(&self, query: &JobListQuery) -> Option<Arc<PagedJobs>> {
        let entry = self.lists.get(query)?;
        entry.is_fresh(self.list_ttl).then(|| entry.value.clone())
    }

    pub fn peek_list(&self, query: &JobListQuery) -> Option<Arc<PagedJobs>> {
        self.lists.get(query).map(|entry| entry.value.clone())
    }

    /// Store a fetched list page and refresh the detail entry of every job
    /// on it. Returns the page and the outcome for each item.
    pub fn store_list(
        &self,
        ticket: FetchTicket,
        query: JobListQuery,
        page: PagedJobs,
    ) -> (Arc<PagedJobs>, Vec<Stored>) {
        let stored = page
            .items
            .iter()
            .map(|item| self.store_job(ticket, item.clone()))
            .collect();

        let page = Arc::new(page);
        match self.lists.entry(query) {
            Entry::Occupied(mut entry) => {
                if !self.list_superseded(ticket) {
                    entry.insert(CacheEntry::new(page.clone()));
                }
            }
            Entry::Vacant(entry) => {
                if !self.list_superseded(ticket) {
                    entry.insert(CacheEntry::new(page.clone()));
                }
            }
        }
        (page, stored)
    }

    // ========== Invalidation ==========

    /// Mark one job stale and detach waiters of its in-flight fetch.
    pub fn invalidate_job(&self, id: &JobId) {
        let seq = self.next_sequence();
        self.invalidated.insert(id.clone(), seq);
        if let Some(mut entry) = self.jobs.get_mut(id) {
            entry.stale = true;
        }
        self.cancel_in_flight(id);
    }

    /// Mark every list page stale. Detail entries are left alone.
    pub fn invalidate_lists(&self) {
        let seq = self.next_sequence();
        self.lists_invalidated.store(seq, Ordering::Release);
        for mut entry in self.lists.iter_mut() {
            entry.stale = true;
        }
    }

    /// Mark everything stale.
    pub fn invalidate_all(&self) {
        let seq = self.next_sequence();
        self.all_invalidated.store(seq, Ordering::Release);
        self.invalidated.clear();
        for mut entry in self.jobs.iter_mut() {
            entry.stale = true;
        }
        for mut entry in self.lists.iter_mut() {
            entry.stale = true;
        }
        self.cancel_all_in_flight();
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let seq = self.next_sequence();
        self.all_invalidated.store(seq, Ordering::Release);
        self.invalidated.clear();
        self.jobs.clear();
        self.lists.clear();
        self.cancel_all_in_flight();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            job_count: self.jobs.len(),
            stale_job_count: self.jobs.iter().filter(|e| e.stale).count(),
            list_count: self.lists.len(),
            pending_invalidations: self.invalidated.len(),
            in_flight_count: self.in_flight.len(),
            detail_ttl: self.detail_ttl,
            list_ttl: self.list_ttl,
        }
    }

    // ========== Request Deduplication ==========

    /// Get or create the in-flight fetch for a job. `true` means the caller
    /// owns the new fetch and must complete, fail or abandon it.
    pub(crate) fn get_or_create_in_flight(&self, id: &JobId) -> (InFlightRequest, bool) {
        if let Some(existing) = self.in_flight.get(id) {
            return (existing.clone(), false);
        }

        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let request = Arc::new(InFlightState::new());
                entry.insert(request.clone());
                (request, true)
            }
        }
    }

    /// Finish `request` with `result`, if it is still the job's current fetch.
    pub(crate) fn finish_in_flight(
        &self,
        id: &JobId,
        request: &InFlightRequest,
        result: InFlightResult,
    ) {
        if let Some((_, current)) = self
            .in_flight
            .remove_if(id, |_, current| Arc::ptr_eq(current, request))
        {
            current.set_result(result);
        } else {
            // Already detached by an invalidation; wake anyone still waiting.
            request.set_result(Err(InFlightError::Superseded));
        }
    }

    pub(crate) async fn wait_for_in_flight(&self, request: &InFlightRequest) -> InFlightResult {
        request.wait().await
    }

    fn cancel_in_flight(&self, id: &JobId) {
        if let Some((_, request)) = self.in_flight.remove(id) {
            request.set_result(Err(InFlightError::Superseded));
        }
    }

    fn cancel_all_in_flight(&self) {
        self.in_flight.retain(|_, request| {
            request.set_result(Err(InFlightError::Superseded));
            false
        });
    }

    pub fn has_in_flight(&self, id: &JobId) -> bool {
        self.in_flight.contains_key(id)
    }
}

impl Default for JobCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the job cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub job_count: usize,
    pub stale_job_count: usize,
    pub list_count: usize,
    /// Invalidated jobs not stored again since.
    pub pending_invalidations: usize,
    pub in_flight_count: usize,
    pub detail_ttl: Duration,
    pub list_ttl: Duration,
}
