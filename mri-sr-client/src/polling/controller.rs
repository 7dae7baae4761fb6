//! The polling controller.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::subscription::PollSubscription;
use super::{PollEvent, PollState, PollerConfig};
use crate::api::JobApi;
use crate::domain::{JobId, JobRecord};
use crate::jobs::JobService;
use crate::{Error, Result};

/// Finished outcomes kept for [`JobPoller::state`]. The oldest are
/// forgotten first.
pub(super) const OUTCOME_CAPACITY: usize = 1024;

struct PollLoop {
    generation: u64,
    listeners: HashMap<u64, mpsc::UnboundedSender<PollEvent>>,
    token: CancellationToken,
}

/// Loops and outcomes by job id. Every delivery and every detach happens
/// under the registry lock, so a detached listener never sees another event.
#[derive(Default)]
pub(super) struct PollRegistry {
    loops: HashMap<JobId, PollLoop>,
    outcomes: HashMap<JobId, PollState>,
    /// Outcome ids, oldest first.
    finished: VecDeque<JobId>,
}

impl PollRegistry {
    /// Send `event` to every listener of the loop `generation`.
    ///
    /// `finish` ends the loop with that outcome after delivery. Returns
    /// whether the loop should keep running.
    fn deliver(
        &mut self,
        id: &JobId,
        generation: u64,
        event: PollEvent,
        finish: Option<PollState>,
    ) -> bool {
        let Some(active) = self
            .loops
            .get_mut(id)
            .filter(|active| active.generation == generation)
        else {
            return false;
        };

        active
            .listeners
            .retain(|_, sender| sender.send(event.clone()).is_ok());
        let orphaned = active.listeners.is_empty();

        match finish {
            Some(outcome) => {
                self.end(id, outcome);
                false
            }
            None if orphaned => {
                self.end(id, PollState::Stopped);
                false
            }
            None => true,
        }
    }

    pub(super) fn detach(&mut self, id: &JobId, generation: u64, listener: u64) {
        let Some(active) = self
            .loops
            .get_mut(id)
            .filter(|active| active.generation == generation)
        else {
            return;
        };

        active.listeners.remove(&listener);
        if active.listeners.is_empty() {
            debug!(job_id = %id, "Last subscriber detached, stopping poll loop");
            self.end(id, PollState::Stopped);
        }
    }

    fn end(&mut self, id: &JobId, outcome: PollState) {
        if let Some(active) = self.loops.remove(id) {
            active.token.cancel();
        }
        self.record_outcome(id, outcome);
    }

    fn record_outcome(&mut self, id: &JobId, outcome: PollState) {
        if self.outcomes.insert(id.clone(), outcome).is_none() {
            self.finished.push_back(id.clone());
        }
        while self.finished.len() > OUTCOME_CAPACITY {
            if let Some(oldest) = self.finished.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }

    fn forget_outcome(&mut self, id: &JobId) {
        if self.outcomes.remove(id).is_some() {
            self.finished.retain(|finished| finished != id);
        }
    }
}

/// Polls jobs until they reach a terminal state.
///
/// Must be used from within a tokio runtime: the first subscription to a
/// job spawns its loop.
pub struct JobPoller<A: JobApi> {
    service: JobService<A>,
    config: PollerConfig,
    registry: Arc<Mutex<PollRegistry>>,
    next_id: Arc<AtomicU64>,
}

impl<A: JobApi> Clone for JobPoller<A> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            config: self.config,
            registry: self.registry.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<A: JobApi> JobPoller<A> {
    pub fn new(service: JobService<A>) -> Self {
        Self::with_config(service, PollerConfig::default())
    }

    pub fn with_config(service: JobService<A>, config: PollerConfig) -> Self {
        Self {
            service,
            config,
            registry: Arc::new(Mutex::new(PollRegistry::default())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn service(&self) -> &JobService<A> {
        &self.service
    }

    /// Subscribe to a job's polling notifications.
    ///
    /// Attaches to the job's running loop if there is one. A job whose
    /// cached record is already terminal yields that record immediately
    /// and is not polled. Otherwise a loop is started; its first check is
    /// immediate.
    pub fn subscribe(&self, id: &JobId) -> PollSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listener = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.lock();

        if let Some(active) = registry.loops.get_mut(id) {
            active.listeners.insert(listener, sender);
            debug!(
                job_id = %id,
                listeners = active.listeners.len(),
                "Attached to poll loop"
            );
            return PollSubscription::attached(
                id.clone(),
                receiver,
                self.registry.clone(),
                active.generation,
                listener,
            );
        }

        if let Some(job) = self.service.cache().settled_job(id) {
            debug!(job_id = %id, status = %job.status, "Job already terminal, not polling");
            registry.record_outcome(id, PollState::for_status(job.status));
            let _ = sender.send(PollEvent::Update(job));
            return PollSubscription::detached(id.clone(), receiver);
        }

        let generation = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        registry.forget_outcome(id);
        registry.loops.insert(
            id.clone(),
            PollLoop {
                generation,
                listeners: HashMap::from([(listener, sender)]),
                token: token.clone(),
            },
        );
        drop(registry);

        info!(
            job_id = %id,
            interval_ms = self.config.interval.as_millis() as u64,
            "Polling started"
        );
        tokio::spawn(run_loop(
            self.service.clone(),
            self.registry.clone(),
            self.config,
            id.clone(),
            generation,
            token,
        ));

        PollSubscription::attached(
            id.clone(),
            receiver,
            self.registry.clone(),
            generation,
            listener,
        )
    }

    /// Current polling state of a job.
    pub fn state(&self, id: &JobId) -> PollState {
        let registry = self.registry.lock();
        if registry.loops.contains_key(id) {
            return PollState::Polling;
        }
        registry
            .outcomes
            .get(id)
            .copied()
            .unwrap_or(PollState::Idle)
    }

    pub fn is_polling(&self, id: &JobId) -> bool {
        self.registry.lock().loops.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().loops.len()
    }

    pub fn subscriber_count(&self, id: &JobId) -> usize {
        self.registry
            .lock()
            .loops
            .get(id)
            .map_or(0, |active| active.listeners.len())
    }

    /// Stop every loop. Subscribers see their streams end.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        let ids: Vec<JobId> = registry.loops.keys().cloned().collect();
        for id in &ids {
            registry.end(id, PollState::Stopped);
        }
        if !ids.is_empty() {
            info!(loops = ids.len(), "Polling shut down");
        }
    }

    /// Stop every loop and forget every outcome, along with the cached jobs.
    pub fn clear(&self) {
        self.shutdown();
        let mut registry = self.registry.lock();
        registry.outcomes.clear();
        registry.finished.clear();
        drop(registry);
        self.service.clear();
    }

    /// Poll a job until it is terminal and return the terminal record.
    pub async fn wait_for_terminal(&self, id: &JobId) -> Result<Arc<JobRecord>> {
        self.wait_for_terminal_with(id, |_| {}).await
    }

    /// Like [`wait_for_terminal`](Self::wait_for_terminal), calling
    /// `on_event` for every notification on the way.
    pub async fn wait_for_terminal_with<F>(
        &self,
        id: &JobId,
        mut on_event: F,
    ) -> Result<Arc<JobRecord>>
    where
        F: FnMut(&PollEvent),
    {
        let mut subscription = self.subscribe(id);
        let mut last_error = None;

        while let Some(event) = subscription.recv().await {
            on_event(&event);
            match event {
                PollEvent::Update(job) if job.is_terminal() => return Ok(job),
                PollEvent::Update(_) => {}
                PollEvent::Error { error, .. } => last_error = Some(error),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Other(format!("polling of job {id} stopped"))))
    }
}

async fn run_loop<A: JobApi>(
    service: JobService<A>,
    registry: Arc<Mutex<PollRegistry>>,
    config: PollerConfig,
    id: JobId,
    generation: u64,
    token: CancellationToken,
) {
    let mut consecutive_failures = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(job_id = %id, "Poll loop cancelled");
                return;
            }
            result = service.refresh_status(&id) => result,
        };

        let keep_running = match result {
            Ok(job) => {
                consecutive_failures = 0;
                let finish = job.is_terminal().then(|| PollState::for_status(job.status));
                debug!(
                    job_id = %id,
                    status = %job.status,
                    progress = job.progress,
                    "Poll tick"
                );
                if finish.is_some() {
                    info!(job_id = %id, status = %job.status, "Job reached terminal state");
                }
                registry
                    .lock()
                    .deliver(&id, generation, PollEvent::Update(job), finish)
            }
            Err(error) => {
                consecutive_failures += 1;
                let persistent = consecutive_failures > config.max_consecutive_failures;
                let stop = config.stop_on_error.should_stop(&error);
                warn!(
                    job_id = %id,
                    attempt = consecutive_failures,
                    error = %error,
                    "Poll tick failed"
                );
                if stop {
                    info!(job_id = %id, "Polling stopped on error");
                }
                let event = PollEvent::Error {
                    error,
                    consecutive_failures,
                    persistent,
                };
                registry
                    .lock()
                    .deliver(&id, generation, event, stop.then_some(PollState::Stopped))
            }
        };

        if !keep_running {
            return;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(job_id = %id, "Poll loop cancelled");
                return;
            }
            _ = tokio::time::sleep(config.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> JobId {
        JobId::new(value).unwrap()
    }

    #[test]
    fn test_outcomes_are_bounded() {
        let mut registry = PollRegistry::default();
        for n in 0..OUTCOME_CAPACITY + 10 {
            registry.end(&id(&format!("j{n}")), PollState::Completed);
        }

        assert_eq!(registry.outcomes.len(), OUTCOME_CAPACITY);
        assert_eq!(registry.finished.len(), OUTCOME_CAPACITY);
        assert!(!registry.outcomes.contains_key(&id("j0")));
        assert!(!registry.outcomes.contains_key(&id("j9")));
        assert_eq!(
            registry.outcomes.get(&id(&format!("j{}", OUTCOME_CAPACITY + 9))),
            Some(&PollState::Completed)
        );
    }

    #[test]
    fn test_repeated_outcome_keeps_one_slot() {
        let mut registry = PollRegistry::default();
        registry.end(&id("j1"), PollState::Stopped);
        registry.end(&id("j1"), PollState::Failed);
        assert_eq!(registry.finished.len(), 1);
        assert_eq!(registry.outcomes.get(&id("j1")), Some(&PollState::Failed));

        registry.forget_outcome(&id("j1"));
        assert!(registry.outcomes.is_empty());
        assert!(registry.finished.is_empty());
    }
}
