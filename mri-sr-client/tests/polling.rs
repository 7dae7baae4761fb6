mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedApi, id, record};
use mri_sr_client::Error;
use mri_sr_client::domain::JobStatus;
use mri_sr_client::jobs::JobService;
use mri_sr_client::polling::{JobPoller, PollEvent, PollState, PollerConfig, StopOnError};
use tokio::time::Instant;

fn setup(config: PollerConfig) -> (Arc<ScriptedApi>, JobPoller<ScriptedApi>) {
    let api = Arc::new(ScriptedApi::new());
    let poller = JobPoller::with_config(JobService::new(api.clone()), config);
    (api, poller)
}

async fn collect(subscription: &mut mri_sr_client::polling::PollSubscription) -> Vec<PollEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        events.push(event);
    }
    events
}

fn progress_and_status(event: &PollEvent) -> (u8, JobStatus) {
    let job = event.record().expect("update event");
    (job.progress, job.status)
}

#[tokio::test(start_paused = true)]
async fn test_polling_ends_on_terminal_record() {
    let (api, poller) = setup(PollerConfig::default());
    api.push(
        "j1",
        [
            Ok(record("j1", JobStatus::Processing, 40, 0)),
            Ok(record("j1", JobStatus::Processing, 70, 1)),
            Ok(record("j1", JobStatus::Completed, 100, 2)),
        ],
    );

    let started = Instant::now();
    let mut subscription = poller.subscribe(&id("j1"));
    assert_eq!(poller.state(&id("j1")), PollState::Polling);

    let events = collect(&mut subscription).await;
    assert_eq!(events.len(), 3);
    assert_eq!(progress_and_status(&events[0]), (40, JobStatus::Processing));
    assert_eq!(progress_and_status(&events[1]), (70, JobStatus::Processing));
    assert_eq!(progress_and_status(&events[2]).1, JobStatus::Completed);
    assert!(events[2].is_terminal());

    // Immediate first tick, then one tick per interval.
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(poller.state(&id("j1")), PollState::Completed);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.status_calls("j1"), 3);
    assert_eq!(poller.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_job_is_not_polled_again() {
    let (api, poller) = setup(PollerConfig::default());
    api.push("j1", [Ok(record("j1", JobStatus::Failed, 0, 1))]);

    let finished = poller.wait_for_terminal(&id("j1")).await.unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(api.status_calls("j1"), 1);

    let mut again = poller.subscribe(&id("j1"));
    let events = collect(&mut again).await;
    assert_eq!(events.len(), 1);
    assert_eq!(progress_and_status(&events[0]).1, JobStatus::Failed);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.status_calls("j1"), 1);
    assert_eq!(poller.state(&id("j1")), PollState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_second_subscriber_shares_loop() {
    let (api, poller) = setup(PollerConfig::default());
    api.push("j1", [Ok(record("j1", JobStatus::Processing, 10, 0))]);

    let mut first = poller.subscribe(&id("j1"));
    let mut second = poller.subscribe(&id("j1"));
    assert_eq!(poller.active_count(), 1);
    assert_eq!(poller.subscriber_count(&id("j1")), 2);

    assert!(first.recv().await.is_some());
    assert!(second.recv().await.is_some());
    assert_eq!(api.status_calls("j1"), 1);

    first.unsubscribe();
    assert_eq!(poller.subscriber_count(&id("j1")), 1);

    // The remaining subscriber keeps receiving.
    assert!(second.recv().await.is_some());
    assert_eq!(api.status_calls("j1"), 2);

    second.unsubscribe();
    assert_eq!(poller.state(&id("j1")), PollState::Stopped);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(api.status_calls("j1"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_subscription_cancels_in_flight_tick() {
    let (api, poller) = setup(PollerConfig::default());
    api.set_latency(Duration::from_secs(2));
    api.push("j1", [Ok(record("j1", JobStatus::Processing, 50, 0))]);

    let subscription = poller.subscribe(&id("j1"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(api.status_calls("j1"), 1);

    drop(subscription);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(api.status_calls("j1"), 1);
    assert!(poller.service().peek(&id("j1")).is_none());
    assert_eq!(poller.state(&id("j1")), PollState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_missing_job_stops_polling() {
    let (api, poller) = setup(PollerConfig::default());
    api.push(
        "j9",
        [
            Ok(record("j9", JobStatus::Pending, 0, 0)),
            Err(Error::job_not_found("j9")),
        ],
    );

    let mut subscription = poller.subscribe(&id("j9"));
    let events = collect(&mut subscription).await;

    assert_eq!(events.len(), 2);
    match &events[1] {
        PollEvent::Error {
            error,
            consecutive_failures,
            persistent,
        } => {
            assert!(error.is_not_found());
            assert_eq!(*consecutive_failures, 1);
            assert!(!persistent);
        }
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(poller.state(&id("j9")), PollState::Stopped);

    // The last known record is kept.
    assert_eq!(
        poller.service().peek(&id("j9")).unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_tolerated() {
    let config = PollerConfig::default()
        .with_stop_on_error(StopOnError::Never)
        .with_max_consecutive_failures(2);
    let (api, poller) = setup(config);
    let network = || Err(Error::Network("connection reset".to_string()));
    api.push(
        "j2",
        [
            network(),
            network(),
            network(),
            Ok(record("j2", JobStatus::Completed, 100, 3)),
        ],
    );

    let mut subscription = poller.subscribe(&id("j2"));
    let events = collect(&mut subscription).await;
    assert_eq!(events.len(), 4);

    let flags: Vec<(u32, bool)> = events[..3]
        .iter()
        .map(|event| match event {
            PollEvent::Error {
                consecutive_failures,
                persistent,
                ..
            } => (*consecutive_failures, *persistent),
            other => panic!("expected error event, got {other:?}"),
        })
        .collect();
    assert_eq!(flags, vec![(1, false), (2, false), (3, true)]);
    assert!(events[3].is_terminal());
    assert_eq!(poller.state(&id("j2")), PollState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_stop_on_any_error() {
    let config = PollerConfig::default().with_stop_on_error(StopOnError::Any);
    let (api, poller) = setup(config);
    api.push("j3", [Err(Error::http(503, "Service Unavailable"))]);

    let err = poller.wait_for_terminal(&id("j3")).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(api.status_calls("j3"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_resumes_polling_of_terminal_job() {
    let (api, poller) = setup(PollerConfig::default());
    api.push("j4", [Ok(record("j4", JobStatus::Failed, 0, 1))]);
    poller.wait_for_terminal(&id("j4")).await.unwrap();

    poller.service().retry_job(&id("j4")).await.unwrap();
    api.push(
        "j4",
        [
            Ok(record("j4", JobStatus::Pending, 0, 2)),
            Ok(record("j4", JobStatus::Completed, 100, 3)),
        ],
    );

    let mut statuses = Vec::new();
    let finished = poller
        .wait_for_terminal_with(&id("j4"), |event| {
            if let Some(job) = event.record() {
                statuses.push(job.status);
            }
        })
        .await
        .unwrap();

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(statuses, vec![JobStatus::Pending, JobStatus::Completed]);
    assert_eq!(api.status_calls("j4"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_clear_forgets_outcomes_and_cache() {
    let (api, poller) = setup(PollerConfig::default());
    api.push("j1", [Ok(record("j1", JobStatus::Completed, 100, 0))]);

    let job = poller.wait_for_terminal(&id("j1")).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(poller.state(&id("j1")), PollState::Completed);

    poller.clear();
    assert_eq!(poller.state(&id("j1")), PollState::Idle);
    assert!(poller.service().peek(&id("j1")).is_none());
}
