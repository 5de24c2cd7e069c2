//! Integration tests for the download manager
//!
//! These tests drive the manager through its public API with a scripted
//! fetcher and check slot accounting, queue order and lifecycle commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mediagrab::app::fetcher::{Behavior, SimulatedFetcher};
use mediagrab::app::manager::{DownloadManager, EventSubscription, ManagerConfigBuilder};
use mediagrab::app::progress::{Outcome, ResultEvent, Stage, TaskEvent};
use mediagrab::app::strategy::DownloadKind;
use mediagrab::app::task::{TaskId, TaskState};
use mediagrab::errors::ManagerError;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(10);

fn manager(max: usize, fetcher: SimulatedFetcher, dir: &TempDir) -> DownloadManager {
    let config = ManagerConfigBuilder::new()
        .max_concurrent(max)
        .output_dir(dir.path())
        .build()
        .unwrap();
    DownloadManager::with_config(config, Arc::new(fetcher)).unwrap()
}

fn url(i: usize) -> String {
    format!("https://media.test/watch/{}", i)
}

/// Event subscription that keeps results it skipped over
struct Events {
    subscription: EventSubscription,
    results: HashMap<TaskId, ResultEvent>,
}

impl Events {
    fn new(manager: &DownloadManager) -> Self {
        Self {
            subscription: manager.subscribe(),
            results: HashMap::new(),
        }
    }

    async fn next(&mut self) -> TaskEvent {
        let event = timeout(WAIT, self.subscription.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event stream closed");
        if let TaskEvent::Result(result) = &event {
            self.results.insert(result.task_id, result.clone());
        }
        event
    }

    /// Wait for the result event of one task, whenever it was published
    async fn result_for(&mut self, id: TaskId) -> ResultEvent {
        loop {
            if let Some(result) = self.results.remove(&id) {
                return result;
            }
            self.next().await;
        }
    }

    /// Wait until a task reports download progress
    async fn downloading(&mut self, id: TaskId) {
        loop {
            if let TaskEvent::Progress(p) = self.next().await {
                if p.task_id == id && p.stage == Stage::Downloading && p.percent > 0.0 {
                    return;
                }
            }
        }
    }
}

/// Test the concurrency cap under a burst of submissions
///
/// Verifies that no more than `max_concurrent` tasks hold a slot at any
/// observation and that aggregate counts always sum to the number of tasks.
#[tokio::test]
async fn test_concurrency_cap_under_burst() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_default(Behavior::slow(Duration::from_millis(200), 4));
    let manager = manager(2, fetcher, &dir);

    for i in 0..8 {
        assert_ok!(manager.submit(&url(i), DownloadKind::Video).await);
    }

    let mut peak = 0;
    timeout(WAIT, async {
        loop {
            let status = manager.aggregate_status().await;
            assert_eq!(status.total(), 8);
            assert!(status.active() <= 2, "cap exceeded: {}", status);
            peak = peak.max(status.active());
            if status.is_complete() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let status = manager.aggregate_status().await;
    assert_eq!(status.succeeded, 8);
    assert_eq!(status.overall_percent, 100.0);
    assert_eq!(peak, 2);
}

/// Test strict FIFO promotion
///
/// With a single slot, tasks must start probing in submission order.
#[tokio::test]
async fn test_fifo_promotion() {
    let dir = TempDir::new().unwrap();
    let manager = manager(1, SimulatedFetcher::new(), &dir);
    let mut events = Events::new(&manager);

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(manager.submit(&url(i), DownloadKind::Video).await.unwrap());
    }
    manager.wait_until_idle().await;

    let mut probing_order = Vec::new();
    while let Some(event) = events.subscription.try_recv() {
        if let TaskEvent::Progress(p) = event {
            if p.stage == Stage::Probing {
                probing_order.push(p.task_id);
            }
        }
    }
    assert_eq!(probing_order, ids);
}

/// Test FIFO promotion across cancellations
///
/// Cancelling tasks in the middle of the queue must not change the order in
/// which the remaining ones are promoted.
#[tokio::test]
async fn test_fifo_promotion_with_cancellations() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_default(Behavior::slow(Duration::from_millis(400), 4));
    let manager = manager(1, fetcher, &dir);
    let mut events = Events::new(&manager);

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(manager.submit(&url(i), DownloadKind::Video).await.unwrap());
    }
    let (a, b, c, d, e) = (ids[0], ids[1], ids[2], ids[3], ids[4]);

    assert_ok!(manager.cancel(c).await);
    assert_ok!(manager.cancel(b).await);
    assert_eq!(events.result_for(c).await.outcome, Outcome::Cancelled);
    assert_eq!(events.result_for(b).await.outcome, Outcome::Cancelled);

    assert_eq!(events.result_for(a).await.outcome, Outcome::Succeeded);
    assert_eq!(manager.snapshot(d).await.unwrap().state, TaskState::Running);
    assert_eq!(manager.snapshot(e).await.unwrap().state, TaskState::Queued);

    assert_eq!(events.result_for(d).await.outcome, Outcome::Succeeded);
    assert_eq!(events.result_for(e).await.outcome, Outcome::Succeeded);

    let status = manager.aggregate_status().await;
    assert_eq!(status.succeeded, 3);
    assert_eq!(status.cancelled, 2);
}

/// Test cancelling a paused task
///
/// Verifies that a paused task keeps its slot, that cancel wakes it and that
/// the freed slot goes to the next queued task.
#[tokio::test]
async fn test_cancel_paused_task() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new()
        .with_url_strategy(url(0), "best-combined", Behavior::slow(Duration::from_secs(5), 50));
    let manager = manager(1, fetcher, &dir);
    let mut events = Events::new(&manager);

    let first = manager.submit(&url(0), DownloadKind::Video).await.unwrap();
    let second = manager.submit(&url(1), DownloadKind::Video).await.unwrap();

    events.downloading(first).await;
    assert_ok!(manager.pause(first).await);
    sleep(Duration::from_millis(150)).await;

    assert_eq!(manager.snapshot(first).await.unwrap().state, TaskState::Paused);
    assert_eq!(manager.snapshot(second).await.unwrap().state, TaskState::Queued);

    assert_ok!(manager.cancel(first).await);
    let result = events.result_for(first).await;
    assert_eq!(result.outcome, Outcome::Cancelled);

    let result = events.result_for(second).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(manager.snapshot(first).await.unwrap().state, TaskState::Cancelled);
}

/// Test cancelling a queued task
///
/// The task never starts and its result is published at once.
#[tokio::test]
async fn test_cancel_queued_task() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_default(Behavior::slow(Duration::from_millis(300), 3));
    let manager = manager(1, fetcher, &dir);
    let mut events = Events::new(&manager);

    let _running = manager.submit(&url(0), DownloadKind::Video).await.unwrap();
    let queued = manager.submit(&url(1), DownloadKind::Video).await.unwrap();

    assert_ok!(manager.cancel(queued).await);
    let result = events.result_for(queued).await;
    assert_eq!(result.outcome, Outcome::Cancelled);
    assert_eq!(result.strategy, None);

    // Cancelling again is a no-op
    assert_ok!(manager.cancel(queued).await);

    manager.wait_until_idle().await;
    let status = manager.aggregate_status().await;
    assert_eq!(status.succeeded, 1);
    assert_eq!(status.cancelled, 1);
}

/// Test probe failure with a single slot
///
/// The failed task must release its slot to the next task in line while the
/// task behind it stays queued.
#[tokio::test]
async fn test_probe_failure_with_single_slot() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(
        SimulatedFetcher::new()
            .fail_probe(url(0))
            .with_url_strategy(url(1), "best-combined", Behavior::slow(Duration::from_secs(1), 10)),
    );
    let config = ManagerConfigBuilder::new()
        .max_concurrent(1)
        .output_dir(dir.path())
        .build()
        .unwrap();
    let manager = DownloadManager::with_config(config, fetcher.clone()).unwrap();
    let mut events = Events::new(&manager);

    let bad = manager.submit(&url(0), DownloadKind::Video).await.unwrap();
    let next = manager.submit(&url(1), DownloadKind::Video).await.unwrap();
    let last = manager.submit(&url(2), DownloadKind::Video).await.unwrap();

    let result = events.result_for(bad).await;
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(result.retry_count, 0);
    assert_eq!(result.strategy, None);
    assert!(fetcher.attempts_for(&url(0)).is_empty());

    assert_eq!(manager.snapshot(bad).await.unwrap().state, TaskState::Failed);
    assert_eq!(manager.snapshot(next).await.unwrap().state, TaskState::Running);
    assert_eq!(manager.snapshot(last).await.unwrap().state, TaskState::Queued);

    let result = events.result_for(next).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert!(result.path.unwrap().exists());
    assert_eq!(events.result_for(last).await.outcome, Outcome::Succeeded);
}

/// Test raising the concurrency cap
///
/// Queued tasks are promoted immediately when slots are added.
#[tokio::test]
async fn test_set_max_concurrent_promotes_queued() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_default(Behavior::slow(Duration::from_secs(2), 20));
    let manager = manager(1, fetcher, &dir);

    for i in 0..3 {
        manager.submit(&url(i), DownloadKind::Video).await.unwrap();
    }
    let status = manager.aggregate_status().await;
    assert_eq!(status.running, 1);
    assert_eq!(status.queued, 2);

    assert_ok!(manager.set_max_concurrent(3).await);
    let status = manager.aggregate_status().await;
    assert_eq!(status.running, 3);
    assert_eq!(status.queued, 0);

    // Lowering never preempts
    assert_ok!(manager.set_max_concurrent(1).await);
    assert_eq!(manager.aggregate_status().await.running, 3);

    manager.shutdown().await;
    assert_eq!(manager.aggregate_status().await.cancelled, 3);
}

/// Test error reporting for unknown tasks and bad input
#[tokio::test]
async fn test_command_errors() {
    let dir = TempDir::new().unwrap();
    let manager = manager(1, SimulatedFetcher::new(), &dir);
    let unknown = TaskId::new(404);

    assert_err!(manager.cancel(unknown).await);
    assert_err!(manager.resume(unknown).await);
    assert_eq!(
        manager.submit("mailto:someone@media.test", DownloadKind::Video).await,
        Err(ManagerError::InvalidUrl {
            url: "mailto:someone@media.test".to_string(),
            reason: "unsupported scheme 'mailto'".to_string(),
        })
    );
    assert_err!(manager.set_max_concurrent(0).await);
}

/// Test resubmitting a failed task
///
/// A retry creates a new task with a new id; successful tasks cannot be retried.
#[tokio::test]
async fn test_retry_creates_new_task() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_url_strategy(
        url(0),
        "best-combined",
        Behavior::succeed(),
    )
    .with_url_strategy(url(1), "best-combined", Behavior::fail("HTTP 410"))
    .with_url_strategy(url(1), "single-stream", Behavior::fail("HTTP 410"))
    .with_url_strategy(url(1), "lowest-segmented", Behavior::fail("HTTP 410"));
    let manager = manager(2, fetcher, &dir);
    let mut events = Events::new(&manager);

    let ok = manager.submit(&url(0), DownloadKind::Video).await.unwrap();
    let failing = manager.submit(&url(1), DownloadKind::Video).await.unwrap();

    assert_eq!(events.result_for(ok).await.outcome, Outcome::Succeeded);
    let failed = events.result_for(failing).await;
    assert_eq!(failed.outcome, Outcome::Failed);
    assert_eq!(failed.retry_count, 2);

    assert!(matches!(
        manager.retry(ok).await,
        Err(ManagerError::InvalidTransition { operation: "retry", .. })
    ));

    let again = manager.retry(failing).await.unwrap();
    assert!(again > failing);
    let snapshot = manager.snapshot(again).await.unwrap();
    assert_eq!(snapshot.url, url(1));
    assert_eq!(snapshot.kind, Some(DownloadKind::Video));

    assert_eq!(events.result_for(again).await.outcome, Outcome::Failed);
    assert_eq!(manager.tasks().await.len(), 3);
}

/// Test pausing and resuming every task
#[tokio::test]
async fn test_pause_all_and_resume_all() {
    let dir = TempDir::new().unwrap();
    let fetcher = SimulatedFetcher::new().with_default(Behavior::slow(Duration::from_millis(600), 12));
    let manager = manager(2, fetcher, &dir);

    for i in 0..3 {
        manager.submit(&url(i), DownloadKind::AudioOnly).await.unwrap();
    }

    assert_eq!(manager.pause_all().await, 2);
    let status = manager.aggregate_status().await;
    assert_eq!(status.paused, 2);
    assert_eq!(status.queued, 1);

    assert_eq!(manager.resume_all().await, 2);
    timeout(WAIT, manager.wait_until_idle()).await.unwrap();
    assert_eq!(manager.aggregate_status().await.succeeded, 3);
}
