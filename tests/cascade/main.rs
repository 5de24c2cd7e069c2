//! Integration tests for the strategy cascade
//!
//! Each test scripts per-strategy behavior on the simulated fetcher and checks
//! which strategies ran, where the cascade stopped and what the task reported.

use std::sync::Arc;
use std::time::Duration;

use mediagrab::app::fetcher::{Behavior, SimulatedFetcher};
use mediagrab::app::manager::{DownloadManager, EventSubscription, ManagerConfigBuilder};
use mediagrab::app::progress::{Outcome, ResultEvent, Stage, TaskEvent};
use mediagrab::app::strategy::{DownloadKind, FetchStrategy, FormatSelector, StrategyCascade};
use mediagrab::app::task::{TaskId, TaskState};
use tempfile::TempDir;
use tokio::time::timeout;

const URL: &str = "https://media.test/watch/cascade";

struct Harness {
    manager: DownloadManager,
    fetcher: Arc<SimulatedFetcher>,
    events: EventSubscription,
    _dir: TempDir,
}

fn harness(fetcher: SimulatedFetcher, builder: ManagerConfigBuilder) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = builder.output_dir(dir.path()).build().unwrap();
    let fetcher = Arc::new(fetcher);
    let manager = DownloadManager::with_config(config, fetcher.clone()).unwrap();
    let events = manager.subscribe();
    Harness {
        manager,
        fetcher,
        events,
        _dir: dir,
    }
}

fn cascade(names: &[&str]) -> StrategyCascade {
    let strategies = names
        .iter()
        .enumerate()
        .map(|(i, name)| FetchStrategy::new(*name, FormatSelector::new("b"), i as u32))
        .collect();
    StrategyCascade::new(strategies).unwrap()
}

/// Collect every event up to and including the task's result
async fn run_to_result(events: &mut EventSubscription, id: TaskId) -> (Vec<TaskEvent>, ResultEvent) {
    timeout(Duration::from_secs(60), async {
        let mut seen = Vec::new();
        loop {
            match events.recv().await {
                Some(TaskEvent::Result(result)) if result.task_id == id => return (seen, result),
                Some(event) => seen.push(event),
                None => panic!("event stream closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for result")
}

fn stages(events: &[TaskEvent]) -> Vec<Stage> {
    events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Progress(p) => Some(p.stage),
            TaskEvent::Result(_) => None,
        })
        .collect()
}

/// Test that the first strategy wins when it succeeds
#[tokio::test]
async fn test_first_strategy_succeeds() {
    let mut h = harness(SimulatedFetcher::new(), ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b", "c"]))
        .await
        .unwrap();

    let (events, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(result.strategy.as_deref(), Some("a"));
    assert_eq!(result.retry_count, 0);
    assert_eq!(h.fetcher.attempts_for(URL), vec!["a"]);
    assert!(!stages(&events).contains(&Stage::Retrying));
}

/// Test falling back to the second of two strategies
///
/// Verifies that the task finishes at cascade position 1 with one retry.
#[tokio::test]
async fn test_two_strategy_fallback() {
    let fetcher = SimulatedFetcher::new().with_strategy("a", Behavior::fail("HTTP 403"));
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b"]))
        .await
        .unwrap();

    let (events, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(result.strategy.as_deref(), Some("b"));
    assert_eq!(result.retry_count, 1);

    let snapshot = h.manager.snapshot(id).await.unwrap();
    assert_eq!(snapshot.strategy_index, 1);
    assert_eq!(snapshot.state, TaskState::Succeeded);
    assert_eq!(snapshot.percent, 100.0);

    let retrying: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Progress(p) if p.stage == Stage::Retrying => Some(p.message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(retrying.len(), 1);
    assert!(retrying[0].contains("HTTP 403"));
    assert!(retrying[0].contains("'b'"));
}

/// Test that the cascade stops at the k-th strategy
///
/// Every strategy is tried at most once and in order.
#[tokio::test]
async fn test_kth_strategy_succeeds() {
    let fetcher = SimulatedFetcher::new()
        .with_strategy("a", Behavior::fail("unsupported format"))
        .with_strategy("b", Behavior::Timeout)
        .with_strategy("d", Behavior::fail("never reached"));
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b", "c", "d"]))
        .await
        .unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(result.strategy.as_deref(), Some("c"));
    assert_eq!(result.retry_count, 2);
    assert_eq!(h.fetcher.attempts_for(URL), vec!["a", "b", "c"]);
}

/// Test exhausting the cascade
///
/// The failure carries the last strategy's error.
#[tokio::test]
async fn test_cascade_exhaustion() {
    let fetcher = SimulatedFetcher::new()
        .with_strategy("a", Behavior::fail("HTTP 403"))
        .with_strategy("b", Behavior::Fragment);
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b"]))
        .await
        .unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(result.strategy.as_deref(), Some("b"));
    assert_eq!(result.retry_count, 1);
    assert!(result.path.is_none());
    assert!(result.error.unwrap().contains("'b'"));
    assert_eq!(h.manager.aggregate_status().await.failed, 1);
}

/// Test the retry budget
///
/// With no retries allowed the task fails after its first strategy even
/// though more strategies remain.
#[tokio::test]
async fn test_zero_retry_budget() {
    let fetcher = SimulatedFetcher::new().with_strategy("a", Behavior::fail("HTTP 500"));
    let mut h = harness(fetcher, ManagerConfigBuilder::new().max_retries(0));
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b", "c"]))
        .await
        .unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Failed);
    assert_eq!(result.retry_count, 0);
    assert_eq!(h.fetcher.attempts_for(URL), vec!["a"]);
}

/// Test that a file reported but never written counts as a failure
#[tokio::test]
async fn test_missing_output_advances_cascade() {
    let fetcher = SimulatedFetcher::new().with_strategy("a", Behavior::SucceedWithoutOutput);
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b"]))
        .await
        .unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(result.strategy.as_deref(), Some("b"));
    assert!(result.path.unwrap().exists());
}

/// Test stall detection driving the cascade
///
/// A strategy that stops making progress is flagged by the stall monitor and
/// the task moves on to the next strategy.
#[tokio::test(start_paused = true)]
async fn test_stall_advances_cascade() {
    let fetcher = SimulatedFetcher::new().with_strategy("a", Behavior::Stall { bytes: 2048 });
    let builder = ManagerConfigBuilder::new()
        .stall_timeout(Duration::from_secs(5))
        .stall_check_interval(Duration::from_secs(1));
    let mut h = harness(fetcher, builder);
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b"]))
        .await
        .unwrap();

    let (events, result) = run_to_result(&mut h.events, id).await;
    let stages = stages(&events);
    let stalled = stages.iter().position(|s| *s == Stage::Stalled).unwrap();
    let retrying = stages.iter().position(|s| *s == Stage::Retrying).unwrap();
    assert!(stalled < retrying);

    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(result.strategy.as_deref(), Some("b"));
    assert_eq!(result.retry_count, 1);
}

/// Test pausing and cancelling mid cascade
///
/// A task paused during its second strategy reports Cancelled and keeps the
/// cascade position it reached.
#[tokio::test]
async fn test_pause_then_cancel_mid_cascade() {
    let fetcher = SimulatedFetcher::new()
        .with_strategy("a", Behavior::fail("HTTP 403"))
        .with_strategy("b", Behavior::slow(Duration::from_secs(5), 50));
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h
        .manager
        .submit_with_strategies(URL, cascade(&["a", "b", "c"]))
        .await
        .unwrap();

    timeout(Duration::from_secs(10), async {
        loop {
            if let Some(TaskEvent::Progress(p)) = h.events.recv().await {
                if p.stage == Stage::Downloading && p.percent > 0.0 {
                    break;
                }
            }
        }
    })
    .await
    .unwrap();

    h.manager.pause(id).await.unwrap();
    assert_eq!(h.manager.snapshot(id).await.unwrap().state, TaskState::Paused);
    h.manager.cancel(id).await.unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Cancelled);
    assert_eq!(result.strategy.as_deref(), Some("b"));
    assert_eq!(h.fetcher.attempts_for(URL), vec!["a", "b"]);

    let snapshot = h.manager.snapshot(id).await.unwrap();
    assert_eq!(snapshot.strategy_index, 1);
    assert!(h.manager.resume(id).await.is_err());
}

/// Test that audio submissions use the audio cascade
#[tokio::test]
async fn test_audio_kind_selects_audio_cascade() {
    let fetcher = SimulatedFetcher::new().with_strategy("best-audio", Behavior::fail("no audio"));
    let mut h = harness(fetcher, ManagerConfigBuilder::new());
    let id = h.manager.submit(URL, DownloadKind::AudioOnly).await.unwrap();

    let (_, result) = run_to_result(&mut h.events, id).await;
    assert_eq!(result.outcome, Outcome::Succeeded);
    assert_eq!(h.fetcher.attempts_for(URL), vec!["best-audio", "any-audio"]);
    assert_eq!(
        h.manager.snapshot(id).await.unwrap().kind,
        Some(DownloadKind::AudioOnly)
    );
}
