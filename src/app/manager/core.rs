//! Download manager
//!
//! The manager owns a bounded set of slots, a FIFO pending queue and the task
//! history. Commands take the single state lock only for short synchronous
//! sections; workers run on their own tokio tasks and report back through
//! the manager when they finish, which frees the slot and promotes the
//! head of the queue.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use super::config::{ManagerConfig, SettingsProvider};
use super::events::{EventBus, EventSubscription};
use super::state::ManagerState;
use super::stats::AggregateStatus;
use crate::app::fetcher::Fetcher;
use crate::app::progress::{ResultEvent, Stage, TaskEvent};
use crate::app::strategy::{DownloadKind, StrategyCascade};
use crate::app::task::{CancelEffect, DownloadTask, TaskId, TaskSnapshot, TaskState};
use crate::constants::manager;
use crate::errors::{ConfigError, ConfigResult, ManagerError, ManagerResult, TaskError};

struct Inner {
    config: ManagerConfig,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<ManagerState>,
    events: EventBus,
    /// Number of queued plus active tasks, for `wait_until_idle`
    load: watch::Sender<usize>,
}

/// Bounded-concurrency download orchestrator
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("max_concurrent", &self.inner.config.max_concurrent)
            .field("output_dir", &self.inner.config.output_dir)
            .field("fetcher", &self.inner.fetcher.name())
            .finish()
    }
}

impl DownloadManager {
    /// Create a manager from a settings snapshot
    pub fn new(settings: &dyn SettingsProvider, fetcher: Arc<dyn Fetcher>) -> ConfigResult<Self> {
        Self::with_config(settings.settings(), fetcher)
    }

    /// Create a manager from an explicit configuration
    pub fn with_config(config: ManagerConfig, fetcher: Arc<dyn Fetcher>) -> ConfigResult<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.output_dir).map_err(|e| ConfigError::Io {
            path: config.output_dir.clone(),
            source: e,
        })?;

        info!(
            "Download manager ready: {} slots, output to {}, fetcher '{}'",
            config.max_concurrent,
            config.output_dir.display(),
            fetcher.name()
        );

        let (load, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ManagerState::new(config.max_concurrent)),
                config,
                fetcher,
                events: EventBus::new(),
                load,
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.inner.config.output_dir
    }

    /// Subscribe to progress and result events from now on
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.events.subscribe()
    }

    /// Submit a URL using the configured cascade for its kind
    pub async fn submit(&self, url: &str, kind: DownloadKind) -> ManagerResult<TaskId> {
        let url = validate_url(url)?;
        let cascade = self.inner.config.strategies.cascade_for(kind)?;
        self.admit(url, Some(kind), cascade).await
    }

    /// Submit a URL with an explicit cascade
    pub async fn submit_with_strategies(
        &self,
        url: &str,
        cascade: StrategyCascade,
    ) -> ManagerResult<TaskId> {
        let url = validate_url(url)?;
        if cascade.is_empty() {
            return Err(ManagerError::EmptyCascade {
                kind: "custom cascade".to_string(),
            });
        }
        self.admit(url, None, cascade).await
    }

    /// Resubmit a failed or cancelled task as a new task
    pub async fn retry(&self, id: TaskId) -> ManagerResult<TaskId> {
        let previous = self.task(id).await?;
        let state = previous.state();
        if !matches!(state, TaskState::Failed | TaskState::Cancelled) {
            warn!("Cannot retry task {} while it is {}", id, state);
            return Err(ManagerError::InvalidTransition {
                task_id: id,
                state,
                operation: "retry",
            });
        }

        let new_id = self
            .admit(
                previous.url().to_string(),
                previous.kind(),
                previous.cascade().clone(),
            )
            .await?;
        info!("Task {} resubmitted as {}", id, new_id);
        Ok(new_id)
    }

    async fn admit(
        &self,
        url: String,
        kind: Option<DownloadKind>,
        cascade: StrategyCascade,
    ) -> ManagerResult<TaskId> {
        let (id, promoted) = {
            let mut state = self.inner.state.lock().await;
            if state.is_shutting_down() {
                return Err(ManagerError::ShuttingDown);
            }

            let id = state.next_task_id();
            let task = Arc::new(DownloadTask::new(
                id,
                url,
                kind,
                cascade,
                self.inner.config.task.clone(),
                self.inner.config.output_dir.clone(),
                self.inner.events.clone(),
            ));
            state.enqueue(task.clone());
            task.emit(
                Stage::Queued,
                0.0,
                format!("Queued at position {}", state.pending_count()),
            );

            let promoted = promote_locked(&mut state);
            self.inner.load.send_replace(state.outstanding());
            (id, promoted)
        };

        debug!("Accepted task {}", id);
        self.spawn_workers(promoted);
        Ok(id)
    }

    fn spawn_workers(&self, tasks: Vec<Arc<DownloadTask>>) {
        for task in tasks {
            let manager = self.clone();
            tokio::spawn(async move {
                let result = task.run(manager.inner.fetcher.as_ref()).await;
                manager.on_task_finished(task.id(), result).await;
            });
        }
    }

    /// Free the finished task's slot, promote the queue head, then publish
    async fn on_task_finished(&self, id: TaskId, result: ResultEvent) {
        let promoted = {
            let mut state = self.inner.state.lock().await;
            if state.complete(id).is_none() {
                warn!("Task {} finished but was not in the active set", id);
            }
            promote_locked(&mut state)
        };

        self.spawn_workers(promoted);
        self.inner.events.publish(TaskEvent::Result(result));
        self.refresh_load().await;
    }

    async fn refresh_load(&self) {
        let state = self.inner.state.lock().await;
        self.inner.load.send_replace(state.outstanding());
    }

    async fn task(&self, id: TaskId) -> ManagerResult<Arc<DownloadTask>> {
        self.inner
            .state
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(ManagerError::TaskNotFound { task_id: id })
    }

    /// Cancel a task wherever it is
    ///
    /// Cancelling a finished task is a no-op.
    pub async fn cancel(&self, id: TaskId) -> ManagerResult<()> {
        let finished = {
            let mut state = self.inner.state.lock().await;
            let task = state
                .get(id)
                .cloned()
                .ok_or(ManagerError::TaskNotFound { task_id: id })?;

            match task.cancel() {
                CancelEffect::AlreadyTerminal => {
                    debug!("Task {} already finished; cancel ignored", id);
                    None
                }
                CancelEffect::Signalled => None,
                CancelEffect::Finished(result) => {
                    state.remove_queued(id);
                    self.inner.load.send_replace(state.outstanding());
                    Some(result)
                }
            }
        };

        if let Some(result) = finished {
            self.inner.events.publish(TaskEvent::Result(result));
        }
        Ok(())
    }

    /// Pause a running task
    pub async fn pause(&self, id: TaskId) -> ManagerResult<()> {
        let task = self.task(id).await?;
        task.pause()
            .map_err(|e| transition_error(&task, "pause", e))
    }

    /// Resume a paused task
    pub async fn resume(&self, id: TaskId) -> ManagerResult<()> {
        let task = self.task(id).await?;
        task.resume()
            .map_err(|e| transition_error(&task, "resume", e))
    }

    /// Pause every running task, returning how many were paused
    pub async fn pause_all(&self) -> usize {
        let active = self.lock_state().await.active_tasks();
        let paused = active.iter().filter(|task| task.pause().is_ok()).count();
        info!("Paused {} task(s)", paused);
        paused
    }

    /// Resume every paused task, returning how many were resumed
    pub async fn resume_all(&self) -> usize {
        let active = self.lock_state().await.active_tasks();
        let resumed = active.iter().filter(|task| task.resume().is_ok()).count();
        info!("Resumed {} task(s)", resumed);
        resumed
    }

    /// Cancel every queued and active task
    pub async fn cancel_all(&self) {
        let finished: Vec<ResultEvent> = {
            let mut state = self.inner.state.lock().await;
            let mut finished = Vec::new();

            for task in state.queued_tasks() {
                if let CancelEffect::Finished(result) = task.cancel() {
                    state.remove_queued(task.id());
                    finished.push(result);
                }
            }
            for task in state.active_tasks() {
                task.cancel();
            }

            self.inner.load.send_replace(state.outstanding());
            finished
        };

        info!("Cancelled {} queued task(s)", finished.len());
        for result in finished {
            self.inner.events.publish(TaskEvent::Result(result));
        }
    }

    /// Change the concurrency cap
    ///
    /// Raising it promotes queued tasks at once; lowering it never preempts
    /// running tasks.
    pub async fn set_max_concurrent(&self, max: usize) -> ManagerResult<()> {
        if max == 0 || max > manager::MAX_CONCURRENT_LIMIT {
            return Err(ManagerError::InvalidConcurrency {
                value: max,
                max: manager::MAX_CONCURRENT_LIMIT,
            });
        }

        let promoted = {
            let mut state = self.inner.state.lock().await;
            let previous = state.max_concurrent();
            state.set_max_concurrent(max);
            info!("Concurrency limit changed from {} to {}", previous, max);
            promote_locked(&mut state)
        };

        self.spawn_workers(promoted);
        Ok(())
    }

    pub async fn max_concurrent(&self) -> usize {
        self.lock_state().await.max_concurrent()
    }

    /// Counts by state and the weighted overall percent
    pub async fn aggregate_status(&self) -> AggregateStatus {
        let snapshots = self.tasks().await;
        AggregateStatus::from_snapshots(&snapshots)
    }

    /// Snapshot of one task
    pub async fn snapshot(&self, id: TaskId) -> ManagerResult<TaskSnapshot> {
        Ok(self.task(id).await?.snapshot())
    }

    /// Snapshots of every known task in submission order
    pub async fn tasks(&self) -> Vec<TaskSnapshot> {
        self.lock_state()
            .await
            .all_tasks()
            .iter()
            .map(|task| task.snapshot())
            .collect()
    }

    /// Wait until no task is queued or active
    pub async fn wait_until_idle(&self) {
        let mut load = self.inner.load.subscribe();
        // The sender lives in `inner`, which `self` keeps alive
        let _ = load.wait_for(|outstanding| *outstanding == 0).await;
    }

    /// Stop accepting work, cancel everything and wait for workers to finish
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if state.is_shutting_down() {
                debug!("Shutdown already in progress");
            }
            state.begin_shutdown();
        }

        info!("Shutting down download manager");
        self.cancel_all().await;
        self.wait_until_idle().await;
        info!("Download manager stopped");
    }

    async fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().await
    }
}

/// Start tasks while slots are free; returns the tasks that need a worker
fn promote_locked(state: &mut ManagerState) -> Vec<Arc<DownloadTask>> {
    let mut promoted = Vec::new();
    while let Some(task) = state.pop_ready() {
        match task.start() {
            Ok(()) => promoted.push(task),
            Err(e) => {
                warn!("Skipping promotion of task {}: {}", task.id(), e);
                state.complete(task.id());
            }
        }
    }
    promoted
}

fn transition_error(task: &DownloadTask, operation: &'static str, error: TaskError) -> ManagerError {
    warn!("Rejected {} for task {}: {}", operation, task.id(), error);
    match error {
        TaskError::InvalidTransition {
            task_id,
            state,
            operation,
        } => ManagerError::InvalidTransition {
            task_id,
            state,
            operation,
        },
        _ => ManagerError::InvalidTransition {
            task_id: task.id(),
            state: task.state(),
            operation,
        },
    }
}

/// Parse a submitted URL and check scheme and host
pub fn validate_url(raw: &str) -> ManagerResult<String> {
    let invalid = |reason: String| ManagerError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !manager::SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(trimmed.to_string())
}
