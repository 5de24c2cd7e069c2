//! Download task state machine
//!
//! A [`DownloadTask`] drives one URL from submission to exactly one terminal
//! outcome. The manager owns the task behind an `Arc`, issues lifecycle
//! commands (`start`, `pause`, `resume`, `cancel`) and spawns [`DownloadTask::run`]
//! once the task holds a slot.
//!
//! # Cascade
//!
//! After a successful probe the worker walks the task's [`StrategyCascade`] in
//! order. A failed or stalled attempt advances to the next strategy while the
//! retry budget allows it; otherwise the task fails with
//! [`TaskError::Exhausted`]. The same strategy is never retried.
//!
//! # Locking
//!
//! Status lives behind a std `RwLock` that is only held for short synchronous
//! sections and never across an await point.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::TaskConfig;
use super::control::TaskControl;
use super::throughput::{estimate_eta, SampleTracker, TaskVitals};
use super::types::{TaskId, TaskSnapshot, TaskState, TaskStatus};
use crate::app::fetcher::{FetchContext, FetchSample, Fetcher};
use crate::app::manager::events::EventBus;
use crate::app::progress::{
    format_bytes, format_eta, format_rate, percent_of, Outcome, ProgressEvent, ResultEvent, Stage,
    TaskEvent,
};
use crate::app::stall::{StallMonitor, StallNotice};
use crate::app::strategy::{DownloadKind, FetchStrategy, StrategyCascade};
use crate::errors::{FetchError, TaskError, TaskResult};

/// Effect of a cancel request
#[derive(Debug, Clone, PartialEq)]
pub enum CancelEffect {
    /// The task had already finished; nothing changed
    AlreadyTerminal,
    /// A queued task was cancelled on the spot
    Finished(ResultEvent),
    /// A running or paused task was signalled; its worker will finish it
    Signalled,
}

/// One URL's download lifecycle
#[derive(Debug)]
pub struct DownloadTask {
    id: TaskId,
    url: String,
    kind: Option<DownloadKind>,
    cascade: StrategyCascade,
    config: TaskConfig,
    output_dir: PathBuf,
    control: TaskControl,
    status: RwLock<TaskStatus>,
    vitals: watch::Sender<TaskVitals>,
    events: EventBus,
}

impl DownloadTask {
    /// Create a queued task
    pub fn new(
        id: TaskId,
        url: impl Into<String>,
        kind: Option<DownloadKind>,
        cascade: StrategyCascade,
        config: TaskConfig,
        output_dir: PathBuf,
        events: EventBus,
    ) -> Self {
        let (vitals, _) = watch::channel(TaskVitals::new(0, config.throughput_samples));
        Self {
            id,
            url: url.into(),
            kind,
            cascade,
            config,
            output_dir,
            control: TaskControl::new(),
            status: RwLock::new(TaskStatus::new()),
            vitals,
            events,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> Option<DownloadKind> {
        self.kind
    }

    pub fn cascade(&self) -> &StrategyCascade {
        &self.cascade
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn state(&self) -> TaskState {
        self.read_status().state
    }

    /// Completion percent of the current attempt
    pub fn percent(&self) -> f64 {
        self.read_status().percent
    }

    /// Observe the vitals published for the stall monitor
    pub fn vitals(&self) -> watch::Receiver<TaskVitals> {
        self.vitals.subscribe()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let status = self.read_status();
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            kind: self.kind,
            state: status.state,
            strategy_index: status.strategy_index,
            strategy_name: self.strategy_name(status.strategy_index),
            strategy_count: self.cascade.len(),
            retry_count: status.retry_count,
            max_retries: self.config.max_retries,
            percent: status.percent,
            title: status.title.clone(),
            last_error: status.last_error.clone(),
            result_path: status.result_path.clone(),
            submitted_at: status.submitted_at,
            started_at: status.started_at,
            finished_at: status.finished_at,
        }
    }

    fn read_status(&self) -> RwLockReadGuard<'_, TaskStatus> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_status(&self) -> RwLockWriteGuard<'_, TaskStatus> {
        self.status.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn strategy_name(&self, index: usize) -> String {
        self.cascade
            .get(index)
            .map(|s| s.name.clone())
            .unwrap_or_default()
    }

    fn invalid(&self, state: TaskState, operation: &'static str) -> TaskError {
        TaskError::InvalidTransition {
            task_id: self.id,
            state,
            operation,
        }
    }

    /// Publish a progress event for a stage
    pub(crate) fn emit(&self, stage: Stage, percent: f64, message: impl Into<String>) {
        self.events.publish(TaskEvent::Progress(ProgressEvent::stage(
            self.id, stage, percent, message,
        )));
    }

    /// Move from `Queued` to `Running`
    pub fn start(&self) -> TaskResult<()> {
        let mut status = self.write_status();
        if status.state != TaskState::Queued {
            return Err(self.invalid(status.state, "start"));
        }
        status.state = TaskState::Running;
        status.started_at = Some(Utc::now());
        info!("Task {} started: {}", self.id, self.url);
        Ok(())
    }

    /// Request cooperative suspension; valid only while running
    ///
    /// The `Paused` event is published under the status lock so it always
    /// precedes the terminal state the worker records.
    pub fn pause(&self) -> TaskResult<()> {
        let mut status = self.write_status();
        if status.state != TaskState::Running {
            return Err(self.invalid(status.state, "pause"));
        }
        status.state = TaskState::Paused;
        self.control.pause.close();
        self.emit(Stage::Paused, status.percent, "Paused");
        drop(status);

        info!("Task {} paused", self.id);
        Ok(())
    }

    /// Resume a paused task
    pub fn resume(&self) -> TaskResult<()> {
        let mut status = self.write_status();
        if status.state != TaskState::Paused {
            return Err(self.invalid(status.state, "resume"));
        }
        status.state = TaskState::Running;
        self.control.pause.open();
        self.emit(Stage::Resumed, status.percent, "Resumed");
        drop(status);

        info!("Task {} resumed", self.id);
        Ok(())
    }

    /// Cancel the task wherever it is; idempotent
    pub fn cancel(&self) -> CancelEffect {
        let mut status = self.write_status();
        match status.state {
            state if state.is_terminal() => CancelEffect::AlreadyTerminal,
            TaskState::Queued => {
                self.control.cancel.cancel();
                status.state = TaskState::Cancelled;
                status.finished_at = Some(Utc::now());
                info!("Task {} cancelled while queued", self.id);
                CancelEffect::Finished(self.result_event(&status))
            }
            _ => {
                if !self.control.cancel.is_cancelled() {
                    info!("Task {} cancellation requested", self.id);
                }
                self.control.cancel.cancel();
                CancelEffect::Signalled
            }
        }
    }

    /// Run the task to its terminal outcome
    ///
    /// The returned event is not published; the caller decides when subscribers
    /// see it.
    pub async fn run(&self, fetcher: &dyn Fetcher) -> ResultEvent {
        let outcome = self.drive(fetcher).await;
        self.finish(outcome)
    }

    async fn drive(&self, fetcher: &dyn Fetcher) -> TaskResult<PathBuf> {
        self.control
            .checkpoint()
            .await
            .map_err(|_| TaskError::Cancelled)?;

        self.emit(Stage::Probing, 0.0, format!("Probing {}", self.url));
        let probe = tokio::select! {
            biased;
            _ = self.control.cancel.cancelled() => return Err(TaskError::Cancelled),
            probe = fetcher.probe(&self.url) => probe,
        };
        let metadata = probe.map_err(|e| {
            warn!("Task {} probe failed for {}: {}", self.id, self.url, e);
            TaskError::Probe {
                reason: e.to_string(),
            }
        })?;
        debug!("Task {} probed: {}", self.id, metadata.display_name());

        {
            let mut status = self.write_status();
            status.title = metadata.title.clone();
            status.cascade_started = true;
        }

        let (notice_tx, mut notices) = mpsc::unbounded_channel();
        let monitor_stop = self.control.cancel.child_token();
        let _monitor_guard = monitor_stop.clone().drop_guard();
        StallMonitor::new(self.config.stall.clone()).spawn(
            self.id,
            self.vitals.subscribe(),
            self.control.pause.watch(),
            notice_tx,
            monitor_stop,
        );

        let mut attempt = 0u64;
        loop {
            attempt += 1;
            let index = self.read_status().strategy_index;
            let strategy = self
                .cascade
                .get(index)
                .cloned()
                .ok_or_else(|| TaskError::Exhausted {
                    attempts: attempt.saturating_sub(1) as u32,
                    last_error: "no strategy at the current cascade position".to_string(),
                })?;

            match self.attempt(fetcher, &strategy, attempt, &mut notices).await {
                Ok(path) => return Ok(path),
                Err(TaskError::Cancelled) => return Err(TaskError::Cancelled),
                Err(error) => self.advance(error)?,
            }
        }
    }

    async fn attempt(
        &self,
        fetcher: &dyn Fetcher,
        strategy: &FetchStrategy,
        attempt: u64,
        notices: &mut mpsc::UnboundedReceiver<StallNotice>,
    ) -> TaskResult<PathBuf> {
        self.control
            .checkpoint()
            .await
            .map_err(|_| TaskError::Cancelled)?;

        // Notices for earlier attempts are stale
        while notices.try_recv().is_ok() {}

        self.vitals
            .send_replace(TaskVitals::new(attempt, self.config.throughput_samples));
        self.write_status().percent = 0.0;

        info!(
            "Task {} attempt {} with strategy '{}'",
            self.id, attempt, strategy.name
        );
        self.emit(
            Stage::Downloading,
            0.0,
            format!("Starting strategy '{}'", strategy.name),
        );

        let (progress_tx, mut progress) = mpsc::unbounded_channel();
        let token = self.control.attempt_token();
        let _attempt_guard = token.clone().drop_guard();
        let ctx = FetchContext {
            cancel: token,
            pause: self.control.pause.clone(),
            progress: progress_tx,
            output_dir: self.output_dir.clone(),
        };

        let mut fetch = fetcher.fetch(&self.url, strategy, ctx);
        let mut tracker = SampleTracker::new();

        let result = loop {
            tokio::select! {
                biased;
                _ = self.control.cancel.cancelled() => return Err(TaskError::Cancelled),
                Some(notice) = notices.recv() => {
                    if notice.attempt == attempt {
                        let stalled_secs = notice.stalled_for.as_secs();
                        self.emit(
                            Stage::Stalled,
                            self.percent(),
                            format!("No progress for {}s with '{}'", stalled_secs, strategy.name),
                        );
                        return Err(TaskError::Stall {
                            strategy: strategy.name.clone(),
                            stalled_secs,
                        });
                    }
                }
                Some(sample) = progress.recv() => self.on_sample(&sample, &mut tracker),
                result = &mut fetch => break result,
            }
        };

        while let Ok(sample) = progress.try_recv() {
            self.on_sample(&sample, &mut tracker);
        }

        // Cancellation wins over whatever the attempt produced
        if self.control.cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        match result {
            Ok(path) if path.exists() => Ok(path),
            Ok(path) => Err(strategy_error(strategy, FetchError::OutputNotFound { path })),
            Err(error) => Err(strategy_error(strategy, error)),
        }
    }

    /// Fold one fetch sample into vitals, status and a progress event
    fn on_sample(&self, sample: &FetchSample, tracker: &mut SampleTracker) {
        let now = Instant::now();
        let (forward, rate) = tracker.observe(sample, now);

        let mut average = 0.0;
        self.vitals.send_modify(|vitals| {
            if forward {
                vitals.last_progress_at = now;
            }
            vitals.throughput.push(rate);
            average = vitals.throughput.average();
        });

        let percent = {
            let mut status = self.write_status();
            if let Some(percent) = percent_of(sample.downloaded_bytes, sample.total_bytes) {
                status.percent = percent;
            }
            status.percent
        };

        let message = match sample.total_bytes {
            Some(total) => format!(
                "{} of {}",
                format_bytes(sample.downloaded_bytes),
                format_bytes(total)
            ),
            None => format_bytes(sample.downloaded_bytes),
        };
        let eta = estimate_eta(sample.downloaded_bytes, sample.total_bytes, average);

        self.events
            .publish(TaskEvent::Progress(ProgressEvent::downloading(
                self.id,
                percent,
                format_rate(Some(average)),
                format_eta(eta),
                message,
            )));
    }

    /// Move to the next strategy or give up
    fn advance(&self, error: TaskError) -> TaskResult<()> {
        let reason = error.to_string();
        let next = {
            let mut status = self.write_status();
            status.last_error = Some(reason.clone());
            if self.cascade.has_next(status.strategy_index)
                && status.retry_count < self.config.max_retries
            {
                status.retry_count += 1;
                status.strategy_index += 1;
                status.percent = 0.0;
                Ok((status.retry_count, self.strategy_name(status.strategy_index)))
            } else {
                Err(TaskError::Exhausted {
                    attempts: status.retry_count + 1,
                    last_error: reason.clone(),
                })
            }
        };

        match next {
            Ok((retry, name)) => {
                warn!(
                    "Task {}: {}. Retrying with '{}' ({}/{})",
                    self.id, reason, name, retry, self.config.max_retries
                );
                self.emit(
                    Stage::Retrying,
                    0.0,
                    format!("{}. Retrying with '{}'", reason, name),
                );
                Ok(())
            }
            Err(exhausted) => {
                warn!("Task {} gave up: {}", self.id, exhausted);
                Err(exhausted)
            }
        }
    }

    /// Record the terminal state and build the result event
    fn finish(&self, outcome: TaskResult<PathBuf>) -> ResultEvent {
        let outcome = match outcome {
            Ok(_) if self.control.cancel.is_cancelled() => Err(TaskError::Cancelled),
            other => other,
        };

        let mut status = self.write_status();
        if status.state.is_terminal() {
            return self.result_event(&status);
        }

        match outcome {
            Ok(path) => {
                status.state = TaskState::Succeeded;
                status.percent = 100.0;
                status.result_path = Some(path);
            }
            Err(TaskError::Cancelled) => status.state = TaskState::Cancelled,
            Err(error) => {
                status.state = TaskState::Failed;
                status.last_error = Some(error.to_string());
            }
        }
        status.finished_at = Some(Utc::now());

        let event = self.result_event(&status);
        drop(status);

        match event.outcome {
            Outcome::Succeeded => info!(
                "Task {} succeeded: {}",
                self.id,
                event
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            Outcome::Failed => warn!(
                "Task {} failed: {}",
                self.id,
                event.error.as_deref().unwrap_or("unknown error")
            ),
            Outcome::Cancelled => info!("Task {} cancelled", self.id),
        }
        event
    }

    fn result_event(&self, status: &TaskStatus) -> ResultEvent {
        let outcome = match status.state {
            TaskState::Succeeded => Outcome::Succeeded,
            TaskState::Cancelled => Outcome::Cancelled,
            _ => Outcome::Failed,
        };
        ResultEvent {
            task_id: self.id,
            outcome,
            path: status.result_path.clone(),
            error: if outcome == Outcome::Failed {
                status.last_error.clone()
            } else {
                None
            },
            strategy: status
                .cascade_started
                .then(|| self.strategy_name(status.strategy_index)),
            retry_count: status.retry_count,
            timestamp: Utc::now(),
        }
    }
}

fn strategy_error(strategy: &FetchStrategy, error: FetchError) -> TaskError {
    TaskError::Strategy {
        strategy: strategy.name.clone(),
        reason: error.to_string(),
    }
}
