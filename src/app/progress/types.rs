//! Event value types published by download tasks
//!
//! Every value here is immutable once built. Tasks construct them, the event
//! bus clones them to each subscriber and presentation layers only read them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::task::TaskId;
use crate::constants::progress::UNKNOWN_PLACEHOLDER;

/// Pipeline stage a progress update belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for a free slot
    Queued,
    /// Retrieving metadata before the cascade starts
    Probing,
    /// Bytes are flowing for the current strategy
    Downloading,
    /// The current strategy failed or stalled and the next one is starting
    Retrying,
    /// The stall monitor flagged the current attempt
    Stalled,
    /// The task was paused by the user
    Paused,
    /// The task was resumed by the user
    Resumed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Queued => "queued",
            Stage::Probing => "probing",
            Stage::Downloading => "downloading",
            Stage::Retrying => "retrying",
            Stage::Stalled => "stalled",
            Stage::Paused => "paused",
            Stage::Resumed => "resumed",
        };
        f.write_str(label)
    }
}

/// One progress update for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub stage: Stage,
    /// Completion of the current attempt in `0.0..=100.0`
    pub percent: f64,
    /// Human readable throughput, e.g. `1.2 MiB/s`
    pub rate_text: String,
    /// Human readable remaining time, e.g. `00:42`
    pub eta_text: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Create a progress event for a stage with no throughput information
    pub fn stage(task_id: TaskId, stage: Stage, percent: f64, message: impl Into<String>) -> Self {
        Self {
            task_id,
            stage,
            percent: clamp_percent(percent),
            rate_text: UNKNOWN_PLACEHOLDER.to_string(),
            eta_text: UNKNOWN_PLACEHOLDER.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a downloading event with formatted throughput and ETA
    pub fn downloading(
        task_id: TaskId,
        percent: f64,
        rate_text: String,
        eta_text: String,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            stage: Stage::Downloading,
            percent: clamp_percent(percent),
            rate_text,
            eta_text,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => f.write_str("succeeded"),
            Outcome::Failed => f.write_str("failed"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Exactly one of these is published per task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    pub task_id: TaskId,
    pub outcome: Outcome,
    /// Final file, only for [`Outcome::Succeeded`]
    pub path: Option<PathBuf>,
    /// Failure cause, only for [`Outcome::Failed`]
    pub error: Option<String>,
    /// Strategy that produced the outcome, if the cascade started
    pub strategy: Option<String>,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl ResultEvent {
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Succeeded
    }
}

/// Envelope delivered to event subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Progress(ProgressEvent),
    Result(ResultEvent),
}

impl TaskEvent {
    /// Identifier of the task this event belongs to
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Progress(event) => event.task_id,
            TaskEvent::Result(event) => event.task_id,
        }
    }

    /// Check if this is the terminal event of its task
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Result(_))
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}
