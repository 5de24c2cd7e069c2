//! Task identity, lifecycle states and snapshots

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::strategy::DownloadKind;

/// Opaque task identifier, allocated once per submission and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the pending queue for a slot
    Queued,
    /// Holding a slot and running its cascade
    Running,
    /// Holding a slot, suspended at a checkpoint
    Paused,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// States that occupy a manager slot
    pub fn holds_slot(&self) -> bool {
        matches!(self, TaskState::Running | TaskState::Paused)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Mutable part of a task, guarded by the task's status lock
#[derive(Debug, Clone)]
pub(crate) struct TaskStatus {
    pub state: TaskState,
    pub strategy_index: usize,
    pub retry_count: u32,
    pub percent: f64,
    pub cascade_started: bool,
    pub title: Option<String>,
    pub last_error: Option<String>,
    pub result_path: Option<PathBuf>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    pub fn new() -> Self {
        Self {
            state: TaskState::Queued,
            strategy_index: 0,
            retry_count: 0,
            percent: 0.0,
            cascade_started: false,
            title: None,
            last_error: None,
            result_path: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Point in time copy of a task, safe to hand to presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    /// `None` for tasks submitted with an explicit cascade
    pub kind: Option<DownloadKind>,
    pub state: TaskState,
    pub strategy_index: usize,
    pub strategy_name: String,
    pub strategy_count: usize,
    pub retry_count: u32,
    pub max_retries: u32,
    pub percent: f64,
    pub title: Option<String>,
    pub last_error: Option<String>,
    pub result_path: Option<PathBuf>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    /// Name shown to users, the probed title when known
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}
