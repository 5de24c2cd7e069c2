//! Aggregate progress across all known tasks

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::task::{TaskSnapshot, TaskState};

/// Task counts by state plus a weighted overall percent
///
/// Terminal tasks count as 100%, running tasks contribute their own percent,
/// queued and paused tasks contribute nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStatus {
    pub queued: usize,
    pub running: usize,
    pub paused: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub overall_percent: f64,
}

impl AggregateStatus {
    /// Fold a set of task snapshots
    pub fn from_snapshots<'a>(snapshots: impl IntoIterator<Item = &'a TaskSnapshot>) -> Self {
        let mut status = Self::default();
        let mut weighted = 0.0;

        for snapshot in snapshots {
            match snapshot.state {
                TaskState::Queued => status.queued += 1,
                TaskState::Running => {
                    status.running += 1;
                    weighted += snapshot.percent.clamp(0.0, 100.0);
                }
                TaskState::Paused => status.paused += 1,
                TaskState::Succeeded => status.succeeded += 1,
                TaskState::Failed => status.failed += 1,
                TaskState::Cancelled => status.cancelled += 1,
            }
            if snapshot.state.is_terminal() {
                weighted += 100.0;
            }
        }

        let total = status.total();
        if total > 0 {
            status.overall_percent = weighted / total as f64;
        }
        status
    }

    /// Number of tasks counted
    pub fn total(&self) -> usize {
        self.queued + self.running + self.paused + self.finished()
    }

    /// Tasks in a terminal state
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// Tasks currently holding a slot
    pub fn active(&self) -> usize {
        self.running + self.paused
    }

    pub fn is_complete(&self) -> bool {
        self.finished() == self.total()
    }

    /// Succeeded share of finished tasks, in percent
    pub fn success_rate(&self) -> f64 {
        match self.finished() {
            0 => 0.0,
            finished => self.succeeded as f64 / finished as f64 * 100.0,
        }
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% | {} running, {} paused, {} queued | {} ok, {} failed, {} cancelled",
            self.overall_percent,
            self.running,
            self.paused,
            self.queued,
            self.succeeded,
            self.failed,
            self.cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::task::TaskId;
    use chrono::Utc;

    fn snapshot(id: u64, state: TaskState, percent: f64) -> TaskSnapshot {
        TaskSnapshot {
            id: TaskId::new(id),
            url: format!("https://media.test/{}", id),
            kind: None,
            state,
            strategy_index: 0,
            strategy_name: "best".to_string(),
            strategy_count: 1,
            retry_count: 0,
            max_retries: 3,
            percent,
            title: None,
            last_error: None,
            result_path: None,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    #[test]
    fn test_empty_status() {
        let status = AggregateStatus::from_snapshots(std::iter::empty());
        assert_eq!(status.total(), 0);
        assert_eq!(status.overall_percent, 0.0);
        assert!(status.is_complete());
    }

    #[test]
    fn test_weighting_by_state() {
        let snapshots = vec![
            snapshot(1, TaskState::Succeeded, 100.0),
            snapshot(2, TaskState::Failed, 30.0),
            snapshot(3, TaskState::Running, 50.0),
            snapshot(4, TaskState::Paused, 80.0),
            snapshot(5, TaskState::Queued, 0.0),
        ];
        let status = AggregateStatus::from_snapshots(&snapshots);

        assert_eq!(status.total(), 5);
        assert_eq!(status.active(), 2);
        assert_eq!(status.finished(), 2);
        assert!((status.overall_percent - 50.0).abs() < 1e-9);
        assert_eq!(status.success_rate(), 50.0);
        assert!(!status.is_complete());
    }

    #[test]
    fn test_display_summary() {
        let status = AggregateStatus::from_snapshots(&[snapshot(1, TaskState::Cancelled, 0.0)]);
        let text = status.to_string();
        assert!(text.starts_with("100.0%"));
        assert!(text.contains("1 cancelled"));
    }
}
