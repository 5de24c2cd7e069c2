//! Per-task stall watchdog
//!
//! A [`StallMonitor`] runs on its own tokio task next to a running download.
//! On every tick it reads the vitals the worker published and, when the current
//! attempt has made no forward progress for longer than the stall timeout while
//! its recent throughput is near zero, it sends one [`StallNotice`] to the
//! worker. The worker then abandons the attempt and advances its cascade.
//!
//! # Stall episodes
//!
//! An episode is identified by the attempt number and the instant of the last
//! forward progress. The monitor reports each episode at most once; a fresh
//! progress sample or a new attempt opens a new episode.
//!
//! Paused time is excluded: the monitor never evaluates a paused task, and the
//! time a task spent paused is credited back to the episode after it resumes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::task::{TaskId, TaskVitals};
use crate::constants::stall;
use crate::errors::{ConfigError, ConfigResult};

/// Stall detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StallConfig {
    /// Time without forward progress before an attempt counts as stalled
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Interval between evaluations
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Average throughput (bytes/sec) below which a download counts as idle
    pub near_zero_bps: f64,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            timeout: stall::DEFAULT_STALL_TIMEOUT,
            check_interval: stall::STALL_CHECK_INTERVAL,
            near_zero_bps: stall::NEAR_ZERO_THROUGHPUT_BPS,
        }
    }
}

impl StallConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "stall.timeout".to_string(),
                value: "0s".to_string(),
                reason: "Stall timeout must be greater than zero".to_string(),
            });
        }

        if self.check_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "stall.check_interval".to_string(),
                value: "0s".to_string(),
                reason: "Check interval must be greater than zero".to_string(),
            });
        }

        if self.check_interval > self.timeout {
            return Err(ConfigError::InvalidValue {
                field: "stall.check_interval".to_string(),
                value: format!("{:?}", self.check_interval),
                reason: "Check interval must not exceed the stall timeout".to_string(),
            });
        }

        if !self.near_zero_bps.is_finite() || self.near_zero_bps < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "stall.near_zero_bps".to_string(),
                value: self.near_zero_bps.to_string(),
                reason: "Threshold must be a non-negative number".to_string(),
            });
        }

        Ok(())
    }
}

/// Request from the monitor to abandon the current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallNotice {
    pub attempt: u64,
    /// Staleness of the attempt, paused time excluded
    pub stalled_for: Duration,
}

type EpisodeKey = (u64, Instant);

/// Stall evaluation state for one task
#[derive(Debug)]
pub struct StallMonitor {
    config: StallConfig,
    episode: Option<EpisodeKey>,
    fired: Option<EpisodeKey>,
    paused_since: Option<Instant>,
    paused_credit: Duration,
}

impl StallMonitor {
    pub fn new(config: StallConfig) -> Self {
        Self {
            config,
            episode: None,
            fired: None,
            paused_since: None,
            paused_credit: Duration::ZERO,
        }
    }

    /// Record a pause gate change
    pub fn set_paused(&mut self, paused: bool, now: Instant) {
        match (paused, self.paused_since) {
            (true, None) => self.paused_since = Some(now),
            (false, Some(since)) => {
                // Pause time before the current episode began is not this episode's
                let start = match self.episode {
                    Some((_, episode_start)) => since.max(episode_start),
                    None => since,
                };
                self.paused_credit += now.saturating_duration_since(start);
                self.paused_since = None;
            }
            _ => {}
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Evaluate the latest vitals
    ///
    /// Returns a notice the first time an episode crosses the stall threshold.
    pub fn evaluate(&mut self, vitals: &TaskVitals, now: Instant) -> Option<StallNotice> {
        let key = (vitals.attempt, vitals.last_progress_at);
        if self.episode != Some(key) {
            self.episode = Some(key);
            self.paused_credit = Duration::ZERO;
        }

        if self.is_paused() || self.fired == Some(key) {
            return None;
        }

        let stalled_for = now
            .saturating_duration_since(vitals.last_progress_at)
            .saturating_sub(self.paused_credit);

        if stalled_for > self.config.timeout
            && vitals.throughput.average() < self.config.near_zero_bps
        {
            self.fired = Some(key);
            Some(StallNotice {
                attempt: vitals.attempt,
                stalled_for,
            })
        } else {
            None
        }
    }

    /// Run the monitor on its own tokio task until `stop` fires
    ///
    /// The loop ends early when the worker drops its notice receiver or its
    /// vitals sender.
    pub fn spawn(
        mut self,
        task_id: TaskId,
        mut vitals: watch::Receiver<TaskVitals>,
        mut paused: watch::Receiver<bool>,
        notices: mpsc::UnboundedSender<StallNotice>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            if *paused.borrow_and_update() {
                self.set_paused(true, Instant::now());
            }

            debug!(
                "Stall monitor started for task {} (timeout {:?})",
                task_id, self.config.timeout
            );

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    changed = paused.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let is_paused = *paused.borrow_and_update();
                        self.set_paused(is_paused, Instant::now());
                    }
                    _ = interval.tick() => {
                        if vitals.has_changed().is_err() {
                            break;
                        }
                        let snapshot = vitals.borrow_and_update().clone();
                        if let Some(notice) = self.evaluate(&snapshot, Instant::now()) {
                            warn!(
                                "Task {} stalled: no progress for {:?} on attempt {}",
                                task_id, notice.stalled_for, notice.attempt
                            );
                            if notices.send(notice).is_err() {
                                break;
                            }
                        }
                    }
                }
            }

            debug!("Stall monitor stopped for task {}", task_id);
        })
    }
}
