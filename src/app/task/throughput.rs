//! Throughput tracking and published task vitals
//!
//! The worker is the only writer of a task's vitals. It publishes a fresh copy
//! through a watch channel after every sample so the stall monitor can read
//! them without sharing a lock with the worker.

use std::collections::VecDeque;

use tokio::time::Instant;

use crate::app::fetcher::FetchSample;

/// Bounded ring buffer of recent throughput samples in bytes/sec
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl ThroughputWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest one when full
    pub fn push(&mut self, bytes_per_sec: f64) {
        let value = if bytes_per_sec.is_finite() {
            bytes_per_sec.max(0.0)
        } else {
            0.0
        };
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Mean of the retained samples, zero when empty
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Vitals a task publishes for its stall monitor
#[derive(Debug, Clone, PartialEq)]
pub struct TaskVitals {
    /// Attempt counter, bumped whenever a new strategy attempt starts
    pub attempt: u64,
    /// Instant of the last forward progress within this attempt
    pub last_progress_at: Instant,
    pub throughput: ThroughputWindow,
}

impl TaskVitals {
    pub fn new(attempt: u64, window: usize) -> Self {
        Self {
            attempt,
            last_progress_at: Instant::now(),
            throughput: ThroughputWindow::new(window),
        }
    }
}

/// Converts raw fetch samples into rates for one attempt
#[derive(Debug, Clone)]
pub struct SampleTracker {
    last_bytes: u64,
    last_at: Instant,
}

impl SampleTracker {
    pub fn new() -> Self {
        Self {
            last_bytes: 0,
            last_at: Instant::now(),
        }
    }

    /// Apply a sample, returning `(forward_progress, bytes_per_sec)`
    ///
    /// The fetcher's own rate wins when it reports one. Otherwise the rate is
    /// derived from the byte delta since the previous sample. A byte count
    /// lower than the previous one starts a new stream (yt-dlp fetches video
    /// and audio separately) and counts as forward progress.
    pub fn observe(&mut self, sample: &FetchSample, now: Instant) -> (bool, f64) {
        if sample.downloaded_bytes < self.last_bytes {
            self.last_bytes = 0;
        }
        let forward = sample.downloaded_bytes > self.last_bytes;
        let elapsed = now.saturating_duration_since(self.last_at).as_secs_f64();
        let derived = if elapsed > 0.0 {
            sample.downloaded_bytes.saturating_sub(self.last_bytes) as f64 / elapsed
        } else {
            0.0
        };
        let rate = sample.instantaneous_rate.unwrap_or(derived);

        if forward {
            self.last_bytes = sample.downloaded_bytes;
        }
        self.last_at = now;
        (forward, rate)
    }
}

impl Default for SampleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate seconds remaining from progress and speed
pub fn estimate_eta(downloaded: u64, total: Option<u64>, bytes_per_sec: f64) -> Option<f64> {
    let total = total?;
    if total <= downloaded {
        return Some(0.0);
    }
    if bytes_per_sec <= 0.0 {
        return None;
    }
    Some((total - downloaded) as f64 / bytes_per_sec)
}
