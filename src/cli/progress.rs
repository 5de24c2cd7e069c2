//! Terminal progress display for download sessions
//!
//! Renders the manager's event stream with indicatif: one bar per task plus an
//! overall bar counting finished tasks. When stderr is not a terminal the
//! display falls back to plain lines, logging downloads only each time they
//! cross another percent step.
//!
//! # Examples
//!
//! ```rust,no_run
//! use mediagrab::app::manager::DownloadManager;
//! use mediagrab::cli::{ProgressConfig, ProgressDisplay};
//!
//! # async fn example(manager: DownloadManager) {
//! let display = ProgressDisplay::new(ProgressConfig::default(), 3);
//! let events = manager.subscribe();
//! let display = tokio::spawn(display.run(events));
//! // submit three URLs ...
//! let mut display = display.await.unwrap();
//! display.finish(&manager.aggregate_status().await);
//! # }
//! ```

use std::collections::HashMap;
use std::time::Instant;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::debug;

use crate::app::manager::{AggregateStatus, EventSubscription};
use crate::app::progress::{format_duration, Outcome, ProgressEvent, ResultEvent, Stage, TaskEvent};
use crate::app::task::TaskId;
use crate::constants::progress;

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Draw progress bars when stderr is a terminal
    pub enable_progress_bars: bool,
    /// Percent step between plain download lines
    pub plain_log_step: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            plain_log_step: progress::PLAIN_LOG_PERCENT_STEP,
        }
    }
}

/// Main progress display
pub struct ProgressDisplay {
    config: ProgressConfig,
    multi: Option<MultiProgress>,
    overall: Option<ProgressBar>,
    bars: HashMap<TaskId, ProgressBar>,
    /// Last percent step logged per task in plain mode
    logged: HashMap<TaskId, f64>,
    expected: usize,
    results: Vec<ResultEvent>,
    started: Instant,
}

impl ProgressDisplay {
    /// Create a display expecting `expected` terminal results
    pub fn new(config: ProgressConfig, expected: usize) -> Self {
        let use_bars = config.enable_progress_bars && atty::is(atty::Stream::Stderr);

        let (multi, overall) = if use_bars {
            let multi = MultiProgress::new();
            let overall = multi.add(ProgressBar::new(expected as u64));
            overall.set_style(bar_style(progress::OVERALL_BAR_TEMPLATE));
            overall.set_message("downloads finished");
            (Some(multi), Some(overall))
        } else {
            eprintln!("Starting {} download(s)...", expected);
            (None, None)
        };

        Self {
            config,
            multi,
            overall,
            bars: HashMap::new(),
            logged: HashMap::new(),
            expected,
            results: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn is_bar_mode(&self) -> bool {
        self.multi.is_some()
    }

    /// True once every expected task has reported its result
    pub fn is_done(&self) -> bool {
        self.results.len() >= self.expected
    }

    pub fn results(&self) -> &[ResultEvent] {
        &self.results
    }

    /// Consume events until every expected result arrived or the stream ended
    pub async fn run(mut self, mut events: EventSubscription) -> Self {
        while !self.is_done() {
            match events.recv().await {
                Some(event) => self.handle(&event),
                None => {
                    debug!("Event stream closed before all results arrived");
                    break;
                }
            }
        }
        self
    }

    /// Update the display with one event
    pub fn handle(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Progress(progress) => self.on_progress(progress),
            TaskEvent::Result(result) => self.on_result(result),
        }
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        if let Some(multi) = &self.multi {
            let bar = self.bars.entry(event.task_id).or_insert_with(|| {
                let bar = match &self.overall {
                    Some(overall) => multi.insert_before(overall, ProgressBar::new(100)),
                    None => multi.add(ProgressBar::new(100)),
                };
                bar.set_style(bar_style(progress::TASK_BAR_TEMPLATE));
                bar.set_prefix(event.task_id.to_string());
                bar
            });

            bar.set_position(event.percent.round() as u64);
            match event.stage {
                Stage::Downloading => bar.set_message(format!(
                    "{} ETA {} {}",
                    event.rate_text, event.eta_text, event.message
                )),
                stage => bar.set_message(format!("{}: {}", stage, event.message)),
            }
            return;
        }

        match event.stage {
            Stage::Downloading => {
                if self.crossed_step(event.task_id, event.percent) {
                    eprintln!(
                        "[{}] {:>5.1}% {} ETA {}",
                        event.task_id, event.percent, event.rate_text, event.eta_text
                    );
                }
            }
            Stage::Retrying => {
                self.logged.remove(&event.task_id);
                eprintln!("[{}] {}: {}", event.task_id, event.stage, event.message);
            }
            _ => eprintln!("[{}] {}: {}", event.task_id, event.stage, event.message),
        }
    }

    /// Whether a download percent reached a new plain-log step
    fn crossed_step(&mut self, id: TaskId, percent: f64) -> bool {
        let step = self.config.plain_log_step.max(1.0);
        let bucket = (percent / step).floor() * step;
        match self.logged.get(&id) {
            Some(last) if *last >= bucket => false,
            _ => {
                self.logged.insert(id, bucket);
                true
            }
        }
    }

    fn on_result(&mut self, result: &ResultEvent) {
        let summary = match result.outcome {
            Outcome::Succeeded => format!(
                "done{}",
                result
                    .path
                    .as_ref()
                    .map(|p| format!(": {}", p.display()))
                    .unwrap_or_default()
            ),
            Outcome::Failed => format!(
                "failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ),
            Outcome::Cancelled => "cancelled".to_string(),
        };

        match (self.bars.remove(&result.task_id), &self.overall) {
            (Some(bar), _) => bar.finish_with_message(summary),
            (None, Some(_)) => {}
            (None, None) => eprintln!("[{}] {}", result.task_id, summary),
        }
        if let Some(overall) = &self.overall {
            overall.inc(1);
        }
        self.logged.remove(&result.task_id);
        self.results.push(result.clone());
    }

    /// Close the bars and print the session summary
    pub fn finish(&mut self, status: &AggregateStatus) {
        if let Some(overall) = self.overall.take() {
            overall.finish_with_message("downloads finished");
        }
        for (_, bar) in self.bars.drain() {
            bar.finish_and_clear();
        }

        eprintln!();
        eprintln!("Download Summary:");
        eprintln!("   Succeeded: {}", status.succeeded);
        eprintln!("   Failed: {}", status.failed);
        eprintln!("   Cancelled: {}", status.cancelled);
        eprintln!("   Duration: {}", format_duration(self.started.elapsed()));

        if status.failed > 0 {
            eprintln!("Some downloads failed. Run with -v for details.");
        }
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress::BAR_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn plain_display(expected: usize) -> ProgressDisplay {
        let config = ProgressConfig {
            enable_progress_bars: false,
            ..Default::default()
        };
        ProgressDisplay::new(config, expected)
    }

    #[test]
    fn test_plain_mode_throttles_download_lines() {
        let mut display = plain_display(1);
        let id = TaskId::new(1);

        assert!(!display.is_bar_mode());
        assert!(display.crossed_step(id, 3.0));
        assert!(!display.crossed_step(id, 7.0));
        assert!(display.crossed_step(id, 12.0));
        assert!(!display.crossed_step(id, 19.9));
        assert!(display.crossed_step(id, 100.0));
    }

    #[test]
    fn test_results_complete_the_display() {
        let mut display = plain_display(2);

        for (id, outcome) in [(1, Outcome::Succeeded), (2, Outcome::Cancelled)] {
            assert!(!display.is_done());
            display.handle(&TaskEvent::Result(ResultEvent {
                task_id: TaskId::new(id),
                outcome,
                path: None,
                error: None,
                strategy: None,
                retry_count: 0,
                timestamp: Utc::now(),
            }));
        }

        assert!(display.is_done());
        assert_eq!(display.results().len(), 2);
    }
}
