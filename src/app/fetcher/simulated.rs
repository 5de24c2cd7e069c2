//! Scripted fetcher for tests and dry runs
//!
//! [`SimulatedFetcher`] plays back a [`Behavior`] per strategy (optionally per
//! URL and strategy) instead of contacting any remote site. Successful attempts
//! write real files in the context's output directory so the caller's output
//! verification runs exactly as it does for real downloads.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::types::{FetchContext, FetchSample, Fetcher, MediaMetadata};
use crate::app::strategy::FetchStrategy;
use crate::errors::{FetchError, FetchResult};

/// What a simulated attempt does
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    /// Write `bytes` in `chunks` pieces, sleeping `chunk_delay` before each one
    Succeed {
        bytes: u64,
        chunks: u32,
        chunk_delay: Duration,
    },
    /// Fail with an extractor error after `after` has elapsed
    Fail { reason: String, after: Duration },
    /// Fail with a timeout
    Timeout,
    /// Fail with a fragment error
    Fragment,
    /// Report `bytes` once and then never make progress again
    Stall { bytes: u64 },
    /// Report completion but return a path that does not exist
    SucceedWithoutOutput,
}

impl Behavior {
    /// Quick success used by most scripts
    pub fn succeed() -> Self {
        Behavior::Succeed {
            bytes: 4096,
            chunks: 4,
            chunk_delay: Duration::from_millis(10),
        }
    }

    /// Immediate extractor failure
    pub fn fail(reason: impl Into<String>) -> Self {
        Behavior::Fail {
            reason: reason.into(),
            after: Duration::ZERO,
        }
    }

    /// Success that takes `total` of wall time to finish
    pub fn slow(total: Duration, chunks: u32) -> Self {
        let chunks = chunks.max(1);
        Behavior::Succeed {
            bytes: 64 * 1024 * u64::from(chunks),
            chunks,
            chunk_delay: total / chunks,
        }
    }
}

/// One recorded fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub url: String,
    pub strategy: String,
}

/// Fetcher that follows a script instead of the network
#[derive(Debug)]
pub struct SimulatedFetcher {
    default_behavior: Behavior,
    by_strategy: HashMap<String, Behavior>,
    by_url_strategy: HashMap<(String, String), Behavior>,
    probe_failures: HashSet<String>,
    probe_delay: Duration,
    attempts: Mutex<Vec<AttemptRecord>>,
}

impl Default for SimulatedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedFetcher {
    /// Fetcher where every strategy succeeds quickly
    pub fn new() -> Self {
        Self {
            default_behavior: Behavior::succeed(),
            by_strategy: HashMap::new(),
            by_url_strategy: HashMap::new(),
            probe_failures: HashSet::new(),
            probe_delay: Duration::ZERO,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Behavior for strategies without a more specific script
    pub fn with_default(mut self, behavior: Behavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Behavior for one strategy name, for every URL
    pub fn with_strategy(mut self, strategy: impl Into<String>, behavior: Behavior) -> Self {
        self.by_strategy.insert(strategy.into(), behavior);
        self
    }

    /// Behavior for one strategy name on one URL
    pub fn with_url_strategy(
        mut self,
        url: impl Into<String>,
        strategy: impl Into<String>,
        behavior: Behavior,
    ) -> Self {
        self.by_url_strategy
            .insert((url.into(), strategy.into()), behavior);
        self
    }

    /// Make probing this URL fail
    pub fn fail_probe(mut self, url: impl Into<String>) -> Self {
        self.probe_failures.insert(url.into());
        self
    }

    /// Delay every probe
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Attempts made so far, in call order
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        match self.attempts.lock() {
            Ok(attempts) => attempts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Strategy names attempted for a URL, in call order
    pub fn attempts_for(&self, url: &str) -> Vec<String> {
        self.attempts()
            .into_iter()
            .filter(|record| record.url == url)
            .map(|record| record.strategy)
            .collect()
    }

    fn behavior_for(&self, url: &str, strategy: &str) -> Behavior {
        self.by_url_strategy
            .get(&(url.to_string(), strategy.to_string()))
            .or_else(|| self.by_strategy.get(strategy))
            .unwrap_or(&self.default_behavior)
            .clone()
    }

    fn record(&self, url: &str, strategy: &str) {
        let record = AttemptRecord {
            url: url.to_string(),
            strategy: strategy.to_string(),
        };
        match self.attempts.lock() {
            Ok(mut attempts) => attempts.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Last path segment of the URL, reduced to a safe file stem
fn url_stem(url: &str) -> String {
    let stem: String = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("media")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        "media".to_string()
    } else {
        stem
    }
}

/// File name derived from the URL and the strategy
fn output_name(url: &str, strategy: &str) -> String {
    format!("{}-{}.bin", url_stem(url), strategy)
}

/// Sleep unless the attempt is cancelled first
async fn sleep_or_cancel(ctx: &FetchContext, delay: Duration) -> FetchResult<()> {
    if delay.is_zero() {
        return if ctx.is_cancelled() {
            Err(FetchError::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

#[async_trait]
impl Fetcher for SimulatedFetcher {
    async fn probe(&self, url: &str) -> FetchResult<MediaMetadata> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        if self.probe_failures.contains(url) {
            return Err(FetchError::probe(format!("unsupported URL: {}", url)));
        }
        Ok(MediaMetadata {
            id: Some(url_stem(url)),
            title: Some(format!("Simulated media for {}", url)),
            webpage_url: Some(url.to_string()),
            extractor: Some("simulated".to_string()),
            ..Default::default()
        })
    }

    async fn fetch(
        &self,
        url: &str,
        strategy: &FetchStrategy,
        ctx: FetchContext,
    ) -> FetchResult<PathBuf> {
        self.record(url, &strategy.name);
        let behavior = self.behavior_for(url, &strategy.name);
        debug!("Simulated fetch of {} with '{}': {:?}", url, strategy.name, behavior);

        match behavior {
            Behavior::Succeed {
                bytes,
                chunks,
                chunk_delay,
            } => {
                let chunks = u64::from(chunks.max(1));
                let path = ctx.output_dir().join(output_name(url, &strategy.name));
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&path)?;

                let chunk_size = bytes / chunks;
                let mut written = 0u64;
                for index in 0..chunks {
                    if let Err(e) = ctx.checkpoint().await {
                        let _ = std::fs::remove_file(&path);
                        return Err(e);
                    }
                    if let Err(e) = sleep_or_cancel(&ctx, chunk_delay).await {
                        let _ = std::fs::remove_file(&path);
                        return Err(e);
                    }

                    let size = if index + 1 == chunks {
                        bytes - written
                    } else {
                        chunk_size
                    };
                    file.write_all(&vec![0u8; size as usize])?;
                    written += size;

                    let mut sample = FetchSample::new(written, Some(bytes));
                    if !chunk_delay.is_zero() {
                        sample = sample.with_rate(size as f64 / chunk_delay.as_secs_f64());
                    }
                    ctx.report(sample);
                }
                file.flush()?;
                Ok(path)
            }
            Behavior::Fail { reason, after } => {
                sleep_or_cancel(&ctx, after).await?;
                Err(FetchError::attempt(reason))
            }
            Behavior::Timeout => Err(FetchError::Timeout {
                reason: "read timed out".to_string(),
            }),
            Behavior::Fragment => Err(FetchError::Fragment {
                reason: "fragment 3 not found".to_string(),
            }),
            Behavior::Stall { bytes } => {
                ctx.report(FetchSample::new(bytes, None).with_rate(0.0));
                ctx.cancel.cancelled().await;
                Err(FetchError::Cancelled)
            }
            Behavior::SucceedWithoutOutput => {
                ctx.report(FetchSample::new(1, Some(1)));
                Ok(ctx.output_dir().join(format!(
                    "missing-{}",
                    output_name(url, &strategy.name)
                )))
            }
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
