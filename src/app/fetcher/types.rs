//! Fetcher adapter interface
//!
//! The orchestrator talks to the media extraction primitive only through the
//! [`Fetcher`] trait. An adapter receives a [`FetchContext`] per attempt and
//! reports byte level progress through it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app::strategy::FetchStrategy;
use crate::app::task::PauseGate;
use crate::errors::FetchResult;

/// One byte level progress report from a fetcher
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FetchSample {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// Rate reported by the extractor itself, bytes/sec
    pub instantaneous_rate: Option<f64>,
}

impl FetchSample {
    pub fn new(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            instantaneous_rate: None,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.instantaneous_rate = Some(rate);
        self
    }
}

/// Metadata returned by a successful probe
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub extractor: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

impl MediaMetadata {
    /// Title if known, otherwise the id, otherwise a placeholder
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("untitled")
    }
}

/// Everything a fetcher needs for one attempt
#[derive(Debug, Clone)]
pub struct FetchContext {
    /// Attempt scoped cancellation; fires on task cancel and on stall abandonment
    pub cancel: CancellationToken,
    pub pause: PauseGate,
    pub progress: mpsc::UnboundedSender<FetchSample>,
    pub output_dir: PathBuf,
}

impl FetchContext {
    /// Forward a progress sample to the task
    ///
    /// Samples sent after the task stopped listening are dropped.
    pub fn report(&self, sample: FetchSample) {
        let _ = self.progress.send(sample);
    }

    /// Honor pause and cancellation inside the fetcher
    pub async fn checkpoint(&self) -> FetchResult<()> {
        self.pause.checkpoint(&self.cancel).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Media extraction primitive used by download tasks
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve metadata for a URL without downloading it
    async fn probe(&self, url: &str) -> FetchResult<MediaMetadata>;

    /// Download `url` using `strategy` and return the final file path
    ///
    /// Implementations should call [`FetchContext::checkpoint`] between chunks
    /// and return [`crate::errors::FetchError::Cancelled`] once the context is
    /// cancelled.
    async fn fetch(
        &self,
        url: &str,
        strategy: &FetchStrategy,
        ctx: FetchContext,
    ) -> FetchResult<PathBuf>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "fetcher"
    }
}
