//! Fetcher backed by the yt-dlp executable
//!
//! Each probe and each fetch attempt runs one yt-dlp child process. Progress
//! is read from machine readable `--progress-template` lines on stdout and the
//! final file path from `--print after_move:filepath`. Reading stdout is also
//! the adapter's pause checkpoint: while the task is paused the adapter stops
//! reading, so the child blocks on a full pipe instead of downloading.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::config::YtDlpConfig;
use super::types::{FetchContext, FetchSample, Fetcher, MediaMetadata};
use crate::app::strategy::FetchStrategy;
use crate::constants::ytdlp::{PROGRESS_MARKER, PROGRESS_TEMPLATE, STDERR_TAIL_LINES};
use crate::errors::{FetchError, FetchResult};

/// One classified stdout line
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(FetchSample),
    FinalPath(PathBuf),
    Other,
}

fn progress_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[mediagrab-progress\]\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)").ok())
        .as_ref()
}

/// Parse a numeric template field, `NA` and friends become `None`
fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|value| value.is_finite() && *value >= 0.0)
}

/// Classify one line of yt-dlp stdout
pub fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim();
    if line.is_empty() {
        return OutputLine::Other;
    }

    if line.starts_with(PROGRESS_MARKER) {
        return match progress_regex().and_then(|re| re.captures(line)) {
            Some(caps) => {
                let downloaded = caps.get(1).and_then(|m| parse_number(m.as_str()));
                let total = caps
                    .get(2)
                    .and_then(|m| parse_number(m.as_str()))
                    .or_else(|| caps.get(3).and_then(|m| parse_number(m.as_str())));
                let speed = caps.get(4).and_then(|m| parse_number(m.as_str()));

                match downloaded {
                    Some(downloaded) => OutputLine::Progress(FetchSample {
                        downloaded_bytes: downloaded as u64,
                        total_bytes: total.map(|t| t as u64),
                        instantaneous_rate: speed,
                    }),
                    None => OutputLine::Other,
                }
            }
            None => OutputLine::Other,
        };
    }

    // Everything yt-dlp logs itself is bracketed; a bare line is the printed path
    if line.starts_with('[') || line.starts_with("ERROR:") || line.starts_with("WARNING:") {
        OutputLine::Other
    } else {
        OutputLine::FinalPath(PathBuf::from(line))
    }
}

/// Map a failed run's stderr to a fetch error
pub fn classify_failure(stderr_tail: &[String], exit_code: Option<i32>) -> FetchError {
    let reason = stderr_tail
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr_tail.last())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("yt-dlp exited with status {}", code),
            None => "yt-dlp was terminated by a signal".to_string(),
        });

    let lowered = reason.to_lowercase();
    if lowered.contains("timed out") || lowered.contains("timeout") {
        FetchError::Timeout { reason }
    } else if lowered.contains("fragment") {
        FetchError::Fragment { reason }
    } else {
        FetchError::Attempt { reason }
    }
}

/// Fetcher that shells out to yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &YtDlpConfig {
        &self.config
    }

    /// Version string of the configured executable
    pub async fn version(&self) -> FetchResult<String> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|source| self.launch_error(source))?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn launch_error(&self, source: std::io::Error) -> FetchError {
        FetchError::Launch {
            binary: self.config.binary.display().to_string(),
            source,
        }
    }

    /// Arguments for a metadata probe
    pub fn probe_args(&self, url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
            "--skip-download".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.as_secs().max(1).to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    /// Arguments for one fetch attempt
    pub fn fetch_args(&self, url: &str, strategy: &FetchStrategy, output_dir: &Path) -> Vec<String> {
        let selector = &strategy.format_selector;
        let mut args = vec![
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout.as_secs().max(1).to_string(),
            "-f".to_string(),
            selector.format.clone(),
        ];

        if let Some(container) = &selector.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }
        if let Some(codec) = &selector.audio_format {
            args.push("-x".to_string());
            args.push("--audio-format".to_string());
            args.push(codec.clone());
        }
        if let Some(fragments) = selector.concurrent_fragments {
            args.push("--concurrent-fragments".to_string());
            args.push(fragments.to_string());
        }
        if let Some(ffmpeg) = &self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.display().to_string());
        }

        args.push("-o".to_string());
        args.push(
            output_dir
                .join(&self.config.output_template)
                .display()
                .to_string(),
        );
        args.push("--print".to_string());
        args.push("after_move:filepath".to_string());
        args.push("--no-simulate".to_string());
        args.extend(self.config.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Kill the child and reap it
    async fn terminate(child: &mut Child) {
        if let Err(e) = child.kill().await {
            debug!("yt-dlp already exited: {}", e);
        }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> FetchResult<MediaMetadata> {
        debug!("Probing {}", url);
        let output = self
            .command()
            .args(self.probe_args(url))
            .output()
            .await
            .map_err(|source| self.launch_error(source))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(str::to_string).collect();
            let reason = match classify_failure(&lines, output.status.code()) {
                FetchError::Attempt { reason }
                | FetchError::Timeout { reason }
                | FetchError::Fragment { reason } => reason,
                other => other.to_string(),
            };
            return Err(FetchError::Probe { reason });
        }

        let metadata: MediaMetadata = serde_json::from_slice(&output.stdout)?;
        debug!("Probed {}: {}", url, metadata.display_name());
        Ok(metadata)
    }

    async fn fetch(
        &self,
        url: &str,
        strategy: &FetchStrategy,
        ctx: FetchContext,
    ) -> FetchResult<PathBuf> {
        ctx.checkpoint().await?;

        let args = self.fetch_args(url, strategy, ctx.output_dir());
        info!("Starting yt-dlp for {} with strategy '{}'", url, strategy.name);
        debug!("yt-dlp args: {:?}", args);

        let mut child = self
            .command()
            .args(&args)
            .spawn()
            .map_err(|source| self.launch_error(source))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchError::attempt("failed to capture yt-dlp stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FetchError::attempt("failed to capture yt-dlp stderr"))?;

        // stderr is drained independently so pausing stdout never wedges the child on it
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail: Vec<String> = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut final_path: Option<PathBuf> = None;

        loop {
            if let Err(e) = ctx.checkpoint().await {
                Self::terminate(&mut child).await;
                return Err(e);
            }

            let line = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    Self::terminate(&mut child).await;
                    return Err(FetchError::Cancelled);
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else { break };
            match parse_output_line(&line) {
                OutputLine::Progress(sample) => ctx.report(sample),
                OutputLine::FinalPath(path) => {
                    debug!("yt-dlp reported output file {}", path.display());
                    final_path = Some(path);
                }
                OutputLine::Other => debug!("yt-dlp: {}", line),
            }
        }

        let status = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                Self::terminate(&mut child).await;
                return Err(FetchError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let error = classify_failure(&stderr_tail, status.code());
            warn!("yt-dlp strategy '{}' failed for {}: {}", strategy.name, url, error);
            return Err(error);
        }

        final_path.ok_or(FetchError::MissingOutput)
    }

    fn name(&self) -> &str {
        "yt-dlp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::strategy::{audio_strategies, video_strategies};

    #[test]
    fn test_parse_progress_line() {
        let line = "[mediagrab-progress] 1048576 4194304 NA 524288.5";
        match parse_output_line(line) {
            OutputLine::Progress(sample) => {
                assert_eq!(sample.downloaded_bytes, 1_048_576);
                assert_eq!(sample.total_bytes, Some(4_194_304));
                assert_eq!(sample.instantaneous_rate, Some(524_288.5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_progress_uses_estimate_when_total_missing() {
        let line = "[mediagrab-progress] 100 NA 1000.0 NA";
        match parse_output_line(line) {
            OutputLine::Progress(sample) => {
                assert_eq!(sample.total_bytes, Some(1000));
                assert_eq!(sample.instantaneous_rate, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_path_and_noise() {
        assert_eq!(
            parse_output_line("/tmp/out/Clip [abc].mp4"),
            OutputLine::FinalPath(PathBuf::from("/tmp/out/Clip [abc].mp4"))
        );
        assert_eq!(parse_output_line("[youtube] abc: Downloading webpage"), OutputLine::Other);
        assert_eq!(parse_output_line("   "), OutputLine::Other);
        assert_eq!(parse_output_line("[mediagrab-progress] NA NA NA NA"), OutputLine::Other);
    }

    #[test]
    fn test_classify_failure() {
        let timeout = vec!["ERROR: Read timed out.".to_string()];
        assert!(matches!(classify_failure(&timeout, Some(1)), FetchError::Timeout { .. }));

        let fragment = vec![
            "[download] Got error".to_string(),
            "ERROR: fragment 12 not found, unable to continue".to_string(),
        ];
        assert!(matches!(classify_failure(&fragment, Some(1)), FetchError::Fragment { .. }));

        match classify_failure(&[], Some(2)) {
            FetchError::Attempt { reason } => assert!(reason.contains("status 2")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fetch_args_follow_selector() {
        let fetcher = YtDlpFetcher::new(YtDlpConfig::default());
        let strategies = video_strategies();
        let args = fetcher.fetch_args("https://v.test/1", &strategies[0], Path::new("/out"));

        let pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[pos + 1], "bv*+ba/b");
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"after_move:filepath".to_string()));
        assert_eq!(args.last().unwrap(), "https://v.test/1");
        assert_eq!(args[args.len() - 2], "--");

        let segmented = fetcher.fetch_args("https://v.test/1", &strategies[2], Path::new("/out"));
        assert!(segmented.contains(&"--concurrent-fragments".to_string()));
        assert!(!segmented.contains(&"--merge-output-format".to_string()));

        let audio = fetcher.fetch_args("https://v.test/1", &audio_strategies()[0], Path::new("/out"));
        assert!(audio.contains(&"-x".to_string()));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_launch_error() {
        let fetcher = YtDlpFetcher::new(YtDlpConfig {
            binary: PathBuf::from("/nonexistent/mediagrab-yt-dlp"),
            ..Default::default()
        });
        let result = fetcher.probe("https://v.test/1").await;
        assert!(matches!(result, Err(FetchError::Launch { .. })));
    }
}
