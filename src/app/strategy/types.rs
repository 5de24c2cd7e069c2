//! Strategy and cascade data types

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::ManagerError;

/// Kind of artifact a submission asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    /// Video with audio, merged into one container
    #[default]
    Video,
    /// Audio track only
    AudioOnly,
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadKind::Video => f.write_str("video"),
            DownloadKind::AudioOnly => f.write_str("audio-only"),
        }
    }
}

/// Parameters handed to the fetcher for one attempt
///
/// The orchestrator never interprets these fields, only the fetcher adapter does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FormatSelector {
    /// Format selection expression, e.g. `bv*+ba/b`
    pub format: String,
    /// Container to merge separate streams into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_output_format: Option<String>,
    /// Extract audio and convert it to this codec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_format: Option<String>,
    /// Number of fragments of a segmented stream fetched in parallel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrent_fragments: Option<u32>,
}

impl FormatSelector {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            ..Default::default()
        }
    }

    pub fn merge_into(mut self, container: impl Into<String>) -> Self {
        self.merge_output_format = Some(container.into());
        self
    }

    pub fn extract_audio(mut self, codec: impl Into<String>) -> Self {
        self.audio_format = Some(codec.into());
        self
    }

    pub fn fragments(mut self, count: u32) -> Self {
        self.concurrent_fragments = Some(count);
        self
    }
}

/// One attempt policy of a cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStrategy {
    pub name: String,
    #[serde(flatten)]
    pub format_selector: FormatSelector,
    /// Lower values are tried first
    #[serde(default)]
    pub priority: u32,
}

impl FetchStrategy {
    pub fn new(name: impl Into<String>, format_selector: FormatSelector, priority: u32) -> Self {
        Self {
            name: name.into(),
            format_selector,
            priority,
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.format_selector.format)
    }
}

/// Immutable, priority ordered list of strategies for one task
///
/// Cloning is cheap and every clone shares the same strategies, so a cascade
/// captured at submission can never change while the task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCascade {
    strategies: Arc<[FetchStrategy]>,
}

impl StrategyCascade {
    /// Build a cascade, ordering strategies by priority
    ///
    /// The sort is stable, so strategies sharing a priority keep their listed order.
    pub fn new(mut strategies: Vec<FetchStrategy>) -> Result<Self, ManagerError> {
        if strategies.is_empty() {
            return Err(ManagerError::EmptyCascade {
                kind: "custom cascade".to_string(),
            });
        }
        strategies.sort_by_key(|strategy| strategy.priority);
        Ok(Self {
            strategies: strategies.into(),
        })
    }

    pub fn get(&self, index: usize) -> Option<&FetchStrategy> {
        self.strategies.get(index)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Always false, a cascade holds at least one strategy
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Check if a strategy exists after `index`
    pub fn has_next(&self, index: usize) -> bool {
        index + 1 < self.strategies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FetchStrategy> {
        self.strategies.iter()
    }

    /// Strategy names in attempt order
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Ordered strategy lists per download kind, as read from settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyTable {
    #[serde(default = "super::presets::video_strategies")]
    pub video: Vec<FetchStrategy>,
    #[serde(default = "super::presets::audio_strategies")]
    pub audio_only: Vec<FetchStrategy>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            video: super::presets::video_strategies(),
            audio_only: super::presets::audio_strategies(),
        }
    }
}

impl StrategyTable {
    /// Strategies configured for a kind, in listed order
    pub fn strategies_for(&self, kind: DownloadKind) -> &[FetchStrategy] {
        match kind {
            DownloadKind::Video => &self.video,
            DownloadKind::AudioOnly => &self.audio_only,
        }
    }

    /// Build the cascade a new task of this kind will run
    pub fn cascade_for(&self, kind: DownloadKind) -> Result<StrategyCascade, ManagerError> {
        let strategies = self.strategies_for(kind).to_vec();
        StrategyCascade::new(strategies).map_err(|_| ManagerError::EmptyCascade {
            kind: kind.to_string(),
        })
    }

    /// Validate every list, collecting all problems
    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();
        for (kind, list) in [
            (DownloadKind::Video, &self.video),
            (DownloadKind::AudioOnly, &self.audio_only),
        ] {
            if list.is_empty() {
                errors.push(format!("no strategies configured for {}", kind));
            }
            for strategy in list {
                if strategy.name.trim().is_empty() {
                    errors.push(format!("{} strategy with empty name", kind));
                }
                if strategy.format_selector.format.trim().is_empty() {
                    errors.push(format!(
                        "{} strategy '{}' has an empty format",
                        kind, strategy.name
                    ));
                }
                if strategy.format_selector.concurrent_fragments == Some(0) {
                    errors.push(format!(
                        "{} strategy '{}' requests zero concurrent fragments",
                        kind, strategy.name
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
