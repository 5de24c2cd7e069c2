//! Fetch strategies and cascades
//!
//! A [`FetchStrategy`] is one set of parameters to attempt a download with. A
//! task runs a [`StrategyCascade`], the fixed priority ordered list of
//! strategies tried one after another until one produces a file. Settings
//! carry a [`StrategyTable`] with one list per [`DownloadKind`].
//!
//! # Module Organization
//!
//! - [`types`] - Strategy, selector, cascade and table types
//! - [`presets`] - Built-in lists used when settings do not override them

pub mod presets;
pub mod types;

pub use presets::{audio_strategies, video_strategies};
pub use types::{DownloadKind, FetchStrategy, FormatSelector, StrategyCascade, StrategyTable};
