//! Built-in strategy lists
//!
//! Each list degrades from the highest fidelity combined stream to a single
//! pre-merged stream and finally to the lowest quality segmented stream.

use super::types::{FetchStrategy, FormatSelector};

/// Default cascade for video downloads
pub fn video_strategies() -> Vec<FetchStrategy> {
    vec![
        FetchStrategy::new(
            "best-combined",
            FormatSelector::new("bv*+ba/b").merge_into("mp4"),
            0,
        ),
        FetchStrategy::new("single-stream", FormatSelector::new("b"), 1),
        FetchStrategy::new(
            "lowest-segmented",
            FormatSelector::new("worst").fragments(4),
            2,
        ),
    ]
}

/// Default cascade for audio-only downloads
pub fn audio_strategies() -> Vec<FetchStrategy> {
    vec![
        FetchStrategy::new(
            "best-audio",
            FormatSelector::new("ba/b").extract_audio("mp3"),
            0,
        ),
        FetchStrategy::new(
            "any-audio",
            FormatSelector::new("bestaudio*/b").extract_audio("mp3"),
            1,
        ),
        FetchStrategy::new(
            "lowest-segmented-audio",
            FormatSelector::new("worstaudio/worst")
                .extract_audio("mp3")
                .fragments(4),
            2,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_ordered_by_priority() {
        for list in [video_strategies(), audio_strategies()] {
            let priorities: Vec<u32> = list.iter().map(|s| s.priority).collect();
            let mut sorted = priorities.clone();
            sorted.sort();
            assert_eq!(priorities, sorted);
            assert_eq!(list.len(), 3);
        }
    }

    #[test]
    fn test_audio_presets_extract_audio() {
        assert!(audio_strategies()
            .iter()
            .all(|s| s.format_selector.audio_format.as_deref() == Some("mp3")));
    }

    #[test]
    fn test_last_video_strategy_is_segmented() {
        let last = video_strategies().pop().unwrap();
        assert_eq!(last.format_selector.concurrent_fragments, Some(4));
    }
}
