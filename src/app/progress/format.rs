//! Human readable formatting for throughput, ETA and sizes

use std::time::Duration;

use crate::constants::progress::UNKNOWN_PLACEHOLDER;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format a byte count, e.g. `3.4 MiB`
pub fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if value < KIB {
        format!("{} B", bytes)
    } else if value < MIB {
        format!("{:.1} KiB", value / KIB)
    } else if value < GIB {
        format!("{:.1} MiB", value / MIB)
    } else {
        format!("{:.2} GiB", value / GIB)
    }
}

/// Format a throughput in bytes/sec
///
/// Unknown or non-finite rates render as the placeholder so bars keep a stable width.
pub fn format_rate(bytes_per_sec: Option<f64>) -> String {
    match bytes_per_sec {
        Some(rate) if rate.is_finite() && rate >= 0.0 => {
            if rate < KIB {
                format!("{:.0} B/s", rate)
            } else if rate < MIB {
                format!("{:.1} KiB/s", rate / KIB)
            } else {
                format!("{:.1} MiB/s", rate / MIB)
            }
        }
        _ => UNKNOWN_PLACEHOLDER.to_string(),
    }
}

/// Format a remaining time in seconds as `MM:SS` or `H:MM:SS`
pub fn format_eta(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(duration) => format_duration(duration),
            Err(_) => UNKNOWN_PLACEHOLDER.to_string(),
        },
        None => UNKNOWN_PLACEHOLDER.to_string(),
    }
}

/// Format a duration as `MM:SS` or `H:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Percent complete of `downloaded` out of an optional `total`
pub fn percent_of(downloaded: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some((downloaded as f64 / total as f64 * 100.0).min(100.0)),
        _ => None,
    }
}
