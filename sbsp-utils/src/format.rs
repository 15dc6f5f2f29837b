//! Formatting helpers for log and summary output

use std::time::Duration;

/// Format whole seconds into a human-readable string
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        if seconds > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

/// Like [`format_duration`], with sub-second precision below one minute
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(60) {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        format_duration(elapsed.as_secs())
    }
}

/// "k/n" progress fraction
pub fn format_fraction(done: usize, total: usize) -> String {
    format!("{}/{}", done, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m 5s");
        assert_eq!(format_duration(3600), "1h 0m");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
    }

    #[test]
    fn test_format_fraction() {
        assert_eq!(format_fraction(3, 10), "3/10");
    }
}
