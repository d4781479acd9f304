//! Conversions between playback seconds and `HH:MM:SS` text.

/// Format seconds as zero-padded `HH:MM:SS`.
///
/// Sub-second remainders are truncated, not rounded. Negative or non-finite
/// input formats as `00:00:00`.
pub fn seconds_to_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Parse `HH:MM:SS` or `MM:SS` into seconds.
///
/// Returns `0.0` for anything else (wrong part count, non-numeric parts) so
/// form inputs never block on a half-typed value.
pub fn timestamp_to_seconds(text: &str) -> f64 {
    let parts: Option<Vec<f64>> = text
        .split(':')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect();

    match parts.as_deref() {
        Some([hours, minutes, seconds]) => hours * 3600.0 + minutes * 60.0 + seconds,
        Some([minutes, seconds]) => minutes * 60.0 + seconds,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_timestamp_truncates() {
        assert_eq!(seconds_to_timestamp(0.0), "00:00:00");
        assert_eq!(seconds_to_timestamp(59.999), "00:00:59");
        assert_eq!(seconds_to_timestamp(61.5), "00:01:01");
        assert_eq!(seconds_to_timestamp(3725.9), "01:02:05");
        assert_eq!(seconds_to_timestamp(360_000.0), "100:00:00");
    }

    #[test]
    fn test_seconds_to_timestamp_negative_input() {
        assert_eq!(seconds_to_timestamp(-3.0), "00:00:00");
        assert_eq!(seconds_to_timestamp(f64::NAN), "00:00:00");
    }

    #[test]
    fn test_timestamp_to_seconds_formats() {
        assert_eq!(timestamp_to_seconds("01:02:05"), 3725.0);
        assert_eq!(timestamp_to_seconds("02:05"), 125.0);
        assert_eq!(timestamp_to_seconds("00:00:05.5"), 5.5);
    }

    #[test]
    fn test_malformed_timestamps_are_zero() {
        assert_eq!(timestamp_to_seconds("abc"), 0.0);
        assert_eq!(timestamp_to_seconds("1:2:3:4"), 0.0);
        assert_eq!(timestamp_to_seconds(""), 0.0);
        assert_eq!(timestamp_to_seconds("12"), 0.0);
        assert_eq!(timestamp_to_seconds("00:xx:10"), 0.0);
    }

    #[test]
    fn test_round_trip_whole_seconds() {
        for s in [0u64, 1, 59, 60, 61, 3599, 3600, 3661, 86_399, 359_999] {
            let text = seconds_to_timestamp(s as f64);
            assert_eq!(timestamp_to_seconds(&text), s as f64, "round trip of {}", s);
        }
    }

    #[test]
    fn test_round_trip_floors_fractions() {
        assert_eq!(timestamp_to_seconds(&seconds_to_timestamp(20.5)), 20.0);
    }
}
