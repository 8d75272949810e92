//! Time parsing and formatting utilities

use std::time::Duration;

/// Format seconds as `HH:MM:SS`
pub fn format_seconds(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Format a remaining-time estimate, or `--:--:--` when indeterminate
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(eta) => format_seconds(eta.as_secs_f64()),
        None => "--:--:--".to_string(),
    }
}

/// Parse a clock value such as `00:01:30.250000` into seconds
pub fn parse_clock(value: &str) -> Option<f64> {
    let value = value.trim();
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };

    let mut seconds = 0.0;
    for part in value.split(':') {
        let part: f64 = part.parse().ok()?;
        if !part.is_finite() || part < 0.0 {
            return None;
        }
        seconds = seconds * 60.0 + part;
    }

    if negative {
        None
    } else {
        Some(seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "00:00:00");
        assert_eq!(format_seconds(3661.4), "01:01:01");
        assert_eq!(format_seconds(-5.0), "00:00:00");
        assert_eq!(format_seconds(f64::NAN), "00:00:00");
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(None), "--:--:--");
        assert_eq!(format_eta(Some(Duration::from_secs(90))), "00:01:30");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("00:01:30.500000"), Some(90.5));
        assert_eq!(parse_clock("12.5"), Some(12.5));
        assert_eq!(parse_clock("N/A"), None);
        assert_eq!(parse_clock("-00:00:01.000000"), None);
    }

    #[test]
    fn test_parse_clock_rejects_non_finite() {
        assert_eq!(parse_clock("NaN"), None);
        assert_eq!(parse_clock("inf"), None);
        assert_eq!(parse_clock("00:inf:00"), None);
    }
}
