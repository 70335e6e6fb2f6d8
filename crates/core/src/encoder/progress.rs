//! Helpers shared by the progress parsers.

use regex_lite::Regex;

/// Returns the first capture group of the last match in `chunk`.
///
/// Chunks are raw reads, so several progress updates may arrive together; the
/// last one is the most recent.
pub(crate) fn last_capture<'a>(pattern: &Regex, chunk: &'a str) -> Option<&'a str> {
    pattern
        .captures_iter(chunk)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parses an integer percentage, clamped to 0..=100.
pub(crate) fn integer_percent(text: &str) -> Option<u8> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Digits only, so an overflow can only mean a huge value.
    let value = text.parse::<u64>().unwrap_or(u64::MAX);
    Some(value.min(100) as u8)
}

/// Parses a possibly fractional percentage, truncated and clamped to 0..=100.
pub(crate) fn fractional_percent(text: &str) -> Option<u8> {
    let value = text.trim().parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_capture_prefers_latest() {
        let re = Regex::new(r"\[\s*(\d+)%\]").unwrap();
        assert_eq!(last_capture(&re, "[ 10%] ... [ 20%]"), Some("20"));
        assert_eq!(last_capture(&re, "no progress here"), None);
    }

    #[test]
    fn test_integer_percent() {
        assert_eq!(integer_percent(" 45"), Some(45));
        assert_eq!(integer_percent("100"), Some(100));
        assert_eq!(integer_percent("250"), Some(100));
        assert_eq!(integer_percent("99999999999999999999999"), Some(100));
        assert_eq!(integer_percent(""), None);
        assert_eq!(integer_percent("4x"), None);
    }

    #[test]
    fn test_fractional_percent() {
        assert_eq!(fractional_percent("45.9"), Some(45));
        assert_eq!(fractional_percent(" 7"), Some(7));
        assert_eq!(fractional_percent("100.0"), Some(100));
        assert_eq!(fractional_percent("130.5"), Some(100));
        assert_eq!(fractional_percent("1.2.3"), None);
        assert_eq!(fractional_percent("."), None);
    }
}
