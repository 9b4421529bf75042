//! Time-related utilities

use chrono::{DateTime, Utc};

/// Render a millisecond epoch timestamp as RFC 3339 (UTC).
///
/// Out-of-range values are rendered as the raw number.
pub fn format_millis(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_millis(1_500), "1970-01-01T00:00:01.500+00:00");
        assert_eq!(format_millis(u64::MAX), u64::MAX.to_string());
    }
}
