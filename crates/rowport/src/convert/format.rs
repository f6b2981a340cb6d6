//! Value coercions used by the field conversions.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::error::{MigrateError, Result};

/// Zero dates stored by MySQL for "no value"; they convert to timestamp 0.
const ZERO_DATES: [&str; 2] = ["0000-00-00 00:00:00", "0000-00-00"];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Coerce a string to its decimal integer form.
///
/// Leading whitespace and an optional sign are accepted, then digits are read
/// up to the first non-digit. Leading zeros are dropped, so `"007"` becomes
/// `"7"`. A value without digits coerces to `"0"`. Works on the digit string
/// directly, so arbitrarily wide values are not truncated.
pub fn coerce_integer(raw: &str) -> String {
    let s = raw.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = rest
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = rest[..end].trim_start_matches('0');

    if digits.is_empty() {
        "0".to_string()
    } else if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    }
}

/// Parse a datetime string into Unix epoch seconds, reading naive values as UTC.
///
/// Returns `Some(0)` for MySQL zero dates and `None` when the value cannot
/// be parsed.
pub fn datetime_to_epoch(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if ZERO_DATES.contains(&s) {
        return Some(0);
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

/// Offset epoch seconds are rendered in when none is configured.
pub const DEFAULT_DATETIME_OFFSET: &str = "+01:00";

/// The [`DEFAULT_DATETIME_OFFSET`] as a chrono offset.
pub fn default_datetime_offset() -> FixedOffset {
    FixedOffset::east_opt(3600).unwrap_or_else(|| Utc.fix())
}

/// Parse a UTC offset such as `+01:00`, `-0500` or `+00:00`.
pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    raw.trim()
        .parse::<FixedOffset>()
        .map_err(|e| MigrateError::Config(format!("invalid datetime offset {:?}: {}", raw, e)))
}

/// Format Unix epoch seconds as `YYYY-MM-DD HH:MM:SS` at the given offset.
pub fn epoch_to_datetime(secs: i64, offset: FixedOffset) -> Option<String> {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_integer() {
        assert_eq!(coerce_integer("007"), "7");
        assert_eq!(coerce_integer("42"), "42");
        assert_eq!(coerce_integer("  12abc"), "12");
        assert_eq!(coerce_integer("-0012"), "-12");
        assert_eq!(coerce_integer("+5"), "5");
        assert_eq!(coerce_integer("abc"), "0");
        assert_eq!(coerce_integer(""), "0");
        assert_eq!(coerce_integer("-0"), "0");
        assert_eq!(coerce_integer("3.75"), "3");
        assert_eq!(
            coerce_integer("000123456789012345678901234567890"),
            "123456789012345678901234567890"
        );
    }

    #[test]
    fn test_datetime_to_epoch() {
        assert_eq!(datetime_to_epoch("2009-02-12 15:35:13"), Some(1234452913));
        assert_eq!(datetime_to_epoch("2009-02-12T15:35:13"), Some(1234452913));
        assert_eq!(datetime_to_epoch("2009-02-12 15:35:13.250"), Some(1234452913));
        assert_eq!(datetime_to_epoch("2009-02-12T16:35:13+01:00"), Some(1234452913));
        assert_eq!(datetime_to_epoch("1970-01-02"), Some(86_400));
        assert_eq!(datetime_to_epoch("0000-00-00 00:00:00"), Some(0));
        assert_eq!(datetime_to_epoch("0000-00-00"), Some(0));
    }

    #[test]
    fn test_datetime_to_epoch_rejects_garbage() {
        assert_eq!(datetime_to_epoch("yesterday"), None);
        assert_eq!(datetime_to_epoch(""), None);
        assert_eq!(datetime_to_epoch("2009-13-45 99:00:00"), None);
    }

    #[test]
    fn test_epoch_to_datetime() {
        let offset = default_datetime_offset();
        assert_eq!(
            epoch_to_datetime(1234450083, offset).as_deref(),
            Some("2009-02-12 15:48:03")
        );
        assert_eq!(epoch_to_datetime(0, offset).as_deref(), Some("1970-01-01 01:00:00"));
        assert_eq!(epoch_to_datetime(i64::MAX, offset), None);
    }

    #[test]
    fn test_epoch_to_datetime_at_other_offsets() {
        let utc = parse_offset("+00:00").unwrap();
        assert_eq!(
            epoch_to_datetime(1234450083, utc).as_deref(),
            Some("2009-02-12 14:48:03")
        );
        let west = parse_offset("-05:00").unwrap();
        assert_eq!(epoch_to_datetime(0, west).as_deref(), Some("1969-12-31 19:00:00"));
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset(DEFAULT_DATETIME_OFFSET).unwrap(), default_datetime_offset());
        assert_eq!(parse_offset("+0100").unwrap(), default_datetime_offset());
        assert!(matches!(parse_offset("Europe/Paris"), Err(MigrateError::Config(_))));
        assert!(parse_offset("").is_err());
    }

    #[test]
    fn test_datetime_round_trip_is_asymmetric() {
        // Parsing reads UTC, rendering uses the display offset.
        let secs = datetime_to_epoch("2009-02-12 14:48:03").unwrap();
        assert_eq!(secs, 1234450083);
        assert_eq!(
            epoch_to_datetime(secs, default_datetime_offset()).as_deref(),
            Some("2009-02-12 15:48:03")
        );
    }
}
