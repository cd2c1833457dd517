//! Poll interval policy driven by the server's `Expires` header.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Interval used before the first poll and whenever `Expires` is unusable
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10 * 60);
/// Interval used when the report expires in less than [`MIN_REMAINING`]
pub const FLOOR_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const MIN_REMAINING: Duration = Duration::from_secs(60);
/// Intervals above this are logged; they are not capped
pub const LONG_INTERVAL_WARNING: Duration = Duration::from_secs(60 * 60);

/// Compute the next poll interval from a raw `Expires` header value.
pub fn next_poll_interval(expires: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(raw) = expires else {
        tracing::debug!("No Expires header, using default interval");
        return DEFAULT_INTERVAL;
    };

    let expires_at = match parse_http_date(raw) {
        Ok(dt) => dt,
        Err(e) => {
            tracing::debug!("{}, using default interval", e);
            return DEFAULT_INTERVAL;
        }
    };

    // A date in the past yields a negative delta, which also falls under the floor.
    let interval = match (expires_at - now).to_std() {
        Ok(remaining) if remaining >= MIN_REMAINING => remaining,
        _ => FLOOR_INTERVAL,
    };

    if interval > LONG_INTERVAL_WARNING {
        tracing::warn!(
            "Expires header '{}' schedules the next poll in {:?}",
            raw,
            interval
        );
    }
    tracing::debug!("Next update in {:?}", interval);
    interval
}

/// Parse an HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`), also accepting the
/// obsolete RFC 850 and asctime forms.
pub fn parse_http_date(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%a, %d %b %Y %H:%M:%S GMT",
        "%A, %d-%b-%y %H:%M:%S GMT",
        "%a %b %e %H:%M:%S %Y",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    Err(format!("Could not parse HTTP date: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_expires_90_seconds_ahead_is_used_exactly() {
        let interval = next_poll_interval(Some("Sat, 14 Feb 2026 12:01:30 GMT"), now());
        assert_eq!(interval, Duration::from_secs(90));
    }

    #[test]
    fn test_expires_30_seconds_ahead_uses_floor() {
        let interval = next_poll_interval(Some("Sat, 14 Feb 2026 12:00:30 GMT"), now());
        assert_eq!(interval, Duration::from_secs(120));
    }

    #[test]
    fn test_expires_exactly_60_seconds_is_not_floored() {
        let interval = next_poll_interval(Some("Sat, 14 Feb 2026 12:01:00 GMT"), now());
        assert_eq!(interval, Duration::from_secs(60));
    }

    #[test]
    fn test_expires_in_the_past_uses_floor() {
        let interval = next_poll_interval(Some("Sat, 14 Feb 2026 11:00:00 GMT"), now());
        assert_eq!(interval, FLOOR_INTERVAL);
    }

    #[test]
    fn test_missing_expires_uses_default() {
        assert_eq!(next_poll_interval(None, now()), Duration::from_secs(600));
    }

    #[test]
    fn test_unparsable_expires_uses_default() {
        assert_eq!(next_poll_interval(Some("soon"), now()), Duration::from_secs(600));
        assert_eq!(next_poll_interval(Some(""), now()), Duration::from_secs(600));
    }

    #[test]
    fn test_far_future_expires_is_not_capped() {
        let interval = next_poll_interval(Some("Sun, 15 Feb 2026 12:00:00 GMT"), now());
        assert_eq!(interval, Duration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_parse_http_date_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 14, 12, 0, 0).unwrap();
        assert_eq!(parse_http_date("Sat, 14 Feb 2026 12:00:00 GMT"), Ok(expected));
        assert_eq!(parse_http_date("Sat, 14 Feb 2026 12:00:00 +0000"), Ok(expected));
        assert_eq!(parse_http_date("Saturday, 14-Feb-26 12:00:00 GMT"), Ok(expected));
        assert_eq!(parse_http_date("Sat Feb 14 12:00:00 2026"), Ok(expected));
        assert!(parse_http_date("not-a-date").is_err());
    }
}
