//! Clock helpers shared by the coordinator and the relay.
//!
//! Chat timestamps are part of a message's identity, so they are truncated
//! to millisecond precision: that is what survives a round trip through a
//! browser `Date`.

use chrono::{DateTime, Utc};

/// Current UTC time, truncated to whole milliseconds.
pub fn now() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_millisecond_precision() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_now_is_reasonable() {
        let ts = now().timestamp_millis();
        // Should be after 2024-01-01 in millis
        assert!(ts > 1704067200_000, "Timestamp {} is too old", ts);
    }
}
