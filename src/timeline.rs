//! Synthetic time axis shared by ingestion, range queries and training.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds since the Unix epoch of `2025-08-01T00:00:00`, the first synthetic timestamp.
pub const SYNTHETIC_EPOCH_SECS: i64 = 1_754_006_400;

pub const TIMESTAMP_COLUMN: &str = "synthetic_timestamp";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const MINUTE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
}

/// Inclusive `[start, end]` range in whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Result<Self, TimelineError> {
        if start > end {
            return Err(TimelineError::InvalidRange {
                start: format_timestamp(start),
                end: format_timestamp(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds. The start rounds up and the end rounds down to whole
    /// seconds, so that the inclusive comparison against stored seconds is exact.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimelineError> {
        let start_dt = parse_time_bound(start)?;
        let end_dt = parse_time_bound(end)?;
        if start_dt > end_dt {
            return Err(TimelineError::InvalidRange {
                start: start.trim().to_string(),
                end: end.trim().to_string(),
            });
        }

        let start_secs = ceil_seconds(start_dt);
        let end_secs = end_dt.and_utc().timestamp();
        Ok(Self {
            start: start_secs,
            end: end_secs,
        })
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// A sub-second range like `[00:00:00.2, 00:00:00.8]` has no whole second in it.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Synthetic timestamp of the `index`-th retained row.
pub fn synthetic_timestamp(index: u64) -> i64 {
    SYNTHETIC_EPOCH_SECS.saturating_add(index as i64)
}

pub fn parse_time_bound(raw: &str) -> Result<NaiveDateTime, TimelineError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TimelineError::InvalidTimestamp(raw.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).naive_utc());
    }

    for format in NAIVE_FORMATS.iter().chain(MINUTE_FORMATS.iter()) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(dt);
        }
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TimelineError::InvalidTimestamp(raw.to_string()))
}

pub fn format_timestamp(secs: i64) -> String {
    match Utc.timestamp_opt(secs, 0).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}

fn ceil_seconds(dt: NaiveDateTime) -> i64 {
    let secs = dt.and_utc().timestamp();
    if dt.nanosecond() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_matches_first_synthetic_timestamp() {
        assert_eq!(format_timestamp(SYNTHETIC_EPOCH_SECS), "2025-08-01T00:00:00");
        assert_eq!(synthetic_timestamp(0), SYNTHETIC_EPOCH_SECS);
        assert_eq!(format_timestamp(synthetic_timestamp(61)), "2025-08-01T00:01:01");
    }

    #[test]
    fn parses_naive_rfc3339_and_date_forms() {
        let expected = SYNTHETIC_EPOCH_SECS + 5;
        for raw in [
            "2025-08-01T00:00:05",
            "2025-08-01 00:00:05",
            "2025-08-01T00:00:05Z",
            "2025-08-01T02:00:05+02:00",
            "2025-08-01T00:00:05.0000000Z",
        ] {
            let parsed = parse_time_bound(raw).unwrap();
            assert_eq!(parsed.and_utc().timestamp(), expected, "{raw}");
        }

        let midnight = parse_time_bound("2025-08-01").unwrap();
        assert_eq!(midnight.and_utc().timestamp(), SYNTHETIC_EPOCH_SECS);
    }

    #[test]
    fn rejects_garbage_and_reversed_ranges() {
        assert!(matches!(
            parse_time_bound("yesterday"),
            Err(TimelineError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            TimeRange::parse("2025-08-01T00:00:10", "2025-08-01T00:00:05"),
            Err(TimelineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn fractional_bounds_shrink_to_whole_seconds() {
        let range = TimeRange::parse("2025-08-01T00:00:01.5", "2025-08-01T00:00:03.9").unwrap();
        assert_eq!(range.start, SYNTHETIC_EPOCH_SECS + 2);
        assert_eq!(range.end, SYNTHETIC_EPOCH_SECS + 3);
        assert!(!range.contains(SYNTHETIC_EPOCH_SECS + 1));
        assert!(range.contains(SYNTHETIC_EPOCH_SECS + 3));

        let sub_second =
            TimeRange::parse("2025-08-01T00:00:00.2", "2025-08-01T00:00:00.8").unwrap();
        assert!(sub_second.is_empty());
    }
}
