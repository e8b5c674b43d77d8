//! Time helpers used by the panels.
//!
//! This module contains:
//! - Backend timestamp parsing
//! - Human-readable duration formatting
//!
//! IMPORTANT:
//! - No panel-specific logic should live here.
//! - Every function must tolerate malformed input and never panic.
//!

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};

/// Parses a backend timestamp.
///
/// The backend emits naive local ISO-8601 strings
/// (`2024-05-01T10:00:00.123456`); RFC 3339 strings with an offset are
/// accepted too.
///
/// Naive timestamps are interpreted in the local timezone, the same
/// way a browser would.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Wall-clock time of a backend timestamp, e.g. "10:00:01".
///
/// Falls back to the raw string if it cannot be parsed.
pub fn format_clock(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => raw.to_string(),
    }
}

/// Running time in hours and minutes, e.g. "3h 12m".
///
/// Negative spans (clock skew) are reported as zero.
pub fn format_running_time(elapsed: TimeDelta) -> String {
    let minutes = elapsed.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// Execution time in minutes and seconds, e.g. "1m 30s".
pub fn format_execution_time(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    format!("{}m {}s", seconds / 60, seconds % 60)
}

/// Span between two backend timestamps, if both parse.
pub fn span_between(start: &str, end: &str) -> Option<TimeDelta> {
    Some(parse_timestamp(end)? - parse_timestamp(start)?)
}
