//! Conversions between subtitle timestamps (`HH:MM:SS,mmm`), seconds and the
//! timeline's native microsecond unit.
//!
//! Everything that enters the timeline is converted to [`TimeValue`] once, at the
//! boundary. Arithmetic after that point stays in integer microseconds.

use crate::error::{EngineError, EngineResult};

/// Microseconds since a track's own zero point.
pub type TimeValue = i64;

pub const MICROS_PER_SECOND: i64 = 1_000_000;
pub const MICROS_PER_MILLI: i64 = 1_000;

/// Parse `HH:MM:SS,mmm`. Hours are unbounded elapsed time, not wall-clock.
pub fn parse_subtitle_time(text: &str) -> EngineResult<TimeValue> {
    let trimmed = text.trim();
    let (clock, millis) = trimmed
        .split_once(',')
        .ok_or_else(|| EngineError::malformed(trimmed))?;

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 || millis.len() > 3 {
        return Err(EngineError::malformed(trimmed));
    }

    let hours = parse_component(parts[0], trimmed)?;
    let minutes = parse_component(parts[1], trimmed)?;
    let seconds = parse_component(parts[2], trimmed)?;
    let millis = parse_component(millis, trimmed)?;

    hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60)?.checked_add(h))
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(MICROS_PER_SECOND))
        .and_then(|us| us.checked_add(millis * MICROS_PER_MILLI))
        .ok_or_else(|| EngineError::malformed(trimmed))
}

fn parse_component(component: &str, whole: &str) -> EngineResult<i64> {
    if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::malformed(whole));
    }
    component
        .parse::<i64>()
        .map_err(|_| EngineError::malformed(whole))
}

/// Inverse of [`parse_subtitle_time`]. Sub-millisecond precision is truncated and
/// negative values format as zero.
pub fn format_subtitle_time(value: TimeValue) -> String {
    let value = value.max(0);
    let total_millis = value / MICROS_PER_MILLI;
    let millis = total_millis % 1000;
    let total_seconds = total_millis / 1000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = total_seconds / 3600;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

pub fn seconds_to_microseconds(seconds: f64) -> TimeValue {
    (seconds * MICROS_PER_SECOND as f64).round() as TimeValue
}

pub fn microseconds_to_seconds(value: TimeValue) -> f64 {
    value as f64 / MICROS_PER_SECOND as f64
}
