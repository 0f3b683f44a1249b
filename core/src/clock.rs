use chrono::{DateTime, Utc};

/// Current wall-clock time as fractional Unix seconds, the unit used on the wire.
pub fn now_timestamp() -> f64 {
    to_timestamp(Utc::now())
}

pub fn to_timestamp(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Inverse of [`to_timestamp`], at microsecond precision. `None` if out of range.
pub fn to_datetime(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((timestamp * 1_000_000.0).round() as i64)
}
