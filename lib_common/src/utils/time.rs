use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch, clamped at zero.
///
/// Used both as the id of pushed events and as the timestamp of history
/// samples, so it must come from the same clock everywhere.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Current UTC time formatted as an RFC 9557 / ISO-8601 string with millis.
pub fn current_datetime_rfc9557() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
