use chrono::{DateTime, Utc};

/// Wall-clock milliseconds since the unix epoch.
pub fn time_millis() -> i64 {
    let time: DateTime<Utc> = Utc::now();
    time.timestamp_millis()
}
