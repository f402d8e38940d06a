use chrono::{DateTime, Duration, NaiveTime, Utc};

/// Inclusive UTC calendar-day window `[00:00:00.000, 23:59:59.999]` containing `now`
pub fn utc_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Fixed-width bucket `[start, start + width)` containing `now`, aligned to the epoch
pub fn bucket_window(now: DateTime<Utc>, width_secs: i64) -> (DateTime<Utc>, DateTime<Utc>) {
    let width_ms = width_secs.max(1) * 1000;
    let ts = now.timestamp_millis();
    let start_ms = ts - ts.rem_euclid(width_ms);
    let start = DateTime::from_timestamp_millis(start_ms).unwrap_or(now);
    (start, start + Duration::milliseconds(width_ms))
}
