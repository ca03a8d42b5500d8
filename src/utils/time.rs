use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone};

/// This is the standard way of converting a date to a string in tempolog.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Returns the first instant of `date` in `zone`.
///
/// Some zones skip midnight when switching to daylight saving time. In that case the day starts
/// at the earliest valid local time after midnight.
pub fn day_start<Tz: TimeZone>(zone: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=24 * 4)
        .map(|quarter| midnight + TimeDelta::minutes(15 * quarter))
        .find_map(|local| zone.from_local_datetime(&local).earliest())
}

/// Formats elapsed time as `1h 2m 3s`.
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    format!(
        "{}h {}m {}s",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
