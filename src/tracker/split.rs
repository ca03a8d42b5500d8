use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone};

use crate::{error::ValidationError, utils::time::day_start};

/// Part of an interval that fell on a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayEntry {
    pub date: NaiveDate,
    pub minutes: u32,
}

/// Rounds to whole minutes, halves go up.
fn round_minutes(duration: TimeDelta) -> u32 {
    let millis = duration.num_milliseconds().max(0);
    let minutes = (millis + 30_000) / 60_000;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

/// Splits `[start, end)` into one entry per calendar day of `start`'s time zone.
///
/// Every entry is rounded on its own, so the sum of entries can be off from the rounded total by
/// up to a minute per crossed midnight. That drift is accepted and isn't reconciled.
pub fn split<Tz: TimeZone>(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
) -> Result<Vec<DayEntry>, ValidationError> {
    if start >= end {
        return Err(ValidationError::InvalidRange {
            start: start.fixed_offset(),
            end: end.fixed_offset(),
        });
    }

    let zone = start.timezone();
    let end = end.with_timezone(&zone);
    let last_date = end.date_naive();

    let mut entries = vec![];
    let mut current = start;
    while current.date_naive() < last_date {
        let date = current.date_naive();
        // A day without a valid start can only exist at the end of time.
        let Some(next_start) = date.succ_opt().and_then(|next| day_start(&zone, next)) else {
            break;
        };
        entries.push(DayEntry {
            date,
            minutes: round_minutes(next_start.clone() - current),
        });
        current = next_start;
    }

    // An interval ending exactly at midnight doesn't touch the day that starts there.
    if current < end {
        entries.push(DayEntry {
            date: current.date_naive(),
            minutes: round_minutes(end - current),
        });
    }

    Ok(entries)
}
