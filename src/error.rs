use chrono::{DateTime, FixedOffset};

use crate::calendar::AggregationWindow;

/// Input that can never be turned into a valid value, no matter how often it is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Interval must end after it starts, got {start} to {end}")]
    InvalidRange {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },
    #[error("There is no month {month} in year {year}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("Identifier {0:?} must be non-empty and can't contain whitespace or path separators")]
    InvalidId(String),
    #[error("Can't move past {0}, it is at the edge of the calendar")]
    WindowOutOfRange(AggregationWindow),
}
