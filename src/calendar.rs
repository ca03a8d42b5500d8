//! Calendar ranges used to scope aggregation. Weeks always run Monday to Sunday.

use std::fmt::Display;

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Contiguous range of days. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationWindow {
    Week { monday: NaiveDate },
    Month { year: i32, month: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward,
    Forward,
}

impl AggregationWindow {
    pub fn week_of(date: NaiveDate) -> Self {
        Self::Week {
            monday: date.week(Weekday::Mon).first_day(),
        }
    }

    pub fn month_of(date: NaiveDate) -> Self {
        Self::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Builds a month window, rejecting months outside of 1..=12.
    pub fn month(year: i32, month: u32) -> Result<Self, ValidationError> {
        first_of_month(year, month)?;
        Ok(Self::Month { year, month })
    }

    pub fn start_date(&self) -> NaiveDate {
        match *self {
            Self::Week { monday } => monday,
            // Months are validated on construction and by `month_of`.
            Self::Month { year, month } => {
                first_of_month(year, month).unwrap_or(NaiveDate::MIN)
            }
        }
    }

    pub fn end_date(&self) -> NaiveDate {
        match *self {
            // Only the last week of the calendar is cut short.
            Self::Week { monday } => monday
                .checked_add_days(Days::new(6))
                .unwrap_or(NaiveDate::MAX),
            Self::Month { .. } => self
                .start_date()
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.start_date()
            .iter_days()
            .take_while(|date| *date <= self.end_date())
            .collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date() <= date && date <= self.end_date()
    }
}

impl Display for AggregationWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Week { .. } => write!(f, "{} - {}", self.start_date(), self.end_date()),
            Self::Month { .. } => write!(f, "{}", self.start_date().format("%B %Y")),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDate, ValidationError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(ValidationError::InvalidMonth { year, month })
}

/// Returns the 7 days from Monday to Sunday of the week containing `any_date`.
pub fn days_in_week(any_date: NaiveDate) -> Vec<NaiveDate> {
    AggregationWindow::week_of(any_date).dates()
}

/// Returns every day of `month` (1-based) in `year`.
pub fn days_in_month(month: u32, year: i32) -> Result<Vec<NaiveDate>, ValidationError> {
    Ok(AggregationWindow::month(year, month)?.dates())
}

/// Moves a window by exactly one window length, keeping its kind. Fails when the moved window
/// would fall outside of the representable calendar.
pub fn shift_window(
    window: AggregationWindow,
    direction: Direction,
) -> Result<AggregationWindow, ValidationError> {
    let out_of_range = || ValidationError::WindowOutOfRange(window);
    match window {
        AggregationWindow::Week { monday } => {
            let week = Days::new(7);
            let monday = match direction {
                Direction::Forward => monday.checked_add_days(week),
                Direction::Backward => monday.checked_sub_days(week),
            };
            monday
                .map(|monday| AggregationWindow::Week { monday })
                .ok_or_else(out_of_range)
        }
        AggregationWindow::Month { year, month } => {
            let (year, month) = match (direction, month) {
                (Direction::Forward, 12) => (year.checked_add(1).ok_or_else(out_of_range)?, 1),
                (Direction::Forward, month) => (year, month.saturating_add(1)),
                (Direction::Backward, 1) => (year.checked_sub(1).ok_or_else(out_of_range)?, 12),
                (Direction::Backward, month) => (year, month.checked_sub(1).ok_or_else(out_of_range)?),
            };
            AggregationWindow::month(year, month).map_err(|_| out_of_range())
        }
    }
}
