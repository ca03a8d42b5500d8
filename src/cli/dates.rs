use std::fmt::Display;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct DateArgs {
    #[arg(
        long,
        short,
        help = "Day to use. Examples are \"yesterday\", \"last friday\", \"15/03/2025\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl DateArgs {
    pub fn resolve(&self) -> Result<NaiveDate> {
        let now = Local::now();
        let Some(text) = &self.date else {
            return Ok(now.date_naive());
        };
        match parse_date_string(text, now, self.date_style.into()) {
            Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {text}: {e}"),
                )
                .into()),
        }
    }
}
