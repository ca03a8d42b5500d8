//! Timing of a single activity at a time. [controller::TimerController] drives the lifecycle,
//! [split] turns a finished run into per-day records.

pub mod controller;
pub mod marker;
pub mod split;
pub mod ticker;

use crate::{
    error::ValidationError,
    storage::{
        entities::{ActivityId, DurationRecord},
        StoreError,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    #[error("Can't start {requested} while {running} is running")]
    Conflict {
        running: ActivityId,
        requested: ActivityId,
    },
    #[error("No timer is running for {0}")]
    NotRunning(ActivityId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Saved {} records, {} failed: {}", .appended.len(), .failures.len(), join_errors(.failures))]
    PartialAppend {
        appended: Vec<DurationRecord>,
        failures: Vec<StoreError>,
    },
    #[error("Saving task of a stopped timer failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn join_errors(errors: &[StoreError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
