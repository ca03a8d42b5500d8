//! Storage is split between two collaborators.
//!  - [log_store::LogStore] keeps duration records indefinitely. The file realization stores one
//!    JSON-lines file per calendar day.
//!  - [local_state::LocalState] keeps the in-progress session of each activity, so that a timer
//!    survives a restart of the process.

pub mod entities;
pub mod local_state;
pub mod log_store;

use entities::RecordId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Record {0} doesn't exist")]
    MissingRecord(RecordId),
}
