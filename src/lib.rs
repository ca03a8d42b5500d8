//! Activity timer that survives restarts, splits finished runs into per-day records, and charts
//! daily minutes of several participants side by side.

pub mod aggregation;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod error;
pub mod roster;
pub mod storage;
pub mod tracker;
pub mod utils;

#[cfg(test)]
mod testing;
