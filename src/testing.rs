//! Doubles shared by tests of different modules.

use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use tokio::time::Instant;

use crate::{
    storage::{
        entities::{ActivityId, ActivitySession, DurationRecord, RecordId},
        local_state::LocalState,
        log_store::LogStore,
        StoreError,
    },
    utils::clock::Clock,
};

/// Moves with tokio time, so paused tests control it, and can additionally be pushed forward.
pub struct TestClock {
    start_time: DateTime<Utc>,
    reference: Instant,
    offset: Mutex<TimeDelta>,
}

impl TestClock {
    pub fn at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            reference: Instant::now(),
            offset: Mutex::new(TimeDelta::zero()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time()
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.offset.lock().unwrap() += delta;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }
}

#[async_trait]
impl Clock for TestClock {
    fn time(&self) -> DateTime<Utc> {
        self.start_time + self.reference.elapsed() + *self.offset.lock().unwrap()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<DurationRecord>>,
    append_calls: AtomicUsize,
    failing_appends: HashSet<usize>,
    append_delay: Option<Duration>,
}

impl MemoryLogStore {
    pub fn with_records(records: impl IntoIterator<Item = DurationRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Appends with these zero-based call numbers fail.
    pub fn failing_on(calls: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing_appends: calls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            append_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<DurationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, record: DurationRecord) -> Result<(), StoreError> {
        let call = self.append_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.append_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_appends.contains(&call) {
            return Err(io::Error::other(format!("append {call} refused")).into());
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn query_range(
        &self,
        activity: &ActivityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DurationRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.activity == *activity && start <= r.date && r.date <= end)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != *id);
        if records.len() == before {
            Err(StoreError::MissingRecord(id.clone()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct MemoryLocalState {
    entries: Mutex<BTreeMap<String, ActivitySession>>,
    set_delay: Option<Duration>,
}

impl MemoryLocalState {
    /// Every `set` takes `delay` before it is visible.
    pub fn slow(delay: Duration) -> Self {
        Self {
            set_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl LocalState for MemoryLocalState {
    async fn get(&self, key: &str) -> Result<Option<ActivitySession>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, session: &ActivitySession) -> Result<(), StoreError> {
        if let Some(delay) = self.set_delay {
            tokio::time::sleep(delay).await;
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), session.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ActivitySession>, StoreError> {
        Ok(self.entries.lock().unwrap().values().cloned().collect())
    }
}
