use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use futures::{stream, StreamExt, TryStreamExt};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::date_to_record_name;

use super::{
    entities::{ActivityId, DurationRecord, RecordId},
    StoreError,
};

/// Interface for abstracting storage of duration records.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, record: DurationRecord) -> Result<(), StoreError>;

    /// Returns records of `activity` dated between `start` and `end`, both inclusive.
    async fn query_range(
        &self,
        activity: &ActivityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DurationRecord>, StoreError>;

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError>;
}

/// Number of day files read concurrently during a range query.
const READ_AHEAD: usize = 4;

/// The main realization of [LogStore]. Each calendar day gets its own file, named after the
/// date, holding one JSON record per line.
pub struct JsonLogStore {
    record_dir: PathBuf,
}

impl JsonLogStore {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    async fn read_day(&self, date: NaiveDate) -> Result<Vec<DurationRecord>, StoreError> {
        let path = self.day_path(date);
        match read_records(&path).await {
            Ok(records) => Ok(records),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a record from a single day file. Returns false if the file doesn't hold it.
    async fn delete_from(path: &Path, id: &RecordId) -> Result<bool, StoreError> {
        let mut file = File::options().read(true).write(true).open(path).await?;
        file.lock_exclusive()?;
        let result = Self::rewrite_without(&mut file, path, id).await;
        file.unlock_async().await?;
        result
    }

    async fn rewrite_without(
        file: &mut File,
        path: &Path,
        id: &RecordId,
    ) -> Result<bool, StoreError> {
        let mut content = String::new();
        file.read_to_string(&mut content).await?;

        let mut found = false;
        let mut kept = String::with_capacity(content.len());
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<DurationRecord>(line) {
                Ok(record) if record.id == *id => found = true,
                Ok(_) => {
                    kept.push_str(line);
                    kept.push('\n');
                }
                Err(e) => {
                    // Kept as is, the line might still be recoverable by hand.
                    warn!("Keeping illegal json string {line} in {path:?}: {e}");
                    kept.push_str(line);
                    kept.push('\n');
                }
            }
        }

        if found {
            file.set_len(0).await?;
            file.rewind().await?;
            file.write_all(kept.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(found)
    }
}

async fn read_records(path: &Path) -> Result<Vec<DurationRecord>, std::io::Error> {
    debug!("Extracting {path:?}");
    let file = File::open(path).await?;
    file.lock_shared()?;
    let buffer = BufReader::new(file);
    let mut lines = buffer.lines();
    let mut records = vec![];
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DurationRecord>(&line) {
            Ok(v) => records.push(v),
            Err(e) => {
                // ignore illegal values. Might happen if the process died mid write
                warn!("During parsing in path {path:?} found illegal json string {line}: {e}")
            }
        }
    }

    lines.into_inner().into_inner().unlock_async().await?;

    Ok(records)
}

#[async_trait]
impl LogStore for JsonLogStore {
    async fn append(&self, record: DurationRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = File::options()
            .create(true)
            .append(true)
            .open(self.day_path(record.date))
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        result?;

        debug!("Appended record {} for {}", record.id, record.date);
        Ok(())
    }

    async fn query_range(
        &self,
        activity: &ActivityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DurationRecord>, StoreError> {
        let days = stream::iter(start.iter_days().take_while(move |day| *day <= end));

        let per_day: Vec<Vec<DurationRecord>> = days
            .map(|day| self.read_day(day))
            .buffered(READ_AHEAD)
            .try_collect()
            .await?;

        Ok(per_day
            .into_iter()
            .flatten()
            .filter(|record| record.activity == *activity)
            .collect())
    }

    async fn delete(&self, id: &RecordId) -> Result<(), StoreError> {
        let mut entries = tokio::fs::read_dir(&self.record_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if Self::delete_from(&entry.path(), id).await? {
                debug!("Deleted record {id} from {:?}", entry.path());
                return Ok(());
            }
        }
        Err(StoreError::MissingRecord(id.clone()))
    }
}
