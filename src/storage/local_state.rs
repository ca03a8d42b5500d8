use std::{io::ErrorKind, path::PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    entities::{ActivityId, ActivitySession},
    StoreError,
};

const SESSION_KEY_PREFIX: &str = "timer_";
const SESSION_EXTENSION: &str = "json";

/// Key under which the running session of `activity` is persisted. Every activity gets its own
/// key, so timers of different activities never touch the same entry.
pub fn session_key(activity: &ActivityId) -> String {
    format!("{SESSION_KEY_PREFIX}{activity}")
}

/// Small durable key-value storage for in-progress sessions.
#[async_trait]
pub trait LocalState: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ActivitySession>, StoreError>;

    async fn set(&self, key: &str, session: &ActivitySession) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Every persisted session, regardless of the activity.
    async fn list(&self) -> Result<Vec<ActivitySession>, StoreError>;
}

/// Keeps every key in its own file inside `state_dir`.
pub struct FileLocalState {
    state_dir: PathBuf,
}

impl FileLocalState {
    pub fn new(state_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&state_dir)?;
        Ok(Self { state_dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.state_dir.join(format!("{key}.{SESSION_EXTENSION}"))
    }
}

#[async_trait]
impl LocalState for FileLocalState {
    async fn get(&self, key: &str) -> Result<Option<ActivitySession>, StoreError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, session: &ActivitySession) -> Result<(), StoreError> {
        let content = serde_json::to_vec(session)?;
        // Rename is atomic, so a reader never sees a half written session.
        let temporary = self.state_dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&temporary, content).await?;
        tokio::fs::rename(&temporary, self.path(key)).await?;
        debug!("Persisted session under {key}");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<ActivitySession>, StoreError> {
        let mut sessions = vec![];
        let mut entries = tokio::fs::read_dir(&self.state_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_session = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(SESSION_KEY_PREFIX))
                && path.extension().is_some_and(|ext| ext == SESSION_EXTENSION);
            if !is_session {
                continue;
            }
            let content = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<ActivitySession>(&content) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Ignoring corrupted session file {path:?}: {e}"),
            }
        }
        Ok(sessions)
    }
}
