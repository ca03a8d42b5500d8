use std::{collections::BTreeMap, io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::storage::entities::ParticipantId;

pub const CONFIG_FILE: &str = "config.json";

/// Contents of `config.json` in the application directory. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Participant this client records time for.
    pub participant: ParticipantId,
    /// Display names of participants.
    pub names: BTreeMap<ParticipantId, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let participant = std::env::var("USER")
            .ok()
            .and_then(|user| user.parse().ok())
            .unwrap_or_else(ParticipantId::anonymous);
        Self {
            participant,
            names: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn load(application_dir: &Path) -> Result<Self> {
        let path = application_dir.join(CONFIG_FILE);
        match std::fs::read(&path) {
            Ok(content) => serde_json::from_slice(&content)
                .with_context(|| format!("Failed to parse configuration {path:?}")),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read configuration {path:?}")),
        }
    }
}
