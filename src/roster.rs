use std::collections::BTreeMap;

use crate::storage::entities::ParticipantId;

/// Provides names shown next to a participant's series. Names are never used as identity.
#[cfg_attr(test, mockall::automock)]
pub trait Roster: Send + Sync {
    fn display_name(&self, participant: &ParticipantId) -> String;
}

/// Roster built from configured names. Unknown participants are shown by their id.
pub struct ConfigRoster {
    names: BTreeMap<ParticipantId, String>,
}

impl ConfigRoster {
    pub fn new(names: BTreeMap<ParticipantId, String>) -> Self {
        Self { names }
    }
}

impl Roster for ConfigRoster {
    fn display_name(&self, participant: &ParticipantId) -> String {
        self.names
            .get(participant)
            .cloned()
            .unwrap_or_else(|| participant.to_string())
    }
}
