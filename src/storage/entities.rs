use std::{fmt::Display, str::FromStr, sync::Arc};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Ids end up in storage keys and file names, so only a conservative set of characters is
/// accepted.
fn validate_id(value: &str) -> Result<(), ValidationError> {
    let valid = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':'));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidId(value.to_owned()))
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                validate_id(s)?;
                Ok(Self(s.into()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0.to_string()
            }
        }
    };
}

string_id!(
    /// A trackable pursuit that participants record time against.
    ActivityId
);
string_id!(
    /// A user who logs or views duration records.
    ParticipantId
);
string_id!(RecordId);

impl ParticipantId {
    /// Used when no participant is configured.
    pub fn anonymous() -> Self {
        Self("me".into())
    }
}

impl RecordId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }
}

/// One dated entry recording minutes spent on an activity by a participant. Records never span
/// more than a single calendar day.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct DurationRecord {
    pub id: RecordId,
    pub activity: ActivityId,
    pub participant: ParticipantId,
    pub date: NaiveDate,
    pub minutes: u32,
}

impl DurationRecord {
    pub fn new(
        activity: ActivityId,
        participant: ParticipantId,
        date: NaiveDate,
        minutes: u32,
    ) -> Self {
        Self {
            id: RecordId::random(),
            activity,
            participant,
            date,
            minutes,
        }
    }
}

/// In-progress timing of an activity. Only the start is stored; elapsed time is always
/// recomputed from it so that the session survives restarts.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivitySession {
    pub activity: ActivityId,
    pub participant: ParticipantId,
    pub start: DateTime<Utc>,
}

impl ActivitySession {
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        now - self.start
    }
}
