use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::storage::entities::{ActivityId, ActivitySession};

use super::TimerError;

/// Session that currently owns the marker, together with the token that stops its ticks.
#[derive(Debug, Clone)]
pub struct RunningSession {
    pub session: ActivitySession,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    /// Claimed, but the session isn't persisted yet. It can't be stopped until it is.
    Starting(RunningSession),
    Running(RunningSession),
    /// Records of the activity are being written. Nothing may start until they are.
    Stopping(ActivityId),
}

/// Which activity, if any, is running in this process. Starts empty, is claimed only by
/// [TimerController::start](super::controller::TimerController::start) or restart recovery and
/// is released only by `stop` or by a start that failed to persist its session.
///
/// The lock is never held across an await, which makes every transition atomic relative to
/// other tasks on the runtime.
#[derive(Debug, Default)]
pub struct RunningMarker {
    slot: Mutex<Slot>,
}

/// Result of a successful [RunningMarker::claim].
#[derive(Debug)]
pub enum Claim {
    /// The marker was empty and now holds the new session in starting state. It becomes
    /// running after [RunningMarker::promote].
    Claimed(RunningSession),
    /// The same activity is already running or starting.
    AlreadyRunning(RunningSession),
}

impl RunningMarker {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks and sets the marker in one step.
    pub fn claim(&self, session: ActivitySession) -> Result<Claim, TimerError> {
        let mut slot = self.lock();
        match &*slot {
            Slot::Idle => {
                let running = RunningSession {
                    session,
                    token: CancellationToken::new(),
                };
                *slot = Slot::Starting(running.clone());
                debug!("Marker claimed by {}", running.session.activity);
                Ok(Claim::Claimed(running))
            }
            Slot::Starting(running) | Slot::Running(running)
                if running.session.activity == session.activity =>
            {
                Ok(Claim::AlreadyRunning(running.clone()))
            }
            Slot::Starting(RunningSession { session: running, .. })
            | Slot::Running(RunningSession { session: running, .. }) => Err(TimerError::Conflict {
                running: running.activity.clone(),
                requested: session.activity,
            }),
            Slot::Stopping(activity) => Err(TimerError::Conflict {
                running: activity.clone(),
                requested: session.activity,
            }),
        }
    }

    /// Makes a claimed session of `activity` stoppable once it is persisted.
    pub fn promote(&self, activity: &ActivityId) {
        let mut slot = self.lock();
        match std::mem::take(&mut *slot) {
            Slot::Starting(running) if running.session.activity == *activity => {
                *slot = Slot::Running(running);
            }
            other => *slot = other,
        }
    }

    /// Undoes a claim whose session could not be persisted.
    pub fn release(&self, activity: &ActivityId) {
        let mut slot = self.lock();
        if let Slot::Starting(running) = &*slot {
            if running.session.activity == *activity {
                running.token.cancel();
                *slot = Slot::Idle;
            }
        }
    }

    /// Moves a running session of `activity` into stopping state and hands it out. The tick
    /// token is cancelled right away.
    pub fn begin_stop(&self, activity: &ActivityId) -> Result<ActivitySession, TimerError> {
        let mut slot = self.lock();
        match std::mem::take(&mut *slot) {
            Slot::Running(running) if running.session.activity == *activity => {
                running.token.cancel();
                *slot = Slot::Stopping(activity.clone());
                Ok(running.session)
            }
            other => {
                *slot = other;
                Err(TimerError::NotRunning(activity.clone()))
            }
        }
    }

    pub fn finish_stop(&self, activity: &ActivityId) {
        let mut slot = self.lock();
        if matches!(&*slot, Slot::Stopping(stopping) if stopping == activity) {
            *slot = Slot::Idle;
            debug!("Marker released by {activity}");
        }
    }

    pub fn running(&self) -> Option<RunningSession> {
        match &*self.lock() {
            Slot::Running(running) => Some(running.clone()),
            Slot::Idle | Slot::Starting(_) | Slot::Stopping(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::{
        storage::entities::ActivitySession,
        tracker::TimerError,
    };

    use super::{Claim, RunningMarker};

    fn session(activity: &str) -> ActivitySession {
        ActivitySession {
            activity: activity.parse().unwrap(),
            participant: "anna".parse().unwrap(),
            start: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn only_one_activity_can_hold_the_marker() {
        let marker = RunningMarker::default();
        assert!(matches!(marker.claim(session("a")), Ok(Claim::Claimed(_))));
        assert!(matches!(
            marker.claim(session("a")),
            Ok(Claim::AlreadyRunning(_))
        ));
        assert!(matches!(
            marker.claim(session("b")),
            Err(TimerError::Conflict { .. })
        ));

        marker.promote(&"a".parse().unwrap());
        assert!(matches!(
            marker.claim(session("b")),
            Err(TimerError::Conflict { .. })
        ));
    }

    #[test]
    fn starting_session_cannot_be_stopped() {
        let marker = RunningMarker::default();
        marker.claim(session("a")).unwrap();
        let a = "a".parse().unwrap();

        assert!(marker.running().is_none());
        assert!(matches!(
            marker.begin_stop(&a),
            Err(TimerError::NotRunning(_))
        ));

        marker.promote(&a);
        assert!(marker.running().is_some());
        assert!(marker.begin_stop(&a).is_ok());
    }

    #[test]
    fn stopping_blocks_new_claims_until_finished() {
        let marker = RunningMarker::default();
        let Ok(Claim::Claimed(running)) = marker.claim(session("a")) else {
            panic!("marker should be empty");
        };
        marker.promote(&running.session.activity);

        let stopped = marker.begin_stop(&running.session.activity).unwrap();
        assert!(running.token.is_cancelled());
        assert!(marker.running().is_none());

        assert!(matches!(
            marker.claim(session("b")),
            Err(TimerError::Conflict { .. })
        ));
        assert!(matches!(
            marker.begin_stop(&stopped.activity),
            Err(TimerError::NotRunning(_))
        ));

        marker.finish_stop(&stopped.activity);
        assert!(matches!(marker.claim(session("b")), Ok(Claim::Claimed(_))));
    }

    #[test]
    fn release_only_affects_matching_activity() {
        let marker = RunningMarker::default();
        marker.claim(session("a")).unwrap();
        marker.release(&"b".parse().unwrap());
        assert!(matches!(
            marker.claim(session("b")),
            Err(TimerError::Conflict { .. })
        ));
        marker.release(&"a".parse().unwrap());
        assert!(matches!(marker.claim(session("b")), Ok(Claim::Claimed(_))));
    }
}
