use std::sync::Arc;

use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, instrument, warn};

use crate::{
    storage::{
        entities::{ActivityId, ActivitySession, DurationRecord, ParticipantId},
        local_state::{session_key, LocalState},
        log_store::LogStore,
    },
    utils::clock::Clock,
};

use super::{
    marker::{Claim, RunningMarker},
    split::split,
    ticker::{spawn_ticker, TICK_INTERVAL},
    TimerError,
};

/// Summary of a successful stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedSession {
    pub session: ActivitySession,
    pub end: DateTime<Utc>,
    pub records: Vec<DurationRecord>,
}

/// Owns the `Idle -> Running -> Idle` lifecycle of activity timers. At most one activity runs at a
/// time. Day boundaries used when splitting a finished run come from `zone`.
pub struct TimerController<Tz: TimeZone = Local> {
    store: Arc<dyn LogStore>,
    state: Arc<dyn LocalState>,
    clock: Arc<dyn Clock>,
    marker: Arc<RunningMarker>,
    zone: Tz,
}

impl<Tz: TimeZone> TimerController<Tz> {
    /// Creates a controller and resumes a session left over by a previous process, if any.
    pub async fn restore(
        store: Arc<dyn LogStore>,
        state: Arc<dyn LocalState>,
        clock: Arc<dyn Clock>,
        zone: Tz,
    ) -> Result<Self, TimerError> {
        let controller = Self {
            store,
            state,
            clock,
            marker: Arc::new(RunningMarker::default()),
            zone,
        };

        let mut sessions = controller.state.list().await?;
        sessions.sort_by_key(|session| session.start);
        let mut sessions = sessions.into_iter();
        if let Some(session) = sessions.next() {
            info!(
                "Resuming {} started at {}",
                session.activity, session.start
            );
            let activity = session.activity.clone();
            controller.marker.claim(session)?;
            controller.marker.promote(&activity);
        }
        for ignored in sessions {
            warn!(
                "Ignoring persisted session of {}, only one timer can run at a time",
                ignored.activity
            );
        }

        Ok(controller)
    }

    /// Starts timing `activity`. Starting the activity that already runs returns its session.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        activity: ActivityId,
        participant: ParticipantId,
    ) -> Result<ActivitySession, TimerError> {
        let session = ActivitySession {
            activity,
            participant,
            start: self.clock.time(),
        };

        let running = match self.marker.claim(session)? {
            Claim::AlreadyRunning(running) => return Ok(running.session),
            Claim::Claimed(running) => running,
        };

        let key = session_key(&running.session.activity);
        if let Err(e) = self.state.set(&key, &running.session).await {
            error!("Failed to persist session {key}: {e}");
            self.marker.release(&running.session.activity);
            return Err(e.into());
        }
        self.marker.promote(&running.session.activity);

        info!("Started {}", running.session.activity);
        Ok(running.session)
    }

    /// Time elapsed in the running session. None until the session is persisted.
    pub fn tick(&self) -> Option<TimeDelta> {
        self.marker
            .running()
            .map(|running| running.session.elapsed(self.clock.time()))
    }

    pub fn running(&self) -> Option<ActivitySession> {
        self.marker.running().map(|running| running.session)
    }

    /// Stream of elapsed time, once a second, for as long as the current session runs.
    pub fn ticks(&self) -> Option<ReceiverStream<TimeDelta>> {
        self.marker.running().map(|running| {
            spawn_ticker(
                self.clock.clone(),
                running.session.start,
                running.token.child_token(),
                TICK_INTERVAL,
            )
        })
    }

    /// Stops `activity` and writes its time as per-day records.
    ///
    /// Records are written by a separate task which always runs to completion, even when the
    /// returned future is dropped. A failed write doesn't stop the remaining ones, and records
    /// that were written stay written.
    #[instrument(skip(self))]
    pub async fn stop(&self, activity: &ActivityId) -> Result<StoppedSession, TimerError> {
        let session = self.marker.begin_stop(activity)?;
        let end = self.clock.time();

        let entries = match split(
            session.start.with_timezone(&self.zone),
            end.with_timezone(&self.zone),
        ) {
            Ok(entries) => entries,
            Err(e) => {
                // Retrying can't fix a clock that moved backwards, so the session is cleared.
                warn!("Discarding session of {activity}: {e}");
                tokio::spawn(persist_stop(
                    self.store.clone(),
                    self.state.clone(),
                    self.marker.clone(),
                    session,
                    end,
                    vec![],
                ))
                .await??;
                return Err(e.into());
            }
        };

        let records = entries
            .into_iter()
            .map(|entry| {
                DurationRecord::new(
                    session.activity.clone(),
                    session.participant.clone(),
                    entry.date,
                    entry.minutes,
                )
            })
            .collect();

        let task = tokio::spawn(persist_stop(
            self.store.clone(),
            self.state.clone(),
            self.marker.clone(),
            session,
            end,
            records,
        ));
        task.await?
    }
}

/// Appends `records` one by one, then clears the persisted session and the marker.
async fn persist_stop(
    store: Arc<dyn LogStore>,
    state: Arc<dyn LocalState>,
    marker: Arc<RunningMarker>,
    session: ActivitySession,
    end: DateTime<Utc>,
    records: Vec<DurationRecord>,
) -> Result<StoppedSession, TimerError> {
    let mut appended = Vec::with_capacity(records.len());
    let mut failures = vec![];
    for record in records {
        match store.append(record.clone()).await {
            Ok(()) => appended.push(record),
            Err(e) => {
                error!(
                    "Failed to save {} minutes of {} on {}: {e}",
                    record.minutes, record.activity, record.date
                );
                failures.push(e);
            }
        }
    }

    let key = session_key(&session.activity);
    if let Err(e) = state.remove(&key).await {
        error!("Failed to clear persisted session {key}: {e}");
        failures.push(e);
    }
    marker.finish_stop(&session.activity);

    if failures.is_empty() {
        info!("Stopped {} with {} records", session.activity, appended.len());
        Ok(StoppedSession {
            session,
            end,
            records: appended,
        })
    } else {
        Err(TimerError::PartialAppend { appended, failures })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::{NaiveDate, TimeDelta, TimeZone, Utc};
    use tokio_stream::StreamExt;

    use crate::{
        storage::{
            entities::{ActivityId, ActivitySession, ParticipantId},
            local_state::{session_key, LocalState},
        },
        testing::{MemoryLocalState, MemoryLogStore, TestClock},
        tracker::TimerError,
        utils::logging::TEST_LOGGING,
    };

    use super::TimerController;

    struct Fixture {
        store: Arc<MemoryLogStore>,
        state: Arc<MemoryLocalState>,
        clock: Arc<TestClock>,
    }

    impl Fixture {
        fn new(store: MemoryLogStore) -> Self {
            Self {
                store: Arc::new(store),
                state: Arc::new(MemoryLocalState::default()),
                clock: Arc::new(TestClock::at(
                    Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap(),
                )),
            }
        }

        async fn controller(&self) -> TimerController<Utc> {
            TimerController::restore(
                self.store.clone(),
                self.state.clone(),
                self.clock.clone(),
                Utc,
            )
            .await
            .unwrap()
        }
    }

    fn activity(name: &str) -> ActivityId {
        name.parse().unwrap()
    }

    fn anna() -> ParticipantId {
        "anna".parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_writes_split_records() -> Result<()> {
        *TEST_LOGGING;
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        let session = controller.start(activity("running"), anna()).await?;
        assert_eq!(fixture.state.keys(), vec!["timer_running".to_string()]);

        fixture.clock.advance(TimeDelta::minutes(75));
        assert_eq!(controller.tick(), Some(TimeDelta::minutes(75)));

        let stopped = controller.stop(&session.activity).await?;
        let written: Vec<_> = fixture
            .store
            .records()
            .into_iter()
            .map(|r| (r.date, r.minutes))
            .collect();
        assert_eq!(
            written,
            vec![
                (NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 30),
                (NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), 45),
            ]
        );
        assert_eq!(stopped.records, fixture.store.records());
        assert!(fixture.state.keys().is_empty());
        assert_eq!(controller.tick(), None);
        assert_eq!(controller.running(), None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_activity_conflicts_until_stopped() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        controller.start(activity("a"), anna()).await?;
        let conflict = controller.start(activity("b"), anna()).await;
        assert!(matches!(
            conflict,
            Err(TimerError::Conflict { running, requested })
                if running == activity("a") && requested == activity("b")
        ));
        assert_eq!(fixture.state.keys(), vec!["timer_a".to_string()]);

        fixture.clock.advance(TimeDelta::minutes(5));
        controller.stop(&activity("a")).await?;

        let b = controller.start(activity("b"), anna()).await?;
        assert_eq!(controller.running(), Some(b));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_slow_start_leaves_session_running() -> Result<()> {
        let fixture = Fixture {
            state: Arc::new(MemoryLocalState::slow(Duration::from_millis(500))),
            ..Fixture::new(MemoryLogStore::default())
        };
        let controller = fixture.controller().await;

        let (started, stopped) = tokio::join!(controller.start(activity("a"), anna()), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.stop(&activity("a")).await
        });
        let started = started?;
        assert!(matches!(stopped, Err(TimerError::NotRunning(_))));
        assert_eq!(controller.running(), Some(started));
        assert_eq!(fixture.state.keys(), vec!["timer_a".to_string()]);

        fixture.clock.advance(TimeDelta::minutes(5));
        controller.stop(&activity("a")).await?;
        assert!(fixture.state.keys().is_empty());
        assert!(controller.running().is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_at_midnight_writes_single_record() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        controller.start(activity("a"), anna()).await?;
        fixture.clock.advance(TimeDelta::minutes(30));
        let stopped = controller.stop(&activity("a")).await?;

        let written: Vec<_> = stopped.records.iter().map(|r| (r.date, r.minutes)).collect();
        assert_eq!(
            written,
            vec![(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), 30)]
        );
        assert_eq!(fixture.store.append_calls(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_same_activity_returns_existing_session() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        let first = controller.start(activity("a"), anna()).await?;
        fixture.clock.advance(TimeDelta::minutes(3));
        let second = controller.start(activity("a"), anna()).await?;
        assert_eq!(first, second);
        assert_eq!(controller.tick(), Some(TimeDelta::minutes(3)));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_twice_is_not_running() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        assert!(matches!(
            controller.stop(&activity("a")).await,
            Err(TimerError::NotRunning(_))
        ));

        controller.start(activity("a"), anna()).await?;
        fixture.clock.advance(TimeDelta::minutes(10));
        controller.stop(&activity("a")).await?;
        let appended = fixture.store.append_calls();

        for _ in 0..2 {
            assert!(matches!(
                controller.stop(&activity("a")).await,
                Err(TimerError::NotRunning(a)) if a == activity("a")
            ));
        }
        assert_eq!(fixture.store.append_calls(), appended);
        assert_eq!(fixture.store.records().len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_of_other_activity_is_not_running() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;

        controller.start(activity("a"), anna()).await?;
        assert!(matches!(
            controller.stop(&activity("b")).await,
            Err(TimerError::NotRunning(_))
        ));
        assert!(controller.running().is_some());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_resumes_persisted_session() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let started = fixture.clock.now() - TimeDelta::minutes(90);
        let session = ActivitySession {
            activity: activity("climbing"),
            participant: anna(),
            start: started,
        };
        fixture
            .state
            .set(&session_key(&session.activity), &session)
            .await?;

        let controller = fixture.controller().await;
        assert_eq!(controller.running(), Some(session));
        assert_eq!(controller.tick(), Some(TimeDelta::minutes(90)));
        assert!(matches!(
            controller.start(activity("other"), anna()).await,
            Err(TimerError::Conflict { .. })
        ));

        let stopped = controller.stop(&activity("climbing")).await?;
        assert_eq!(stopped.records.len(), 1);
        assert_eq!(stopped.records[0].minutes, 90);
        assert!(fixture.state.keys().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_keeps_only_earliest_session() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        for (name, minutes_ago) in [("late", 5), ("early", 50)] {
            let session = ActivitySession {
                activity: activity(name),
                participant: anna(),
                start: fixture.clock.now() - TimeDelta::minutes(minutes_ago),
            };
            fixture
                .state
                .set(&session_key(&session.activity), &session)
                .await?;
        }

        let controller = fixture.controller().await;
        assert_eq!(
            controller.running().map(|s| s.activity),
            Some(activity("early"))
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_append_keeps_going_and_reports() -> Result<()> {
        *TEST_LOGGING;
        let fixture = Fixture::new(MemoryLogStore::failing_on([0]));
        let controller = fixture.controller().await;

        controller.start(activity("a"), anna()).await?;
        fixture.clock.advance(TimeDelta::minutes(75));
        let result = controller.stop(&activity("a")).await;

        let Err(TimerError::PartialAppend { appended, failures }) = result else {
            panic!("expected partial append, got {result:?}");
        };
        assert_eq!(fixture.store.append_calls(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(appended, fixture.store.records());
        assert_eq!(appended[0].minutes, 45);

        // Nothing is rolled back and the timer is idle again.
        assert!(fixture.state.keys().is_empty());
        assert!(controller.start(activity("b"), anna()).await.is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_stop_still_completes() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::slow(Duration::from_secs(1)));
        let controller = fixture.controller().await;

        controller.start(activity("a"), anna()).await?;
        fixture.clock.advance(TimeDelta::minutes(75));

        let interrupted =
            tokio::time::timeout(Duration::from_millis(100), controller.stop(&activity("a"))).await;
        assert!(interrupted.is_err());

        // Still stopping, no new activity may start yet.
        assert!(matches!(
            controller.start(activity("b"), anna()).await,
            Err(TimerError::Conflict { .. })
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fixture.store.records().len(), 2);
        assert!(fixture.state.keys().is_empty());
        assert!(controller.start(activity("b"), anna()).await.is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_elapsed_time_clears_session() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;
        let session = controller.start(activity("a"), anna()).await?;

        fixture
            .clock
            .advance(-(fixture.clock.now() - session.start) - TimeDelta::seconds(1));
        assert!(matches!(
            controller.stop(&activity("a")).await,
            Err(TimerError::Validation(_))
        ));
        assert!(fixture.store.records().is_empty());
        assert!(fixture.state.keys().is_empty());
        assert!(controller.running().is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_end_when_stopped() -> Result<()> {
        let fixture = Fixture::new(MemoryLogStore::default());
        let controller = fixture.controller().await;
        assert!(controller.ticks().is_none());

        controller.start(activity("a"), anna()).await?;
        let mut ticks = controller.ticks().unwrap();
        assert_eq!(ticks.next().await, Some(TimeDelta::zero()));
        assert_eq!(ticks.next().await, Some(TimeDelta::seconds(1)));

        controller.stop(&activity("a")).await?;
        assert_eq!(ticks.next().await, None);
        Ok(())
    }
}
