use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::utils::clock::Clock;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns a task that reports the time elapsed since `start` every `period`.
///
/// Deadlines are derived from the first tick rather than from the previous wake up, so a slow
/// consumer or a late wake up doesn't accumulate drift. Ticks the consumer hasn't picked up are
/// dropped. The stream ends once `token` is cancelled.
pub fn spawn_ticker(
    clock: Arc<dyn Clock>,
    start: DateTime<Utc>,
    token: CancellationToken,
    period: Duration,
) -> ReceiverStream<TimeDelta> {
    let (sender, receiver) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut next_tick = clock.instant();
        loop {
            if token.is_cancelled() {
                return;
            }
            let elapsed = clock.time() - start;
            match sender.try_send(elapsed) {
                Ok(()) => trace!("Tick {elapsed}"),
                Err(TrySendError::Full(_)) => trace!("Skipped tick {elapsed}"),
                Err(TrySendError::Closed(_)) => return,
            }

            next_tick += period;
            tokio::select! {
                _ = token.cancelled() => return,
                _ = clock.sleep_until(next_tick) => (),
            }
        }
    });

    ReceiverStream::new(receiver)
}
