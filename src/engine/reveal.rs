//! Paced, ball-by-ball publication of an already decided winning set.

use crate::clock::Clock;
use crate::errors::{KenoResult, RoundError};
use crate::events::{EventSink, RoundEvent};
use crate::game::Round;
use crate::metrics::KenoMetrics;
use crate::retry::{retry_transient, RetryPolicy};
use crate::store::KenoStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct RevealScheduler {
    store: Arc<dyn KenoStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    metrics: Arc<KenoMetrics>,
    interval: Duration,
    retry: RetryPolicy,
}

impl RevealScheduler {
    pub fn new(
        store: Arc<dyn KenoStore>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        metrics: Arc<KenoMetrics>,
        interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            metrics,
            interval,
            retry,
        }
    }

    /// Reveal `round`'s winning set from its persisted cursor to the end,
    /// persisting the cursor after every ball. Returns the fully revealed round.
    pub async fn run(&self, round: Round) -> KenoResult<Round> {
        let numbers = round
            .winning_numbers
            .clone()
            .ok_or(RoundError::MissingDraw { round_id: round.id })?;
        let round_id = round.id;
        let start = round.revealed_count as usize;
        let mut current = round;

        for index in start..numbers.len() {
            tokio::time::sleep(self.interval).await;

            let count = (index + 1) as u8;
            let now = self.clock.now_ms();
            current = retry_transient(self.retry, "record_reveal", || {
                self.store.record_reveal(round_id, count, now)
            })
            .await
            .map_err(|(e, _)| e)?;

            let drawn = &numbers.as_slice()[..=index];
            let value = drawn[index];
            self.metrics.balls_revealed.inc();
            info!(round_id, index, value, "Ball revealed");
            self.sink.publish(RoundEvent::BallRevealed {
                round_id,
                value,
                index: index as u8,
                drawn: drawn.to_vec(),
            });
        }
        Ok(current)
    }
}
