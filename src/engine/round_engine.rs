//! Round state machine
//!
//! The engine keeps no round state of its own. Every [`RoundEngine::advance`]
//! call reloads the persisted current round and performs the next step for its
//! phase, so a fresh process resumes exactly where a crashed one stopped:
//!
//! * no round: create the first one
//! * `waiting`: count down, then decide and persist the winning set at cutoff
//! * `running`: reveal from the persisted cursor, or force-advance when stalled
//! * `calculating`: settle, then finish even if settlement ran out of retries
//! * `finished`: cool down, then open the next round

use super::reveal::RevealScheduler;
use crate::clock::Clock;
use crate::config::{GameConfig, KenoConfig, TimingConfig};
use crate::errors::{KenoResult, RoundError, SettlementError};
use crate::events::{EventSink, RoundEvent};
use crate::game::{
    selector_for, DrawContext, DrawSelector, HistoryEntry, Round, RoundStatus, SettlementEngine,
    SettlementReport, UnsettledRound,
};
use crate::metrics::KenoMetrics;
use crate::retry::{retry_transient, RetryPolicy};
use crate::stats::StatsLedger;
use crate::store::KenoStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// What one `advance` call did, and how long the loop may idle before the next.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Created { round_id: u64 },
    Countdown { round_id: u64, remaining_ms: u64 },
    Revealed { round_id: u64, stalled: bool },
    Settled { round_id: u64, report: Option<SettlementReport> },
    Cooldown { round_id: u64, remaining_ms: u64 },
}

impl Step {
    pub fn idle_for(&self, poll: Duration) -> Duration {
        match self {
            Step::Countdown { remaining_ms, .. } | Step::Cooldown { remaining_ms, .. } => {
                Duration::from_millis(*remaining_ms).min(poll)
            }
            _ => Duration::ZERO,
        }
    }
}

pub struct RoundEngine {
    store: Arc<dyn KenoStore>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    metrics: Arc<KenoMetrics>,
    rules: GameConfig,
    timing: TimingConfig,
    selector: Box<dyn DrawSelector>,
    rng: Mutex<StdRng>,
    settlement: SettlementEngine,
    reveal: RevealScheduler,
}

impl RoundEngine {
    pub fn new(
        config: &KenoConfig,
        store: Arc<dyn KenoStore>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        metrics: Arc<KenoMetrics>,
    ) -> Self {
        let ledger = StatsLedger::new(store.clone(), config.jackpot.clone());
        let settlement = SettlementEngine::new(store.clone(), config.game.clone(), ledger);
        let reveal = RevealScheduler::new(
            store.clone(),
            sink.clone(),
            clock.clone(),
            metrics.clone(),
            config.timing.reveal_interval(),
            RetryPolicy::fixed(
                Duration::from_millis(config.timing.reveal_retry_ms),
                config.timing.reveal_retry_attempts,
            ),
        );
        Self {
            store,
            sink,
            clock,
            metrics,
            rules: config.game.clone(),
            timing: config.timing.clone(),
            selector: selector_for(&config.rtp),
            rng: Mutex::new(StdRng::from_entropy()),
            settlement,
            reveal,
        }
    }

    /// Use a seeded RNG so draws are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_selector(mut self, selector: Box<dyn DrawSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Perform the next step for the persisted current round.
    pub async fn advance(&self) -> KenoResult<Step> {
        let now = self.clock.now_ms();
        let round = match self.store.load_round().await? {
            Some(round) => round,
            None => return self.open_round(self.rules.first_round_id).await,
        };
        self.metrics.current_round.set(round.id as i64);

        match round.status {
            RoundStatus::Waiting if now < round.cutoff_time => Ok(Step::Countdown {
                round_id: round.id,
                remaining_ms: round.time_remaining_ms(now),
            }),
            RoundStatus::Waiting => {
                let round = self.decide_draw(round).await?;
                self.reveal_round(round).await
            }
            RoundStatus::Running => self.reveal_round(round).await,
            RoundStatus::Calculating => self.settle_round(round).await,
            RoundStatus::Finished => {
                let ready_at = round.last_activity_time.saturating_add(self.timing.cooldown_ms);
                if now < ready_at {
                    return Ok(Step::Cooldown {
                        round_id: round.id,
                        remaining_ms: ready_at - now,
                    });
                }
                self.retry_unsettled().await;
                self.open_round(round.id + 1).await
            }
        }
    }

    async fn open_round(&self, round_id: u64) -> KenoResult<Step> {
        let now = self.clock.now_ms();
        let round = Round::new_waiting(round_id, now, self.timing.wait_ms);
        self.store.create_round(&round).await?;
        self.metrics.current_round.set(round_id as i64);
        info!(round_id, cutoff_time = round.cutoff_time, "Round opened for bets");
        self.publish_phase(&round, now);
        Ok(Step::Created { round_id })
    }

    /// `waiting -> running`. Betting is closed in the same store call that
    /// takes the ticket snapshot. The selection itself has no suspension point;
    /// the result is persisted whole before any ball is shown.
    async fn decide_draw(&self, round: Round) -> KenoResult<Round> {
        let tickets = self.store.close_bets(round.id, self.clock.now_ms()).await?;
        let stats = self.store.load_stats().await?;

        let decision = {
            let ctx = DrawContext::new(&tickets, stats, &self.rules);
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.selector.select(&ctx, &mut *rng)?
        };

        let now = self.clock.now_ms();
        let round = self.store.begin_draw(round.id, &decision.numbers, now).await?;
        info!(
            round_id = round.id,
            strategy = self.selector.name(),
            tickets = tickets.len(),
            round_stake = decision.round_stake,
            projected_payout = decision.projected_payout,
            ratio = decision.ratio,
            in_band = decision.in_band,
            trials = decision.trials_used,
            "Winning set decided"
        );
        self.publish_phase(&round, now);
        Ok(round)
    }

    /// Resume or finish the reveal of a running round.
    async fn reveal_round(&self, round: Round) -> KenoResult<Step> {
        if round.winning_numbers.is_none() {
            return Err(RoundError::MissingDraw { round_id: round.id }.into());
        }

        let now = self.clock.now_ms();
        let stalled = !round.is_fully_revealed() && round.is_stalled(now, self.timing.stall_threshold_ms());
        let round = if round.is_fully_revealed() {
            round
        } else if stalled {
            warn!(
                round_id = round.id,
                revealed = round.revealed_count,
                idle_ms = now.saturating_sub(round.last_activity_time),
                "Round stalled, forcing settlement with persisted numbers"
            );
            self.metrics.stall_recoveries.inc();
            round
        } else {
            if round.revealed_count > 0 {
                info!(round_id = round.id, from = round.revealed_count, "Resuming reveal");
            }
            self.reveal.run(round).await?
        };

        let now = self.clock.now_ms();
        let round = self
            .store
            .set_round_status(round.id, RoundStatus::Calculating, now)
            .await?;
        self.publish_phase(&round, now);
        Ok(Step::Revealed {
            round_id: round.id,
            stalled,
        })
    }

    /// Settle, then move to `finished` whatever the settlement outcome.
    async fn settle_round(&self, round: Round) -> KenoResult<Step> {
        let numbers = round
            .winning_numbers
            .clone()
            .ok_or(RoundError::MissingDraw { round_id: round.id })?;

        let policy = RetryPolicy::exponential(
            Duration::from_millis(self.timing.retry_delay_ms),
            Duration::from_millis(self.timing.max_backoff_ms),
            Some(self.timing.settlement_attempts),
        );
        let report = match retry_transient(policy, "settle_round", || {
            self.settlement.settle_round(round.id, &numbers)
        })
        .await
        {
            Ok(report) => {
                self.metrics.tickets_settled.inc_by(report.settled);
                Some(report)
            }
            Err((e, attempts)) => {
                let exhausted = SettlementError::RetriesExhausted {
                    round_id: round.id,
                    attempts,
                };
                error!(round_id = round.id, cause = %e, "{}, deferring to out-of-band retry", exhausted);
                self.metrics.unsettled_rounds.inc();
                self.store
                    .mark_unsettled(&UnsettledRound {
                        round_id: round.id,
                        winning_numbers: numbers.clone(),
                        attempts,
                        last_error: format!("{}: {}", exhausted, e),
                        recorded_at: self.clock.now_ms(),
                    })
                    .await?;
                None
            }
        };

        let now = self.clock.now_ms();
        let round = self
            .store
            .set_round_status(round.id, RoundStatus::Finished, now)
            .await?;

        let entry = HistoryEntry {
            round_id: round.id,
            winning_numbers: numbers.as_slice().to_vec(),
            finished_at: now,
        };
        if let Err(e) = self.store.archive_round(&entry, self.rules.history_len).await {
            warn!(round_id = round.id, error = %e, "Failed to archive round");
        }

        self.metrics.rounds_completed.inc();
        info!(round_id = round.id, "Round finished");
        self.sink.publish(RoundEvent::RoundFinished {
            round_id: round.id,
            winning_numbers: entry.winning_numbers,
        });
        self.publish_phase(&round, now);
        Ok(Step::Settled {
            round_id: round.id,
            report,
        })
    }

    /// Re-run settlement for rounds that finished without completing it.
    /// Failures are logged and left for the next attempt.
    pub async fn retry_unsettled(&self) {
        let pending = match self.store.unsettled_rounds().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Could not list unsettled rounds");
                return;
            }
        };

        for mut entry in pending {
            match self.settlement.settle_round(entry.round_id, &entry.winning_numbers).await {
                Ok(report) => {
                    self.metrics.tickets_settled.inc_by(report.settled);
                    info!(round_id = entry.round_id, settled = report.settled, "Unsettled round recovered");
                    if let Err(e) = self.store.clear_unsettled(entry.round_id).await {
                        warn!(round_id = entry.round_id, error = %e, "Could not clear unsettled marker");
                    }
                }
                Err(e) => {
                    entry.attempts += 1;
                    entry.last_error = e.to_string();
                    warn!(round_id = entry.round_id, attempts = entry.attempts, error = %e, "Unsettled round retry failed");
                    if let Err(e) = self.store.mark_unsettled(&entry).await {
                        warn!(round_id = entry.round_id, error = %e, "Could not update unsettled marker");
                    }
                }
            }
        }
    }

    fn publish_phase(&self, round: &Round, now: u64) {
        let time_remaining_ms = match round.status {
            RoundStatus::Waiting => round.time_remaining_ms(now),
            RoundStatus::Finished => round
                .last_activity_time
                .saturating_add(self.timing.cooldown_ms)
                .saturating_sub(now),
            RoundStatus::Running | RoundStatus::Calculating => 0,
        };
        self.sink.publish(RoundEvent::RoundPhaseChanged {
            round_id: round.id,
            status: round.status,
            time_remaining_ms,
        });
    }
}
