//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use keno::errors::{KenoResult, StorageError};
use keno::events::{EventSink, RoundEvent};
use keno::game::{
    AggregateStats, HistoryEntry, JackpotRound, JackpotState, Round, RoundStatus, Ticket,
    TicketOutcome, UnsettledRound, WinningSet,
};
use keno::store::{KenoStore, MemoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Event sink that keeps everything it is given
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RoundEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RoundEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Values of every `BallRevealed` event for `round_id`, in publish order.
    pub fn balls(&self, round_id: u64) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RoundEvent::BallRevealed { round_id: id, value, .. } if id == round_id => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<u64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RoundEvent::RoundFinished { round_id, .. } => Some(round_id),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: RoundEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Wraps a [`MemoryStore`] and fails chosen operations a set number of times
/// with `StorageError::Unavailable` before letting them through.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failures: Mutex<HashMap<&'static str, u32>>,
    bet_before_draw: Mutex<Option<(Ticket, u64)>>,
    bet_before_draw_result: Mutex<Option<KenoResult<u64>>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            bet_before_draw: Mutex::new(None),
            bet_before_draw_result: Mutex::new(None),
        }
    }

    /// Commit `ticket` with a clock reading of `now` right before the next
    /// `begin_draw`, after the engine has taken its ticket snapshot.
    pub fn commit_before_draw(&self, ticket: Ticket, now: u64) {
        *self.bet_before_draw.lock().unwrap() = Some((ticket, now));
    }

    pub fn committed_before_draw(&self) -> Option<KenoResult<u64>> {
        self.bet_before_draw_result.lock().unwrap().take()
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail(&self, op: &'static str, times: u32) {
        self.failures.lock().unwrap().insert(op, times);
    }

    pub fn remaining(&self, op: &'static str) -> u32 {
        self.failures.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    fn check(&self, op: &'static str) -> KenoResult<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StorageError::Unavailable(format!("injected {} failure", op)).into())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl KenoStore for FlakyStore {
    async fn load_round(&self) -> KenoResult<Option<Round>> {
        self.check("load_round")?;
        self.inner.load_round().await
    }

    async fn create_round(&self, round: &Round) -> KenoResult<()> {
        self.check("create_round")?;
        self.inner.create_round(round).await
    }

    async fn close_bets(&self, round_id: u64, now: u64) -> KenoResult<Vec<Ticket>> {
        self.check("close_bets")?;
        self.inner.close_bets(round_id, now).await
    }

    async fn begin_draw(&self, round_id: u64, numbers: &WinningSet, now: u64) -> KenoResult<Round> {
        self.check("begin_draw")?;
        let pending = self.bet_before_draw.lock().unwrap().take();
        if let Some((ticket, bet_now)) = pending {
            let result = self.inner.commit_bet(&ticket, bet_now).await;
            *self.bet_before_draw_result.lock().unwrap() = Some(result);
        }
        self.inner.begin_draw(round_id, numbers, now).await
    }

    async fn record_reveal(&self, round_id: u64, revealed_count: u8, now: u64) -> KenoResult<Round> {
        self.check("record_reveal")?;
        self.inner.record_reveal(round_id, revealed_count, now).await
    }

    async fn set_round_status(&self, round_id: u64, status: RoundStatus, now: u64) -> KenoResult<Round> {
        self.check("set_round_status")?;
        self.inner.set_round_status(round_id, status, now).await
    }

    async fn commit_bet(&self, ticket: &Ticket, now: u64) -> KenoResult<u64> {
        self.check("commit_bet")?;
        self.inner.commit_bet(ticket, now).await
    }

    async fn tickets_for_round(&self, round_id: u64) -> KenoResult<Vec<Ticket>> {
        self.check("tickets_for_round")?;
        self.inner.tickets_for_round(round_id).await
    }

    async fn settle_ticket(&self, round_id: u64, ticket_id: &str, outcome: &TicketOutcome) -> KenoResult<bool> {
        self.check("settle_ticket")?;
        self.inner.settle_ticket(round_id, ticket_id, outcome).await
    }

    async fn balance(&self, user_id: &str) -> KenoResult<u64> {
        self.check("balance")?;
        self.inner.balance(user_id).await
    }

    async fn adjust_balance(&self, user_id: &str, delta: i64) -> KenoResult<u64> {
        self.check("adjust_balance")?;
        self.inner.adjust_balance(user_id, delta).await
    }

    async fn add_stats(&self, delta: AggregateStats) -> KenoResult<AggregateStats> {
        self.check("add_stats")?;
        self.inner.add_stats(delta).await
    }

    async fn load_stats(&self) -> KenoResult<AggregateStats> {
        self.check("load_stats")?;
        self.inner.load_stats().await
    }

    async fn archive_round(&self, entry: &HistoryEntry, keep: usize) -> KenoResult<()> {
        self.check("archive_round")?;
        self.inner.archive_round(entry, keep).await
    }

    async fn recent_history(&self, limit: usize) -> KenoResult<Vec<HistoryEntry>> {
        self.check("recent_history")?;
        self.inner.recent_history(limit).await
    }

    async fn jackpot(&self) -> KenoResult<JackpotState> {
        self.check("jackpot")?;
        self.inner.jackpot().await
    }

    async fn contribute_jackpot(&self, round_id: u64, amount: u64) -> KenoResult<JackpotRound> {
        self.check("contribute_jackpot")?;
        self.inner.contribute_jackpot(round_id, amount).await
    }

    async fn claim_jackpot(&self, round_id: u64, winners: u64) -> KenoResult<u64> {
        self.check("claim_jackpot")?;
        self.inner.claim_jackpot(round_id, winners).await
    }

    async fn award_jackpot(&self, round_id: u64, ticket_id: &str, amount: u64) -> KenoResult<bool> {
        self.check("award_jackpot")?;
        self.inner.award_jackpot(round_id, ticket_id, amount).await
    }

    async fn mark_unsettled(&self, entry: &UnsettledRound) -> KenoResult<()> {
        self.check("mark_unsettled")?;
        self.inner.mark_unsettled(entry).await
    }

    async fn unsettled_rounds(&self) -> KenoResult<Vec<UnsettledRound>> {
        self.check("unsettled_rounds")?;
        self.inner.unsettled_rounds().await
    }

    async fn clear_unsettled(&self, round_id: u64) -> KenoResult<()> {
        self.check("clear_unsettled")?;
        self.inner.clear_unsettled(round_id).await
    }
}

/// A running round whose winning set is `numbers` with `revealed` already shown.
pub fn running_round(id: u64, numbers: WinningSet, revealed: u8, last_activity_time: u64) -> Round {
    Round {
        id,
        status: RoundStatus::Running,
        cutoff_time: last_activity_time,
        winning_numbers: Some(numbers),
        revealed_count: revealed,
        bets_closed: true,
        last_activity_time,
        created_at: last_activity_time,
    }
}
