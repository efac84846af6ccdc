//! In-memory store: one async mutex around all state.

use super::{apply_delta, claim_share, contribute, merge_stats, KenoStore};
use crate::errors::{BetError, KenoResult, RoundError, StorageError};
use crate::game::{
    AggregateStats, HistoryEntry, JackpotRound, JackpotState, Round, RoundStatus, Ticket,
    TicketOutcome, TicketStatus, UnsettledRound, WinningSet,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    round: Option<Round>,
    /// round id -> ticket id -> ticket
    tickets: BTreeMap<u64, BTreeMap<String, Ticket>>,
    accounts: HashMap<String, u64>,
    stats: AggregateStats,
    /// newest first
    history: VecDeque<HistoryEntry>,
    jackpot: JackpotState,
    jackpot_rounds: BTreeMap<u64, JackpotRound>,
    unsettled: BTreeMap<u64, UnsettledRound>,
}

impl MemoryState {
    fn current_round(&mut self, round_id: u64) -> KenoResult<&mut Round> {
        match self.round.as_mut() {
            Some(round) if round.id == round_id => Ok(round),
            other => Err(RoundError::NotCurrent {
                expected: round_id,
                found: other.map(|r| r.id),
            }
            .into()),
        }
    }

    fn ticket_mut(&mut self, round_id: u64, ticket_id: &str) -> KenoResult<&mut Ticket> {
        self.tickets
            .get_mut(&round_id)
            .and_then(|tickets| tickets.get_mut(ticket_id))
            .ok_or_else(|| {
                StorageError::ReadFailed(format!("ticket {} not found in round {}", ticket_id, round_id)).into()
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a ticket without admission checks or debit. Used to load
    /// tickets recorded elsewhere.
    pub async fn insert_ticket_unchecked(&self, ticket: Ticket) {
        let mut state = self.state.lock().await;
        state
            .tickets
            .entry(ticket.round_id)
            .or_default()
            .insert(ticket.id.clone(), ticket);
    }

    /// Overwrite the current round record as-is.
    pub async fn put_round_unchecked(&self, round: Round) {
        self.state.lock().await.round = Some(round);
    }
}

#[async_trait]
impl KenoStore for MemoryStore {
    async fn load_round(&self) -> KenoResult<Option<Round>> {
        Ok(self.state.lock().await.round.clone())
    }

    async fn create_round(&self, round: &Round) -> KenoResult<()> {
        let mut state = self.state.lock().await;
        Round::check_successor(state.round.as_ref(), round)?;
        state.round = Some(round.clone());
        Ok(())
    }

    async fn close_bets(&self, round_id: u64, now: u64) -> KenoResult<Vec<Ticket>> {
        let mut state = self.state.lock().await;
        state.current_round(round_id)?.close_bets(now)?;
        Ok(state
            .tickets
            .get(&round_id)
            .map(|tickets| tickets.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn begin_draw(&self, round_id: u64, numbers: &WinningSet, now: u64) -> KenoResult<Round> {
        let mut state = self.state.lock().await;
        let round = state.current_round(round_id)?;
        round.begin_draw(numbers.clone(), now)?;
        Ok(round.clone())
    }

    async fn record_reveal(&self, round_id: u64, revealed_count: u8, now: u64) -> KenoResult<Round> {
        let mut state = self.state.lock().await;
        let round = state.current_round(round_id)?;
        round.advance_reveal(revealed_count, now)?;
        Ok(round.clone())
    }

    async fn set_round_status(&self, round_id: u64, status: RoundStatus, now: u64) -> KenoResult<Round> {
        let mut state = self.state.lock().await;
        let round = state.current_round(round_id)?;
        round.transition(status, now)?;
        Ok(round.clone())
    }

    async fn commit_bet(&self, ticket: &Ticket, now: u64) -> KenoResult<u64> {
        let mut state = self.state.lock().await;
        match state.round.as_ref() {
            Some(round) => round.admit_bet(ticket.round_id, now)?,
            None => return Err(BetError::NoActiveRound.into()),
        }
        let balance = state.accounts.get(&ticket.user_id).copied().unwrap_or(0);
        if balance < ticket.stake {
            return Err(BetError::InsufficientFunds {
                balance,
                stake: ticket.stake,
            }
            .into());
        }
        let remaining = balance - ticket.stake;
        state.accounts.insert(ticket.user_id.clone(), remaining);
        state
            .tickets
            .entry(ticket.round_id)
            .or_default()
            .insert(ticket.id.clone(), ticket.clone());
        Ok(remaining)
    }

    async fn tickets_for_round(&self, round_id: u64) -> KenoResult<Vec<Ticket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .get(&round_id)
            .map(|tickets| tickets.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn settle_ticket(&self, round_id: u64, ticket_id: &str, outcome: &TicketOutcome) -> KenoResult<bool> {
        let mut state = self.state.lock().await;
        let ticket = state.ticket_mut(round_id, ticket_id)?;
        if ticket.status != TicketStatus::Pending {
            return Ok(false);
        }
        ticket.apply_outcome(outcome);
        let user_id = ticket.user_id.clone();
        let stake = ticket.stake;

        let balance = state.accounts.entry(user_id).or_insert(0);
        *balance = balance.saturating_add(outcome.win_amount);
        state.stats = merge_stats(
            state.stats,
            AggregateStats {
                total_staked: stake,
                total_paid_out: outcome.win_amount,
                tickets_settled: 1,
                rounds_settled: 0,
            },
        );
        Ok(true)
    }

    async fn balance(&self, user_id: &str) -> KenoResult<u64> {
        Ok(self.state.lock().await.accounts.get(user_id).copied().unwrap_or(0))
    }

    async fn adjust_balance(&self, user_id: &str, delta: i64) -> KenoResult<u64> {
        let mut state = self.state.lock().await;
        let balance = state.accounts.get(user_id).copied().unwrap_or(0);
        let updated = apply_delta(balance, delta).ok_or(BetError::InsufficientFunds {
            balance,
            stake: delta.unsigned_abs(),
        })?;
        state.accounts.insert(user_id.to_string(), updated);
        Ok(updated)
    }

    async fn add_stats(&self, delta: AggregateStats) -> KenoResult<AggregateStats> {
        let mut state = self.state.lock().await;
        state.stats = merge_stats(state.stats, delta);
        Ok(state.stats)
    }

    async fn load_stats(&self) -> KenoResult<AggregateStats> {
        Ok(self.state.lock().await.stats)
    }

    async fn archive_round(&self, entry: &HistoryEntry, keep: usize) -> KenoResult<()> {
        let mut state = self.state.lock().await;
        state.history.retain(|e| e.round_id != entry.round_id);
        state.history.push_front(entry.clone());
        state.history.truncate(keep);
        Ok(())
    }

    async fn recent_history(&self, limit: usize) -> KenoResult<Vec<HistoryEntry>> {
        let state = self.state.lock().await;
        Ok(state.history.iter().take(limit).cloned().collect())
    }

    async fn jackpot(&self) -> KenoResult<JackpotState> {
        Ok(self.state.lock().await.jackpot)
    }

    async fn contribute_jackpot(&self, round_id: u64, amount: u64) -> KenoResult<JackpotRound> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state
            .jackpot_rounds
            .entry(round_id)
            .or_insert_with(|| JackpotRound::new(round_id));
        contribute(&mut state.jackpot, record, amount);
        Ok(*record)
    }

    async fn claim_jackpot(&self, round_id: u64, winners: u64) -> KenoResult<u64> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state
            .jackpot_rounds
            .entry(round_id)
            .or_insert_with(|| JackpotRound::new(round_id));
        Ok(claim_share(&mut state.jackpot, record, winners).0)
    }

    async fn award_jackpot(&self, round_id: u64, ticket_id: &str, amount: u64) -> KenoResult<bool> {
        let mut state = self.state.lock().await;
        let ticket = state.ticket_mut(round_id, ticket_id)?;
        if ticket.jackpot_amount > 0 || amount == 0 {
            return Ok(false);
        }
        ticket.jackpot_amount = amount;
        let user_id = ticket.user_id.clone();

        let balance = state.accounts.entry(user_id).or_insert(0);
        *balance = balance.saturating_add(amount);
        state.stats = merge_stats(
            state.stats,
            AggregateStats {
                total_paid_out: amount,
                ..Default::default()
            },
        );
        Ok(true)
    }

    async fn mark_unsettled(&self, entry: &UnsettledRound) -> KenoResult<()> {
        let mut state = self.state.lock().await;
        state.unsettled.insert(entry.round_id, entry.clone());
        Ok(())
    }

    async fn unsettled_rounds(&self) -> KenoResult<Vec<UnsettledRound>> {
        Ok(self.state.lock().await.unsettled.values().cloned().collect())
    }

    async fn clear_unsettled(&self, round_id: u64) -> KenoResult<()> {
        self.state.lock().await.unsettled.remove(&round_id);
        Ok(())
    }
}
