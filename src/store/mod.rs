//! Persistent store interface
//!
//! The engine never does read-modify-write against a stale snapshot: every
//! operation that checks and mutates state (bet commit, settlement, balance
//! and counter updates, phase transitions) is a single atomic call here.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::errors::KenoResult;
use crate::game::{
    AggregateStats, HistoryEntry, JackpotRound, JackpotState, Round, RoundStatus, Ticket,
    TicketOutcome, UnsettledRound, WinningSet,
};
use async_trait::async_trait;

#[async_trait]
pub trait KenoStore: Send + Sync {
    /// The current round, if any has been created
    async fn load_round(&self) -> KenoResult<Option<Round>>;

    /// Replace the current round with a new waiting round. Only allowed when
    /// there is none, or the current one is finished and `round.id` follows it.
    async fn create_round(&self, round: &Round) -> KenoResult<()>;

    /// Stop admitting tickets to the waiting round and return every ticket
    /// bound to it, as one unit: no ticket can commit after the snapshot.
    async fn close_bets(&self, round_id: u64, now: u64) -> KenoResult<Vec<Ticket>>;

    /// `waiting -> running`, persisting the full winning set in the same write.
    async fn begin_draw(&self, round_id: u64, numbers: &WinningSet, now: u64) -> KenoResult<Round>;

    /// Move the reveal cursor of the running round to `revealed_count`.
    async fn record_reveal(&self, round_id: u64, revealed_count: u8, now: u64) -> KenoResult<Round>;

    /// `running -> calculating` or `calculating -> finished`.
    async fn set_round_status(&self, round_id: u64, status: RoundStatus, now: u64) -> KenoResult<Round>;

    /// Admit a ticket: the round must be current, waiting and before cutoff,
    /// and the balance must cover the stake. Debit and insert happen together.
    /// Returns the balance after the debit.
    async fn commit_bet(&self, ticket: &Ticket, now: u64) -> KenoResult<u64>;

    async fn tickets_for_round(&self, round_id: u64) -> KenoResult<Vec<Ticket>>;

    /// Move a pending ticket to won/lost, credit its win and add its stake and
    /// win to the aggregate totals, all in one unit. Returns `false` when the
    /// ticket was already settled.
    async fn settle_ticket(&self, round_id: u64, ticket_id: &str, outcome: &TicketOutcome) -> KenoResult<bool>;

    async fn balance(&self, user_id: &str) -> KenoResult<u64>;

    /// Atomic increment/decrement. Fails without change if the result would be negative.
    async fn adjust_balance(&self, user_id: &str, delta: i64) -> KenoResult<u64>;

    /// Add `delta` to the lifetime totals and return the new totals.
    async fn add_stats(&self, delta: AggregateStats) -> KenoResult<AggregateStats>;

    async fn load_stats(&self) -> KenoResult<AggregateStats>;

    /// Append a finished round, keeping only the newest `keep` entries.
    async fn archive_round(&self, entry: &HistoryEntry, keep: usize) -> KenoResult<()>;

    /// Newest first
    async fn recent_history(&self, limit: usize) -> KenoResult<Vec<HistoryEntry>>;

    async fn jackpot(&self) -> KenoResult<JackpotState>;

    /// Add a round's contribution to the pool once, whatever order rounds
    /// close in. Returns the round's record with the amount actually added.
    async fn contribute_jackpot(&self, round_id: u64, amount: u64) -> KenoResult<JackpotRound>;

    /// Take the pool for `round_id`, split across `winners`. Repeated calls for
    /// the same round return the share fixed by the first call.
    async fn claim_jackpot(&self, round_id: u64, winners: u64) -> KenoResult<u64>;

    /// Credit a jackpot share to a ticket's owner once, counting it as paid out.
    async fn award_jackpot(&self, round_id: u64, ticket_id: &str, amount: u64) -> KenoResult<bool>;

    async fn mark_unsettled(&self, entry: &UnsettledRound) -> KenoResult<()>;

    async fn unsettled_rounds(&self) -> KenoResult<Vec<UnsettledRound>>;

    async fn clear_unsettled(&self, round_id: u64) -> KenoResult<()>;
}

/// Apply a signed delta to a balance, refusing to go below zero.
pub(crate) fn apply_delta(balance: u64, delta: i64) -> Option<u64> {
    if delta >= 0 {
        Some(balance.saturating_add(delta as u64))
    } else {
        balance.checked_sub(delta.unsigned_abs())
    }
}

pub(crate) fn merge_stats(current: AggregateStats, delta: AggregateStats) -> AggregateStats {
    AggregateStats {
        total_staked: current.total_staked.saturating_add(delta.total_staked),
        total_paid_out: current.total_paid_out.saturating_add(delta.total_paid_out),
        tickets_settled: current.tickets_settled.saturating_add(delta.tickets_settled),
        rounds_settled: current.rounds_settled.saturating_add(delta.rounds_settled),
    }
}

/// Shared contribution rule for both backends. Returns whether anything
/// changed and must be written.
pub(crate) fn contribute(state: &mut JackpotState, record: &mut JackpotRound, amount: u64) -> bool {
    if record.contributed.is_some() {
        return false;
    }
    state.pool = state.pool.saturating_add(amount);
    record.contributed = Some(amount);
    true
}

/// Shared claim rule for both backends. Returns the round's share and whether
/// anything changed and must be written.
pub(crate) fn claim_share(state: &mut JackpotState, record: &mut JackpotRound, winners: u64) -> (u64, bool) {
    if let Some(share) = record.share {
        return (share, false);
    }
    if winners == 0 {
        return (0, false);
    }
    let share = state.pool / winners;
    state.pool -= share * winners;
    record.share = Some(share);
    (share, true)
}
