//! Statistics ledger and progressive jackpot
//!
//! Per-ticket stake/payout totals are added by the store inside each ticket's
//! settlement write. The ledger adds the per-round pieces on top: the settled
//! round counter and the jackpot contribution, claim and awards.

use crate::config::JackpotConfig;
use crate::errors::KenoResult;
use crate::game::{AggregateStats, Ticket};
use crate::store::KenoStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Jackpot activity for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JackpotPayout {
    pub contributed: u64,
    pub winners: u64,
    pub share: u64,
    pub pool_after: u64,
}

/// Read model for `/stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub totals: AggregateStats,
    pub implied_rtp: f64,
    pub jackpot_pool: u64,
}

#[derive(Clone)]
pub struct StatsLedger {
    store: Arc<dyn KenoStore>,
    jackpot: JackpotConfig,
}

impl StatsLedger {
    pub fn new(store: Arc<dyn KenoStore>, jackpot: JackpotConfig) -> Self {
        Self { store, jackpot }
    }

    pub async fn snapshot(&self) -> KenoResult<StatsSnapshot> {
        let totals = self.store.load_stats().await?;
        let jackpot = self.store.jackpot().await?;
        Ok(StatsSnapshot {
            implied_rtp: totals.implied_rtp(),
            totals,
            jackpot_pool: jackpot.pool,
        })
    }

    /// Amount a round's total stake feeds into the pool.
    pub fn contribution(&self, round_stake: u64) -> u64 {
        let amount = round_stake as u128 * self.jackpot.contribution_bps as u128 / 10_000;
        u64::try_from(amount).unwrap_or(u64::MAX)
    }

    /// Whether a ticket with `hits` hits takes a jackpot share.
    pub fn qualifies(&self, ticket: &Ticket, hits: u8) -> bool {
        let picks = ticket.numbers.len();
        picks >= self.jackpot.min_picks as usize && hits as usize == picks
    }

    /// Per-round bookkeeping once every ticket of the round is settled.
    /// `newly_settled` is how many tickets the calling pass moved out of pending.
    pub async fn close_round(
        &self,
        round_id: u64,
        tickets: &[&Ticket],
        drawn: &[bool; 256],
        newly_settled: u64,
    ) -> KenoResult<JackpotPayout> {
        if newly_settled > 0 {
            self.store
                .add_stats(AggregateStats {
                    rounds_settled: 1,
                    ..Default::default()
                })
                .await?;
        }

        if !self.jackpot.enabled() {
            return Ok(JackpotPayout::default());
        }

        let round_stake = tickets.iter().fold(0u64, |acc, t| acc.saturating_add(t.stake));
        let amount = self.contribution(round_stake);
        let mut contributed = 0;
        if amount > 0 {
            let record = self.store.contribute_jackpot(round_id, amount).await?;
            contributed = record.contributed.unwrap_or(0);
        }

        let winners: Vec<&Ticket> = tickets
            .iter()
            .copied()
            .filter(|t| self.qualifies(t, t.hits_against(drawn)))
            .collect();

        let mut share = 0;
        if !winners.is_empty() {
            share = self.store.claim_jackpot(round_id, winners.len() as u64).await?;
            if share > 0 {
                for ticket in &winners {
                    if self.store.award_jackpot(round_id, &ticket.id, share).await? {
                        info!(round_id, ticket_id = %ticket.id, user_id = %ticket.user_id, share, "Jackpot awarded");
                    }
                }
            }
        }

        let pool_after = self.store.jackpot().await?.pool;
        Ok(JackpotPayout {
            contributed,
            winners: winners.len() as u64,
            share,
            pool_after,
        })
    }
}
