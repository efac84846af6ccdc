//! Round settlement
//!
//! Pays every pending ticket of a round against the final winning set. Each
//! ticket moves out of `pending` together with its balance credit, so a pass
//! interrupted at any point can simply be run again.

use crate::config::GameConfig;
use crate::errors::KenoResult;
use crate::game::paytable::Paytable;
use crate::game::types::{Ticket, TicketOutcome, TicketStatus, WinningSet};
use crate::stats::{JackpotPayout, StatsLedger};
use crate::store::KenoStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Totals for one settlement pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub round_id: u64,
    /// Tickets moved out of `pending` by this pass
    pub settled: u64,
    /// Tickets found already won/lost
    pub already_settled: u64,
    /// Tickets skipped because their stored data is unusable
    pub malformed: u64,
    pub staked: u64,
    pub paid_out: u64,
    pub jackpot: JackpotPayout,
}

/// Hits and win for one ticket.
pub fn ticket_outcome(ticket: &Ticket, drawn: &[bool; 256], paytable: &Paytable) -> TicketOutcome {
    let hits = ticket.hits_against(drawn);
    let win = paytable.payout(ticket.stake, ticket.numbers.len() as u8, hits);
    TicketOutcome::new(hits, win)
}

pub struct SettlementEngine {
    store: Arc<dyn KenoStore>,
    rules: GameConfig,
    ledger: StatsLedger,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn KenoStore>, rules: GameConfig, ledger: StatsLedger) -> Self {
        Self { store, rules, ledger }
    }

    /// Settle all pending tickets of `round_id`. Safe to call repeatedly for the
    /// same round; already settled tickets are counted and skipped.
    pub async fn settle_round(&self, round_id: u64, numbers: &WinningSet) -> KenoResult<SettlementReport> {
        let tickets = self.store.tickets_for_round(round_id).await?;
        let drawn = numbers.mask();
        let mut report = SettlementReport {
            round_id,
            ..Default::default()
        };
        let mut valid: Vec<&Ticket> = Vec::with_capacity(tickets.len());

        for ticket in &tickets {
            if let Err(e) = ticket.validate(round_id, &self.rules) {
                warn!(round_id, error = %e, "Skipping malformed ticket");
                report.malformed += 1;
                continue;
            }
            valid.push(ticket);

            if ticket.status != TicketStatus::Pending {
                report.already_settled += 1;
                continue;
            }

            let outcome = ticket_outcome(ticket, &drawn, &self.rules.paytable);
            if self.store.settle_ticket(round_id, &ticket.id, &outcome).await? {
                debug!(
                    round_id,
                    ticket_id = %ticket.id,
                    user_id = %ticket.user_id,
                    hits = outcome.hits,
                    win = outcome.win_amount,
                    "Ticket settled"
                );
                report.settled += 1;
                report.staked = report.staked.saturating_add(ticket.stake);
                report.paid_out = report.paid_out.saturating_add(outcome.win_amount);
            } else {
                report.already_settled += 1;
            }
        }

        report.jackpot = self.ledger.close_round(round_id, &valid, &drawn, report.settled).await?;

        info!(
            round_id,
            settled = report.settled,
            already_settled = report.already_settled,
            malformed = report.malformed,
            staked = report.staked,
            paid_out = report.paid_out,
            "Round settled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JackpotConfig;
    use crate::game::Round;
    use crate::store::MemoryStore;

    fn rules() -> GameConfig {
        GameConfig {
            draw_size: 5,
            paytable: Paytable::from_rows(&[(3, &[(2, 2.0), (3, 10.0)]), (2, &[(1, 1.0), (2, 5.0)])]),
            ..GameConfig::default()
        }
    }

    async fn seeded_store(rules: &GameConfig) -> (Arc<MemoryStore>, WinningSet) {
        let store = Arc::new(MemoryStore::new());
        store.create_round(&Round::new_waiting(1, 0, 1_000)).await.unwrap();
        store.adjust_balance("alice", 1_000).await.unwrap();
        store.adjust_balance("bob", 1_000).await.unwrap();

        let a = Ticket::new("a".into(), "alice".into(), 1, vec![1, 2, 3], 100, 10);
        let b = Ticket::new("b".into(), "bob".into(), 1, vec![4, 5], 50, 10);
        store.commit_bet(&a, 10).await.unwrap();
        store.commit_bet(&b, 10).await.unwrap();

        let set = WinningSet::new(vec![1, 2, 3, 6, 7], rules).unwrap();
        store.begin_draw(1, &set, 1_000).await.unwrap();
        (store, set)
    }

    fn engine(store: Arc<MemoryStore>, rules: GameConfig) -> SettlementEngine {
        let ledger = StatsLedger::new(store.clone(), JackpotConfig::default());
        SettlementEngine::new(store, rules, ledger)
    }

    #[test]
    fn test_ticket_outcome() {
        let rules = rules();
        let set = WinningSet::new(vec![1, 2, 3, 6, 7], &rules).unwrap();
        let a = Ticket::new("a".into(), "alice".into(), 1, vec![1, 2, 3], 100, 0);
        let b = Ticket::new("b".into(), "bob".into(), 1, vec![4, 5], 50, 0);

        let out = ticket_outcome(&a, &set.mask(), &rules.paytable);
        assert_eq!((out.hits, out.win_amount, out.status), (3, 1_000, TicketStatus::Won));
        let out = ticket_outcome(&b, &set.mask(), &rules.paytable);
        assert_eq!((out.hits, out.win_amount, out.status), (0, 0, TicketStatus::Lost));
    }

    #[tokio::test]
    async fn test_settle_round_credits_winners() {
        let rules = rules();
        let (store, set) = seeded_store(&rules).await;
        let engine = engine(store.clone(), rules);

        let report = engine.settle_round(1, &set).await.unwrap();
        assert_eq!(report.settled, 2);
        assert_eq!(report.staked, 150);
        assert_eq!(report.paid_out, 1_000);
        assert_eq!(store.balance("alice").await.unwrap(), 1_900);
        assert_eq!(store.balance("bob").await.unwrap(), 950);
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let rules = rules();
        let (store, set) = seeded_store(&rules).await;
        let engine = engine(store.clone(), rules);

        engine.settle_round(1, &set).await.unwrap();
        let again = engine.settle_round(1, &set).await.unwrap();
        assert_eq!(again.settled, 0);
        assert_eq!(again.already_settled, 2);
        assert_eq!(store.balance("alice").await.unwrap(), 1_900);

        let stats = store.load_stats().await.unwrap();
        assert_eq!(stats.total_staked, 150);
        assert_eq!(stats.total_paid_out, 1_000);
        assert_eq!(stats.rounds_settled, 1);
    }

    #[tokio::test]
    async fn test_malformed_ticket_is_skipped() {
        let rules = rules();
        let (store, set) = seeded_store(&rules).await;
        let bad = Ticket::new("bad".into(), "carol".into(), 1, vec![2, 2, 90], 10, 10);
        store.insert_ticket_unchecked(bad).await;
        let engine = engine(store.clone(), rules);

        let report = engine.settle_round(1, &set).await.unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.settled, 2);
        assert_eq!(store.balance("carol").await.unwrap(), 0);
    }
}
