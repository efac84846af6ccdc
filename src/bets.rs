//! Bet placement and player accounts
//!
//! Late bets are refused, never deferred: a ticket only commits while the
//! stored current round is `waiting`, open for bets and before its cutoff,
//! checked inside the store's commit. The engine shuts betting in the same
//! store call that snapshots the round's tickets for the draw.

use crate::clock::Clock;
use crate::config::GameConfig;
use crate::errors::{BetError, KenoError, KenoResult};
use crate::game::{validate_picks, Ticket};
use crate::metrics::KenoMetrics;
use crate::store::KenoStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub user_id: String,
    pub numbers: Vec<u8>,
    pub stake: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetReceipt {
    pub ticket_id: String,
    pub round_id: u64,
    /// Balance after the stake was debited
    pub balance: u64,
}

#[derive(Clone)]
pub struct BetService {
    store: Arc<dyn KenoStore>,
    clock: Arc<dyn Clock>,
    rules: GameConfig,
    metrics: Arc<KenoMetrics>,
}

impl BetService {
    pub fn new(store: Arc<dyn KenoStore>, clock: Arc<dyn Clock>, rules: GameConfig, metrics: Arc<KenoMetrics>) -> Self {
        Self {
            store,
            clock,
            rules,
            metrics,
        }
    }

    pub async fn place_bet(&self, request: BetRequest) -> KenoResult<BetReceipt> {
        let result = self.try_place_bet(request).await;
        match &result {
            Ok(_) => self.metrics.bets_accepted.inc(),
            Err(KenoError::Bet(reason)) => self.metrics.record_rejection(reason.code()),
            Err(_) => {}
        }
        result
    }

    async fn try_place_bet(&self, request: BetRequest) -> KenoResult<BetReceipt> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(BetError::InvalidUser.into());
        }
        let numbers = validate_picks(&request.numbers, &self.rules)?;
        if request.stake == 0 || request.stake < self.rules.min_stake {
            return Err(BetError::InvalidStake {
                stake: request.stake,
                min: self.rules.min_stake,
            }
            .into());
        }

        let now = self.clock.now_ms();
        let round = self.store.load_round().await?.ok_or(BetError::NoActiveRound)?;
        // Repeated atomically inside commit_bet
        round.admit_bet(round.id, now)?;

        let ticket = Ticket::new(
            Uuid::new_v4().to_string(),
            user_id.to_string(),
            round.id,
            numbers,
            request.stake,
            now,
        );
        let balance = self.store.commit_bet(&ticket, now).await?;

        info!(
            round_id = ticket.round_id,
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            picks = ticket.numbers.len(),
            stake = ticket.stake,
            "Bet accepted"
        );
        Ok(BetReceipt {
            ticket_id: ticket.id,
            round_id: ticket.round_id,
            balance,
        })
    }

    /// Credit funds to a player. Administrative path; there is no payment rail.
    pub async fn deposit(&self, user_id: &str, amount: u64) -> KenoResult<u64> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(BetError::InvalidUser.into());
        }
        let delta = i64::try_from(amount)
            .ok()
            .filter(|a| *a > 0)
            .ok_or(BetError::InvalidStake { stake: amount, min: 1 })?;
        let balance = self.store.adjust_balance(user_id, delta).await?;
        debug!(user_id, amount, balance, "Deposit credited");
        Ok(balance)
    }

    pub async fn balance(&self, user_id: &str) -> KenoResult<u64> {
        self.store.balance(user_id.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::game::Round;
    use crate::store::MemoryStore;

    async fn service(now: u64) -> (BetService, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        store.create_round(&Round::new_waiting(1, 0, 90_000)).await.unwrap();
        let metrics = Arc::new(KenoMetrics::new().unwrap());
        let service = BetService::new(store.clone(), clock.clone(), GameConfig::default(), metrics);
        (service, store, clock)
    }

    fn bet(user: &str, numbers: Vec<u8>, stake: u64) -> BetRequest {
        BetRequest {
            user_id: user.to_string(),
            numbers,
            stake,
        }
    }

    fn rejection(err: KenoError) -> BetError {
        match err {
            KenoError::Bet(reason) => reason,
            other => panic!("expected bet rejection, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_accepts_and_debits() {
        let (service, store, _) = service(1_000).await;
        service.deposit("alice", 500).await.unwrap();

        let receipt = service.place_bet(bet("alice", vec![30, 4, 17], 200)).await.unwrap();
        assert_eq!(receipt.round_id, 1);
        assert_eq!(receipt.balance, 300);

        let tickets = store.tickets_for_round(1).await.unwrap();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].numbers, vec![4, 17, 30]);
        assert_eq!(tickets[0].id, receipt.ticket_id);
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let (service, _, _) = service(1_000).await;
        service.deposit("bob", 100).await.unwrap();

        let err = rejection(service.place_bet(bet("bob", vec![1, 2], 500)).await.unwrap_err());
        assert_eq!(err, BetError::InsufficientFunds { balance: 100, stake: 500 });

        let err = rejection(service.place_bet(bet("bob", vec![1, 1], 10)).await.unwrap_err());
        assert!(matches!(err, BetError::InvalidNumbers(_)));

        let err = rejection(service.place_bet(bet("bob", vec![1, 2], 0)).await.unwrap_err());
        assert!(matches!(err, BetError::InvalidStake { stake: 0, .. }));

        let err = rejection(service.place_bet(bet("  ", vec![1, 2], 10)).await.unwrap_err());
        assert_eq!(err, BetError::InvalidUser);

        assert_eq!(service.balance("bob").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_late_bet_is_rejected_not_deferred() {
        let (service, store, clock) = service(1_000).await;
        service.deposit("carol", 100).await.unwrap();
        clock.set(90_000);

        let err = rejection(service.place_bet(bet("carol", vec![5], 10)).await.unwrap_err());
        assert_eq!(err, BetError::RoundClosed { round_id: 1 });
        assert_eq!(service.balance("carol").await.unwrap(), 100);
        assert!(store.tickets_for_round(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_round_yet() {
        let store = Arc::new(MemoryStore::new());
        let metrics = Arc::new(KenoMetrics::new().unwrap());
        let service = BetService::new(store, Arc::new(ManualClock::new(0)), GameConfig::default(), metrics);
        let err = rejection(service.place_bet(bet("dan", vec![5], 10)).await.unwrap_err());
        assert_eq!(err, BetError::NoActiveRound);
    }

    #[tokio::test]
    async fn test_deposit_validation() {
        let (service, _, _) = service(0).await;
        assert!(service.deposit("erin", 0).await.is_err());
        assert!(service.deposit("erin", u64::MAX).await.is_err());
        assert_eq!(service.deposit("erin", 25).await.unwrap(), 25);
    }
}
