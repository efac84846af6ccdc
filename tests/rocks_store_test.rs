//! RocksDB store: persistence across reopen and tolerance of bad records

use keno::config::GameConfig;
use keno::errors::{BetError, KenoError};
use keno::game::{HistoryEntry, Round, RoundStatus, Ticket, TicketOutcome, TicketStatus, WinningSet};
use keno::store::{KenoStore, RocksStore};
use tempfile::TempDir;

fn draw(rules: &GameConfig) -> WinningSet {
    WinningSet::new((41..=60).collect(), rules).unwrap()
}

#[tokio::test]
async fn test_round_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let rules = GameConfig::default();
    let set = draw(&rules);

    {
        let store = RocksStore::open(dir.path(), false).unwrap();
        store.create_round(&Round::new_waiting(1, 0, 1_000)).await.unwrap();
        store.adjust_balance("alice", 500).await.unwrap();
        let ticket = Ticket::new("t1".into(), "alice".into(), 1, vec![41, 42, 43], 100, 10);
        assert_eq!(store.commit_bet(&ticket, 10).await.unwrap(), 400);
        store.begin_draw(1, &set, 1_000).await.unwrap();
        store.record_reveal(1, 6, 1_100).await.unwrap();
    }

    let store = RocksStore::open(dir.path(), false).unwrap();
    let round = store.load_round().await.unwrap().unwrap();
    assert_eq!(round.id, 1);
    assert_eq!(round.status, RoundStatus::Running);
    assert_eq!(round.winning_numbers, Some(set.clone()));
    assert_eq!(round.revealed_count, 6);
    assert_eq!(round.revealed(), &set.as_slice()[..6]);
    assert_eq!(store.balance("alice").await.unwrap(), 400);

    // Settlement of the reopened round pays once
    let outcome = TicketOutcome::new(3, 4_000);
    assert!(store.settle_ticket(1, "t1", &outcome).await.unwrap());
    assert!(!store.settle_ticket(1, "t1", &outcome).await.unwrap());
    assert_eq!(store.balance("alice").await.unwrap(), 4_400);

    let stats = store.load_stats().await.unwrap();
    assert_eq!(stats.total_staked, 100);
    assert_eq!(stats.total_paid_out, 4_000);
    assert_eq!(stats.tickets_settled, 1);
}

#[tokio::test]
async fn test_clear_on_open_wipes_state() {
    let dir = TempDir::new().unwrap();
    {
        let store = RocksStore::open(dir.path(), false).unwrap();
        store.create_round(&Round::new_waiting(4, 0, 1_000)).await.unwrap();
    }
    let store = RocksStore::open(dir.path(), true).unwrap();
    assert!(store.load_round().await.unwrap().is_none());
}

#[tokio::test]
async fn test_undecodable_ticket_is_skipped() {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path(), false).unwrap();
    store.create_round(&Round::new_waiting(1, 0, 1_000)).await.unwrap();
    store.adjust_balance("bob", 100).await.unwrap();
    let ticket = Ticket::new("ok".into(), "bob".into(), 1, vec![1, 2], 10, 5);
    store.commit_bet(&ticket, 5).await.unwrap();
    store
        .put_raw(b"ticket:00000000000000000001:junk", b"{not json")
        .unwrap();

    let tickets = store.tickets_for_round(1).await.unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].id, "ok");
    assert_eq!(tickets[0].status, TicketStatus::Pending);
}

#[tokio::test]
async fn test_commit_checks_round_and_balance() {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path(), false).unwrap();
    store.create_round(&Round::new_waiting(2, 0, 1_000)).await.unwrap();
    store.adjust_balance("carol", 50).await.unwrap();

    let poor = Ticket::new("a".into(), "carol".into(), 2, vec![7], 80, 5);
    let err = store.commit_bet(&poor, 5).await.unwrap_err();
    assert!(matches!(err, KenoError::Bet(BetError::InsufficientFunds { balance: 50, stake: 80 })));

    let late = Ticket::new("b".into(), "carol".into(), 2, vec![7], 10, 1_000);
    let err = store.commit_bet(&late, 1_000).await.unwrap_err();
    assert!(matches!(err, KenoError::Bet(BetError::RoundClosed { round_id: 2 })));

    let stale = Ticket::new("c".into(), "carol".into(), 1, vec![7], 10, 5);
    assert!(store.commit_bet(&stale, 5).await.is_err());

    assert_eq!(store.balance("carol").await.unwrap(), 50);
    assert!(store.tickets_for_round(2).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_round_stays_closed_after_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = RocksStore::open(dir.path(), false).unwrap();
        store.create_round(&Round::new_waiting(1, 0, 1_000)).await.unwrap();
        store.adjust_balance("dan", 100).await.unwrap();
        let early = Ticket::new("e".into(), "dan".into(), 1, vec![9, 10], 20, 500);
        store.commit_bet(&early, 500).await.unwrap();

        let snapshot = store.close_bets(1, 1_000).await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    let store = RocksStore::open(dir.path(), false).unwrap();
    assert!(store.load_round().await.unwrap().unwrap().bets_closed);
    let stale = Ticket::new("s".into(), "dan".into(), 1, vec![11], 20, 999);
    let err = store.commit_bet(&stale, 999).await.unwrap_err();
    assert!(matches!(err, KenoError::Bet(BetError::RoundClosed { round_id: 1 })));
    assert_eq!(store.balance("dan").await.unwrap(), 80);
    assert_eq!(store.close_bets(1, 1_200).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_is_bounded_and_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path(), false).unwrap();

    for round_id in 1..=8u64 {
        let entry = HistoryEntry {
            round_id,
            winning_numbers: vec![round_id as u8],
            finished_at: round_id * 1_000,
        };
        store.archive_round(&entry, 5).await.unwrap();
    }

    let history = store.recent_history(20).await.unwrap();
    let ids: Vec<u64> = history.iter().map(|e| e.round_id).collect();
    assert_eq!(ids, vec![8, 7, 6, 5, 4]);
    assert_eq!(store.recent_history(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_jackpot_and_unsettled_persist() {
    let dir = TempDir::new().unwrap();
    let rules = GameConfig::default();
    {
        let store = RocksStore::open(dir.path(), false).unwrap();
        assert_eq!(store.contribute_jackpot(3, 250).await.unwrap().contributed, Some(250));
        assert_eq!(store.contribute_jackpot(3, 400).await.unwrap().contributed, Some(250));
        // An older round settled late still feeds the pool
        assert_eq!(store.contribute_jackpot(2, 50).await.unwrap().contributed, Some(50));
        assert_eq!(store.claim_jackpot(2, 3).await.unwrap(), 100);
        store
            .mark_unsettled(&keno::game::UnsettledRound {
                round_id: 3,
                winning_numbers: draw(&rules),
                attempts: 3,
                last_error: "store unavailable".to_string(),
                recorded_at: 9,
            })
            .await
            .unwrap();
    }

    let store = RocksStore::open(dir.path(), false).unwrap();
    assert_eq!(store.jackpot().await.unwrap().pool, 0);
    assert_eq!(store.claim_jackpot(2, 1).await.unwrap(), 100);
    assert_eq!(store.jackpot_round(3).unwrap().contributed, Some(250));
    assert_eq!(store.jackpot_round(3).unwrap().share, None);
    let unsettled = store.unsettled_rounds().await.unwrap();
    assert_eq!(unsettled.len(), 1);
    assert_eq!(unsettled[0].attempts, 3);

    store.clear_unsettled(3).await.unwrap();
    assert!(store.unsettled_rounds().await.unwrap().is_empty());
}
