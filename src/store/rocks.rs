//! RocksDB store
//!
//! Values are JSON. Every mutating call reads, checks and writes under one
//! async write lock and commits through a single `WriteBatch`, so the checks
//! always see the latest state and multi-key updates land together. Unbounded
//! prefix scans run on the blocking pool.

use super::{apply_delta, claim_share, contribute, merge_stats, KenoStore};
use crate::errors::{BetError, KenoError, KenoResult, RoundError, StorageError};
use crate::game::{
    Account, AggregateStats, HistoryEntry, JackpotRound, JackpotState, Round, RoundStatus,
    Ticket, TicketOutcome, TicketStatus, UnsettledRound, WinningSet,
};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const ROUND_KEY: &[u8] = b"round:current";
const STATS_KEY: &[u8] = b"stats:aggregate";
const JACKPOT_KEY: &[u8] = b"jackpot:pool";
const JACKPOT_ROUND_PREFIX: &str = "jackpot:round:";
const TICKET_PREFIX: &str = "ticket:";
const ACCOUNT_PREFIX: &str = "account:";
const HISTORY_PREFIX: &[u8] = b"history:";
const UNSETTLED_PREFIX: &str = "settlement:unsettled:";

fn ticket_prefix(round_id: u64) -> Vec<u8> {
    format!("{}{:020}:", TICKET_PREFIX, round_id).into_bytes()
}

fn ticket_key(round_id: u64, ticket_id: &str) -> Vec<u8> {
    format!("{}{:020}:{}", TICKET_PREFIX, round_id, ticket_id).into_bytes()
}

fn account_key(user_id: &str) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, user_id).into_bytes()
}

fn history_key(round_id: u64) -> Vec<u8> {
    // Inverted id so a forward scan returns newest first
    let inv = u64::MAX - round_id;
    let mut key = Vec::with_capacity(HISTORY_PREFIX.len() + 8);
    key.extend_from_slice(HISTORY_PREFIX);
    key.extend_from_slice(&inv.to_be_bytes());
    key
}

fn unsettled_key(round_id: u64) -> Vec<u8> {
    format!("{}{:020}", UNSETTLED_PREFIX, round_id).into_bytes()
}

fn jackpot_round_key(round_id: u64) -> Vec<u8> {
    format!("{}{:020}", JACKPOT_ROUND_PREFIX, round_id).into_bytes()
}

type Row = (Box<[u8]>, Box<[u8]>);

fn scan(db: &DB, prefix: &[u8], limit: usize) -> KenoResult<Vec<Row>> {
    let mut rows = Vec::new();
    for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
        let (key, value) = item.map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        if !key.starts_with(prefix) || rows.len() >= limit {
            break;
        }
        rows.push((key, value));
    }
    Ok(rows)
}

fn decode_tickets(round_id: u64, rows: Vec<Row>) -> Vec<Ticket> {
    let mut tickets = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        match serde_json::from_slice::<Ticket>(&value) {
            Ok(ticket) => tickets.push(ticket),
            Err(e) => warn!(
                round_id,
                key = %String::from_utf8_lossy(&key),
                error = %e,
                "Skipping undecodable ticket record"
            ),
        }
    }
    tickets
}

pub struct RocksStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open (or create) the database at `path`, wiping it first when `clear` is set.
    pub fn open<P: AsRef<Path>>(path: P, clear: bool) -> KenoResult<Self> {
        let path = path.as_ref();
        if clear && path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| {
                StorageError::DatabaseOpenFailed(format!("clearing {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), "Cleared existing store");
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(32 * 1024 * 1024);
        opts.set_max_write_buffer_number(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)
            .map_err(|e| StorageError::DatabaseOpenFailed(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> KenoResult<Option<T>> {
        let bytes = self
            .db
            .get(key)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(batch: &mut WriteBatch, key: &[u8], value: &T) -> KenoResult<()> {
        batch.put(key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> KenoResult<()> {
        self.db
            .write(batch)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    /// Rows whose key starts with `prefix`, in key order.
    pub fn scan_prefix(&self, prefix: &[u8], limit: usize) -> KenoResult<Vec<Row>> {
        scan(&self.db, prefix, limit)
    }

    /// Every row under `prefix`, read on the blocking pool.
    async fn scan_all(&self, prefix: Vec<u8>) -> KenoResult<Vec<Row>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || scan(&db, &prefix, usize::MAX))
            .await
            .map_err(|e| StorageError::ReadFailed(format!("scan task failed: {}", e)))?
    }

    /// Write raw bytes under `key`, bypassing all checks.
    pub fn put_raw(&self, key: &[u8], value: &[u8]) -> KenoResult<()> {
        self.db
            .put(key, value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()).into())
    }

    fn current_round(&self, round_id: u64) -> KenoResult<Round> {
        match self.get_json::<Round>(ROUND_KEY)? {
            Some(round) if round.id == round_id => Ok(round),
            other => Err(RoundError::NotCurrent {
                expected: round_id,
                found: other.map(|r| r.id),
            }
            .into()),
        }
    }

    fn load_ticket(&self, round_id: u64, ticket_id: &str) -> KenoResult<Ticket> {
        self.get_json(&ticket_key(round_id, ticket_id))?.ok_or_else(|| {
            StorageError::ReadFailed(format!("ticket {} not found in round {}", ticket_id, round_id)).into()
        })
    }

    fn load_balance(&self, user_id: &str) -> KenoResult<u64> {
        Ok(self
            .get_json::<Account>(&account_key(user_id))?
            .map_or(0, |a| a.balance))
    }

    fn put_balance(batch: &mut WriteBatch, user_id: &str, balance: u64) -> KenoResult<()> {
        let account = Account {
            user_id: user_id.to_string(),
            balance,
        };
        Self::put_json(batch, &account_key(user_id), &account)
    }

    fn load_jackpot(&self) -> KenoResult<JackpotState> {
        Ok(self.get_json(JACKPOT_KEY)?.unwrap_or_default())
    }

    /// The jackpot record of `round_id`, empty if the round never touched the pool.
    pub fn jackpot_round(&self, round_id: u64) -> KenoResult<JackpotRound> {
        Ok(self
            .get_json(&jackpot_round_key(round_id))?
            .unwrap_or_else(|| JackpotRound::new(round_id)))
    }

    fn put_jackpot(batch: &mut WriteBatch, state: &JackpotState, record: &JackpotRound) -> KenoResult<()> {
        Self::put_json(batch, JACKPOT_KEY, state)?;
        Self::put_json(batch, &jackpot_round_key(record.round_id), record)
    }

    async fn update_round<F>(&self, round_id: u64, apply: F) -> KenoResult<Round>
    where
        F: FnOnce(&mut Round) -> Result<(), RoundError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut round = self.current_round(round_id)?;
        apply(&mut round)?;
        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, ROUND_KEY, &round)?;
        self.write(batch)?;
        Ok(round)
    }
}

#[async_trait]
impl KenoStore for RocksStore {
    async fn load_round(&self) -> KenoResult<Option<Round>> {
        self.get_json(ROUND_KEY)
    }

    async fn create_round(&self, round: &Round) -> KenoResult<()> {
        let _guard = self.write_lock.lock().await;
        let current: Option<Round> = self.get_json(ROUND_KEY)?;
        Round::check_successor(current.as_ref(), round)?;
        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, ROUND_KEY, round)?;
        self.write(batch)
    }

    async fn close_bets(&self, round_id: u64, now: u64) -> KenoResult<Vec<Ticket>> {
        let _guard = self.write_lock.lock().await;
        let mut round = self.current_round(round_id)?;
        let already_closed = round.bets_closed;
        round.close_bets(now)?;
        if !already_closed {
            let mut batch = WriteBatch::default();
            Self::put_json(&mut batch, ROUND_KEY, &round)?;
            self.write(batch)?;
        }
        let rows = self.scan_all(ticket_prefix(round_id)).await?;
        Ok(decode_tickets(round_id, rows))
    }

    async fn begin_draw(&self, round_id: u64, numbers: &WinningSet, now: u64) -> KenoResult<Round> {
        let numbers = numbers.clone();
        self.update_round(round_id, move |round| round.begin_draw(numbers, now))
            .await
    }

    async fn record_reveal(&self, round_id: u64, revealed_count: u8, now: u64) -> KenoResult<Round> {
        self.update_round(round_id, move |round| round.advance_reveal(revealed_count, now))
            .await
    }

    async fn set_round_status(&self, round_id: u64, status: RoundStatus, now: u64) -> KenoResult<Round> {
        self.update_round(round_id, move |round| round.transition(status, now))
            .await
    }

    async fn commit_bet(&self, ticket: &Ticket, now: u64) -> KenoResult<u64> {
        let _guard = self.write_lock.lock().await;
        match self.get_json::<Round>(ROUND_KEY)? {
            Some(round) => round.admit_bet(ticket.round_id, now)?,
            None => return Err(BetError::NoActiveRound.into()),
        }
        let balance = self.load_balance(&ticket.user_id)?;
        if balance < ticket.stake {
            return Err(BetError::InsufficientFunds {
                balance,
                stake: ticket.stake,
            }
            .into());
        }
        let remaining = balance - ticket.stake;

        let mut batch = WriteBatch::default();
        Self::put_balance(&mut batch, &ticket.user_id, remaining)?;
        Self::put_json(&mut batch, &ticket_key(ticket.round_id, &ticket.id), ticket)?;
        self.write(batch)?;
        Ok(remaining)
    }

    async fn tickets_for_round(&self, round_id: u64) -> KenoResult<Vec<Ticket>> {
        let rows = self.scan_all(ticket_prefix(round_id)).await?;
        Ok(decode_tickets(round_id, rows))
    }

    async fn settle_ticket(&self, round_id: u64, ticket_id: &str, outcome: &TicketOutcome) -> KenoResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut ticket = self.load_ticket(round_id, ticket_id)?;
        if ticket.status != TicketStatus::Pending {
            return Ok(false);
        }
        ticket.apply_outcome(outcome);

        let balance = self.load_balance(&ticket.user_id)?;
        let stats: AggregateStats = self.get_json(STATS_KEY)?.unwrap_or_default();
        let stats = merge_stats(
            stats,
            AggregateStats {
                total_staked: ticket.stake,
                total_paid_out: outcome.win_amount,
                tickets_settled: 1,
                rounds_settled: 0,
            },
        );

        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &ticket_key(round_id, ticket_id), &ticket)?;
        Self::put_balance(&mut batch, &ticket.user_id, balance.saturating_add(outcome.win_amount))?;
        Self::put_json(&mut batch, STATS_KEY, &stats)?;
        self.write(batch)?;
        Ok(true)
    }

    async fn balance(&self, user_id: &str) -> KenoResult<u64> {
        self.load_balance(user_id)
    }

    async fn adjust_balance(&self, user_id: &str, delta: i64) -> KenoResult<u64> {
        let _guard = self.write_lock.lock().await;
        let balance = self.load_balance(user_id)?;
        let updated = apply_delta(balance, delta).ok_or(BetError::InsufficientFunds {
            balance,
            stake: delta.unsigned_abs(),
        })?;
        let mut batch = WriteBatch::default();
        Self::put_balance(&mut batch, user_id, updated)?;
        self.write(batch)?;
        Ok(updated)
    }

    async fn add_stats(&self, delta: AggregateStats) -> KenoResult<AggregateStats> {
        let _guard = self.write_lock.lock().await;
        let stats: AggregateStats = self.get_json(STATS_KEY)?.unwrap_or_default();
        let stats = merge_stats(stats, delta);
        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, STATS_KEY, &stats)?;
        self.write(batch)?;
        Ok(stats)
    }

    async fn load_stats(&self) -> KenoResult<AggregateStats> {
        Ok(self.get_json(STATS_KEY)?.unwrap_or_default())
    }

    async fn archive_round(&self, entry: &HistoryEntry, keep: usize) -> KenoResult<()> {
        let _guard = self.write_lock.lock().await;
        let new_key = history_key(entry.round_id);
        let mut keys: Vec<Vec<u8>> = self
            .scan_all(HISTORY_PREFIX.to_vec())
            .await?
            .into_iter()
            .map(|(key, _)| key.into_vec())
            .filter(|key| *key != new_key)
            .collect();
        keys.push(new_key.clone());
        keys.sort();

        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &new_key, entry)?;
        for stale in keys.iter().skip(keep) {
            batch.delete(stale);
        }
        self.write(batch)
    }

    async fn recent_history(&self, limit: usize) -> KenoResult<Vec<HistoryEntry>> {
        self.scan_prefix(HISTORY_PREFIX, limit)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice::<HistoryEntry>(&value).map_err(KenoError::from))
            .collect()
    }

    async fn jackpot(&self) -> KenoResult<JackpotState> {
        self.load_jackpot()
    }

    async fn contribute_jackpot(&self, round_id: u64, amount: u64) -> KenoResult<JackpotRound> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load_jackpot()?;
        let mut record = self.jackpot_round(round_id)?;
        if contribute(&mut state, &mut record, amount) {
            let mut batch = WriteBatch::default();
            Self::put_jackpot(&mut batch, &state, &record)?;
            self.write(batch)?;
        }
        Ok(record)
    }

    async fn claim_jackpot(&self, round_id: u64, winners: u64) -> KenoResult<u64> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load_jackpot()?;
        let mut record = self.jackpot_round(round_id)?;
        let (share, changed) = claim_share(&mut state, &mut record, winners);
        if changed {
            let mut batch = WriteBatch::default();
            Self::put_jackpot(&mut batch, &state, &record)?;
            self.write(batch)?;
        }
        Ok(share)
    }

    async fn award_jackpot(&self, round_id: u64, ticket_id: &str, amount: u64) -> KenoResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut ticket = self.load_ticket(round_id, ticket_id)?;
        if ticket.jackpot_amount > 0 || amount == 0 {
            return Ok(false);
        }
        ticket.jackpot_amount = amount;

        let balance = self.load_balance(&ticket.user_id)?;
        let stats: AggregateStats = self.get_json(STATS_KEY)?.unwrap_or_default();
        let stats = merge_stats(
            stats,
            AggregateStats {
                total_paid_out: amount,
                ..Default::default()
            },
        );

        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &ticket_key(round_id, ticket_id), &ticket)?;
        Self::put_balance(&mut batch, &ticket.user_id, balance.saturating_add(amount))?;
        Self::put_json(&mut batch, STATS_KEY, &stats)?;
        self.write(batch)?;
        Ok(true)
    }

    async fn mark_unsettled(&self, entry: &UnsettledRound) -> KenoResult<()> {
        let mut batch = WriteBatch::default();
        Self::put_json(&mut batch, &unsettled_key(entry.round_id), entry)?;
        self.write(batch)
    }

    async fn unsettled_rounds(&self) -> KenoResult<Vec<UnsettledRound>> {
        let mut rounds = Vec::new();
        for (key, value) in self.scan_prefix(UNSETTLED_PREFIX.as_bytes(), usize::MAX)? {
            match serde_json::from_slice::<UnsettledRound>(&value) {
                Ok(entry) => rounds.push(entry),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&key),
                    error = %e,
                    "Skipping undecodable unsettled-round record"
                ),
            }
        }
        Ok(rounds)
    }

    async fn clear_unsettled(&self, round_id: u64) -> KenoResult<()> {
        let mut batch = WriteBatch::default();
        batch.delete(unsettled_key(round_id));
        self.write(batch)
    }
}
