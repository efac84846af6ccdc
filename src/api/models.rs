//! Request and response bodies for the HTTP API

use crate::game::{HistoryEntry, Round, RoundStatus, UnsettledRound};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds as a UTC timestamp; out-of-range values map to the epoch.
pub fn timestamp(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Public view of the current round. Only the revealed prefix of the winning
/// set is ever exposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponse {
    pub round_id: u64,
    pub status: RoundStatus,
    pub cutoff_time: u64,
    pub time_remaining_ms: u64,
    pub revealed_count: u8,
    pub revealed: Vec<u8>,
}

impl RoundResponse {
    pub fn from_round(round: &Round, now: u64) -> Self {
        Self {
            round_id: round.id,
            status: round.status,
            cutoff_time: round.cutoff_time,
            time_remaining_ms: round.time_remaining_ms(now),
            revealed_count: round.revealed().len() as u8,
            revealed: round.revealed().to_vec(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub round_id: u64,
    pub winning_numbers: Vec<u8>,
    pub finished_at: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryItem {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            round_id: entry.round_id,
            winning_numbers: entry.winning_numbers,
            finished_at: timestamp(entry.finished_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub rounds: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub user_id: String,
    pub balance: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsettledItem {
    pub round_id: u64,
    pub winning_numbers: Vec<u8>,
    pub attempts: u32,
    pub last_error: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<UnsettledRound> for UnsettledItem {
    fn from(entry: UnsettledRound) -> Self {
        Self {
            round_id: entry.round_id,
            winning_numbers: entry.winning_numbers.as_slice().to_vec(),
            attempts: entry.attempts,
            last_error: entry.last_error,
            recorded_at: timestamp(entry.recorded_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsettledResponse {
    pub rounds: Vec<UnsettledItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::game::WinningSet;

    #[test]
    fn test_round_response_hides_unrevealed_numbers() {
        let rules = GameConfig::default();
        let mut round = Round::new_waiting(9, 0, 100);
        let set = WinningSet::new((61..=80).collect(), &rules).unwrap();
        round.begin_draw(set, 100).unwrap();
        round.advance_reveal(2, 101).unwrap();

        let view = RoundResponse::from_round(&round, 150);
        assert_eq!(view.revealed, vec![61, 62]);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("63"));
        assert!(!json.contains("winning_numbers"));
    }

    #[test]
    fn test_history_item_timestamp() {
        let item = HistoryItem::from(HistoryEntry {
            round_id: 4,
            winning_numbers: vec![1, 2],
            finished_at: 1_700_000_000_000,
        });
        assert_eq!(item.finished_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(timestamp(u64::MAX), DateTime::<Utc>::default());
    }
}
