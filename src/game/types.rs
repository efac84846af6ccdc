use crate::config::GameConfig;
use crate::errors::{BetError, RoundError, SettlementError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round lifecycle phase
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Waiting,
    Running,
    Calculating,
    Finished,
}

impl RoundStatus {
    /// Transitions that may be written with a plain status update.
    /// `Waiting -> Running` is excluded: it only happens through `begin_draw`,
    /// which persists the winning set in the same write.
    fn can_advance_to(self, next: RoundStatus) -> bool {
        matches!(
            (self, next),
            (RoundStatus::Running, RoundStatus::Calculating)
                | (RoundStatus::Calculating, RoundStatus::Finished)
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Waiting => write!(f, "waiting"),
            RoundStatus::Running => write!(f, "running"),
            RoundStatus::Calculating => write!(f, "calculating"),
            RoundStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Decided winning numbers, in draw order.
///
/// Only constructed through [`WinningSet::new`], which checks size, range and
/// uniqueness against the game rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct WinningSet(Vec<u8>);

impl WinningSet {
    pub fn new(numbers: Vec<u8>, rules: &GameConfig) -> Result<Self, RoundError> {
        if numbers.len() != rules.draw_size as usize {
            return Err(RoundError::InvalidDraw(format!(
                "expected {} numbers, got {}",
                rules.draw_size,
                numbers.len()
            )));
        }
        let mut seen = [false; 256];
        for &n in &numbers {
            if n == 0 || n > rules.pool_size {
                return Err(RoundError::InvalidDraw(format!(
                    "{} outside 1..={}",
                    n, rules.pool_size
                )));
            }
            if seen[n as usize] {
                return Err(RoundError::InvalidDraw(format!("{} drawn twice", n)));
            }
            seen[n as usize] = true;
        }
        Ok(Self(numbers))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Membership table indexed by number.
    pub fn mask(&self) -> [bool; 256] {
        let mut mask = [false; 256];
        for &n in &self.0 {
            mask[n as usize] = true;
        }
        mask
    }
}

/// The single current round, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Round {
    pub id: u64,
    pub status: RoundStatus,
    /// Unix ms after which bets are refused and the draw is decided
    pub cutoff_time: u64,
    /// Written once at `waiting -> running`, never changed afterwards
    #[serde(default)]
    pub winning_numbers: Option<WinningSet>,
    /// How many of `winning_numbers` have been published
    #[serde(default)]
    pub revealed_count: u8,
    /// Set when the engine snapshots the round's tickets for the draw
    #[serde(default)]
    pub bets_closed: bool,
    pub last_activity_time: u64,
    pub created_at: u64,
}

impl Round {
    pub fn new_waiting(id: u64, now: u64, wait_ms: u64) -> Self {
        Self {
            id,
            status: RoundStatus::Waiting,
            cutoff_time: now.saturating_add(wait_ms),
            winning_numbers: None,
            revealed_count: 0,
            bets_closed: false,
            last_activity_time: now,
            created_at: now,
        }
    }

    /// Numbers already published, in order.
    pub fn revealed(&self) -> &[u8] {
        match &self.winning_numbers {
            Some(set) => &set.as_slice()[..(self.revealed_count as usize).min(set.len())],
            None => &[],
        }
    }

    /// Numbers still to publish, in order.
    pub fn unrevealed(&self) -> &[u8] {
        match &self.winning_numbers {
            Some(set) => &set.as_slice()[(self.revealed_count as usize).min(set.len())..],
            None => &[],
        }
    }

    pub fn is_fully_revealed(&self) -> bool {
        self.winning_numbers
            .as_ref()
            .map_or(false, |set| self.revealed_count as usize >= set.len())
    }

    pub fn time_remaining_ms(&self, now: u64) -> u64 {
        self.cutoff_time.saturating_sub(now)
    }

    /// A running round whose last persisted activity is older than `threshold_ms`.
    pub fn is_stalled(&self, now: u64, threshold_ms: u64) -> bool {
        self.status == RoundStatus::Running
            && now.saturating_sub(self.last_activity_time) > threshold_ms
    }

    /// Guard for replacing the current round with `next`.
    pub fn check_successor(current: Option<&Round>, next: &Round) -> Result<(), RoundError> {
        match current {
            None => Ok(()),
            Some(cur) if cur.id == next.id && cur.status == RoundStatus::Waiting && !cur.bets_closed => Ok(()),
            Some(cur) if cur.status == RoundStatus::Finished && next.id == cur.id + 1 => Ok(()),
            Some(cur) if cur.status != RoundStatus::Finished => Err(RoundError::InvalidTransition {
                round_id: cur.id,
                from: cur.status.to_string(),
                to: format!("new round {}", next.id),
            }),
            Some(cur) => Err(RoundError::NotCurrent {
                expected: cur.id + 1,
                found: Some(next.id),
            }),
        }
    }

    /// Stop admitting tickets to a waiting round. Idempotent.
    pub fn close_bets(&mut self, now: u64) -> Result<(), RoundError> {
        if self.status != RoundStatus::Waiting {
            return Err(RoundError::InvalidTransition {
                round_id: self.id,
                from: self.status.to_string(),
                to: "closed for bets".to_string(),
            });
        }
        if !self.bets_closed {
            self.bets_closed = true;
            self.last_activity_time = now;
        }
        Ok(())
    }

    /// `waiting -> running`, fixing the winning set.
    pub fn begin_draw(&mut self, numbers: WinningSet, now: u64) -> Result<(), RoundError> {
        if self.winning_numbers.is_some() {
            return Err(RoundError::DrawAlreadyDecided { round_id: self.id });
        }
        if self.status != RoundStatus::Waiting {
            return Err(RoundError::InvalidTransition {
                round_id: self.id,
                from: self.status.to_string(),
                to: RoundStatus::Running.to_string(),
            });
        }
        self.winning_numbers = Some(numbers);
        self.revealed_count = 0;
        self.bets_closed = true;
        self.status = RoundStatus::Running;
        self.last_activity_time = now;
        Ok(())
    }

    /// Move the reveal cursor forward. Re-writing the current value is accepted
    /// so a retried write whose first attempt landed does not fail.
    pub fn advance_reveal(&mut self, count: u8, now: u64) -> Result<(), RoundError> {
        let total = match &self.winning_numbers {
            Some(set) => set.len(),
            None => return Err(RoundError::MissingDraw { round_id: self.id }),
        };
        if self.status != RoundStatus::Running
            || (count as usize) > total
            || count < self.revealed_count
        {
            return Err(RoundError::RevealOutOfOrder {
                round_id: self.id,
                current: self.revealed_count,
                requested: count,
            });
        }
        self.revealed_count = count;
        self.last_activity_time = now;
        Ok(())
    }

    /// `running -> calculating` or `calculating -> finished`. Idempotent for the
    /// status already held.
    pub fn transition(&mut self, next: RoundStatus, now: u64) -> Result<(), RoundError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_advance_to(next) {
            return Err(RoundError::InvalidTransition {
                round_id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if next == RoundStatus::Calculating {
            if let Some(set) = &self.winning_numbers {
                self.revealed_count = set.len() as u8;
            }
        }
        self.status = next;
        self.last_activity_time = now;
        Ok(())
    }

    /// Whether a ticket bound to `round_id` may be committed at `now`.
    pub fn admit_bet(&self, round_id: u64, now: u64) -> Result<(), BetError> {
        if self.id != round_id
            || self.status != RoundStatus::Waiting
            || self.bets_closed
            || now >= self.cutoff_time
        {
            return Err(BetError::RoundClosed { round_id });
        }
        Ok(())
    }
}

/// Ticket settlement state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Pending,
    Won,
    Lost,
}

/// One player's bet on one round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub user_id: String,
    pub round_id: u64,
    pub numbers: Vec<u8>,
    pub stake: u64,
    pub status: TicketStatus,
    #[serde(default)]
    pub hits: u8,
    #[serde(default)]
    pub win_amount: u64,
    #[serde(default)]
    pub jackpot_amount: u64,
    pub created_at: u64,
}

impl Ticket {
    pub fn new(id: String, user_id: String, round_id: u64, numbers: Vec<u8>, stake: u64, now: u64) -> Self {
        Self {
            id,
            user_id,
            round_id,
            numbers,
            stake,
            status: TicketStatus::Pending,
            hits: 0,
            win_amount: 0,
            jackpot_amount: 0,
            created_at: now,
        }
    }

    /// Re-check a stored ticket before paying it.
    pub fn validate(&self, round_id: u64, rules: &GameConfig) -> Result<(), SettlementError> {
        let malformed = |reason: String| SettlementError::MalformedTicket {
            ticket_id: self.id.clone(),
            reason,
        };
        if self.round_id != round_id {
            return Err(malformed(format!("bound to round {}", self.round_id)));
        }
        if self.user_id.trim().is_empty() {
            return Err(malformed("missing user id".to_string()));
        }
        if self.stake == 0 {
            return Err(malformed("zero stake".to_string()));
        }
        validate_picks(&self.numbers, rules)
            .map(|_| ())
            .map_err(|e| malformed(e.to_string()))
    }

    pub fn hits_against(&self, drawn: &[bool; 256]) -> u8 {
        self.numbers.iter().filter(|&&n| drawn[n as usize]).count() as u8
    }

    pub fn apply_outcome(&mut self, outcome: &TicketOutcome) {
        self.hits = outcome.hits;
        self.win_amount = outcome.win_amount;
        self.status = outcome.status;
    }
}

/// Result of settling a single ticket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketOutcome {
    pub hits: u8,
    pub win_amount: u64,
    pub status: TicketStatus,
}

impl TicketOutcome {
    pub fn new(hits: u8, win_amount: u64) -> Self {
        Self {
            hits,
            win_amount,
            status: if win_amount > 0 { TicketStatus::Won } else { TicketStatus::Lost },
        }
    }
}

/// Check a pick set and return it sorted.
pub fn validate_picks(numbers: &[u8], rules: &GameConfig) -> Result<Vec<u8>, BetError> {
    let count = numbers.len();
    if count < rules.min_picks as usize || count > rules.max_picks as usize {
        return Err(BetError::InvalidNumbers(format!(
            "pick between {} and {} numbers, got {}",
            rules.min_picks, rules.max_picks, count
        )));
    }
    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    if let Some(&n) = sorted.iter().find(|&&n| n == 0 || n > rules.pool_size) {
        return Err(BetError::InvalidNumbers(format!(
            "{} is outside 1..={}",
            n, rules.pool_size
        )));
    }
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(BetError::InvalidNumbers(format!("{} picked twice", pair[0])));
    }
    Ok(sorted)
}

/// Player balance record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub user_id: String,
    pub balance: u64,
}

/// Lifetime stake/payout totals
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    pub total_staked: u64,
    pub total_paid_out: u64,
    #[serde(default)]
    pub tickets_settled: u64,
    #[serde(default)]
    pub rounds_settled: u64,
}

impl AggregateStats {
    pub fn implied_rtp(&self) -> f64 {
        if self.total_staked == 0 {
            0.0
        } else {
            self.total_paid_out as f64 / self.total_staked as f64
        }
    }
}

/// Archived result of a finished round, for display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub round_id: u64,
    pub winning_numbers: Vec<u8>,
    pub finished_at: u64,
}

/// Progressive jackpot pool
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JackpotState {
    pub pool: u64,
}

/// One round's dealings with the jackpot pool. Rounds may close in any
/// order, so each keeps its own record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JackpotRound {
    pub round_id: u64,
    /// Amount added to the pool, once set
    #[serde(default)]
    pub contributed: Option<u64>,
    /// Per-winner share taken from the pool, once set
    #[serde(default)]
    pub share: Option<u64>,
}

impl JackpotRound {
    pub fn new(round_id: u64) -> Self {
        Self {
            round_id,
            contributed: None,
            share: None,
        }
    }
}

/// A finished round whose settlement did not complete
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsettledRound {
    pub round_id: u64,
    pub winning_numbers: WinningSet,
    pub attempts: u32,
    pub last_error: String,
    pub recorded_at: u64,
}
