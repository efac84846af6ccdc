//! Error types for the keno round engine
//!
//! One root error with a sub-enum per domain. Storage errors are the only
//! transient class; everything else is either a caller mistake (bets) or a
//! state-machine guard that the supervisor logs and moves past.

use thiserror::Error;

/// Root error type for all keno operations
#[derive(Debug, Error)]
pub enum KenoError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Bet rejected: {0}")]
    Bet(#[from] BetError),

    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),
}

impl KenoError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KenoError::Storage(
                StorageError::Unavailable(_) | StorageError::ReadFailed(_) | StorageError::WriteFailed(_)
            )
        )
    }
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Persistent store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Reasons a bet is refused. These are shown to the player verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BetError {
    #[error("insufficient funds: balance {balance}, stake {stake}")]
    InsufficientFunds { balance: u64, stake: u64 },

    #[error("round {round_id} is closed for betting")]
    RoundClosed { round_id: u64 },

    #[error("no round is accepting bets")]
    NoActiveRound,

    #[error("invalid numbers: {0}")]
    InvalidNumbers(String),

    #[error("invalid stake {stake}: minimum is {min}")]
    InvalidStake { stake: u64, min: u64 },

    #[error("invalid user id")]
    InvalidUser,
}

impl BetError {
    /// Stable machine-readable code for API responses and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            BetError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            BetError::RoundClosed { .. } => "ROUND_CLOSED",
            BetError::NoActiveRound => "NO_ACTIVE_ROUND",
            BetError::InvalidNumbers(_) => "INVALID_NUMBERS",
            BetError::InvalidStake { .. } => "INVALID_STAKE",
            BetError::InvalidUser => "INVALID_USER",
        }
    }
}

/// Round state machine guard violations
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("round {round_id}: winning numbers already decided")]
    DrawAlreadyDecided { round_id: u64 },

    #[error("round {round_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        round_id: u64,
        from: String,
        to: String,
    },

    #[error("round {expected} is not current (found {found:?})")]
    NotCurrent { expected: u64, found: Option<u64> },

    #[error("round {round_id}: reveal cursor {requested} out of order (at {current})")]
    RevealOutOfOrder {
        round_id: u64,
        current: u8,
        requested: u8,
    },

    #[error("round {round_id}: running without a persisted winning set")]
    MissingDraw { round_id: u64 },

    #[error("invalid draw: {0}")]
    InvalidDraw(String),
}

/// Settlement failures that abort a whole settlement pass
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("round {round_id}: settlement retries exhausted after {attempts} attempts")]
    RetriesExhausted { round_id: u64, attempts: u32 },

    #[error("malformed ticket {ticket_id}: {reason}")]
    MalformedTicket { ticket_id: String, reason: String },
}

impl From<serde_json::Error> for KenoError {
    fn from(e: serde_json::Error) -> Self {
        KenoError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

/// Convenience type alias for Results
pub type KenoResult<T> = Result<T, KenoError>;
