//! Keno - Server-Driven Multiplayer Keno Rounds
//!
//! A single authoritative round loop draws winning numbers under a
//! return-to-player band, reveals them one ball at a time, settles every
//! ticket exactly once and survives restarts at any point of a round.

pub mod api;
pub mod bets;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod game;
pub mod metrics;
pub mod retry;
pub mod stats;
pub mod store;

pub use bets::{BetReceipt, BetRequest, BetService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigLoader, KenoConfig};
pub use engine::{RoundEngine, Step, Supervisor};
pub use errors::{KenoError, KenoResult};
pub use events::{BroadcastHub, EventSink, RoundEvent};
pub use metrics::KenoMetrics;
pub use stats::StatsLedger;
pub use store::{KenoStore, MemoryStore, RocksStore};
