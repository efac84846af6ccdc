//! Round engine: phase state machine, reveal pacing and the supervising loop.

pub mod reveal;
pub mod round_engine;
pub mod supervisor;

pub use reveal::RevealScheduler;
pub use round_engine::{RoundEngine, Step};
pub use supervisor::{failure_delay, Supervisor};
