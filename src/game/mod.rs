//! Keno game rules: data model, paytable, draw selection and settlement.

pub mod paytable;
pub mod selector;
pub mod settlement;
pub mod types;

pub use paytable::Paytable;
pub use selector::{selector_for, DrawContext, DrawDecision, DrawSelector, NearMissSelector, RtpBandSelector, RtpTarget};
pub use settlement::{SettlementEngine, SettlementReport};
pub use types::*;
